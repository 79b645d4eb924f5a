//! Domain error types.

use thiserror::Error;

use crate::order::ProductId;

/// A malformed order request. Raised before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The request carries no items.
    #[error("Order request has no items")]
    EmptyRequest,

    /// A requested quantity is zero, negative or out of range.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// A required shipping address field is blank.
    #[error("Shipping address field '{field}' is required")]
    MissingAddressField { field: &'static str },

    /// A line or order total does not fit in the money type.
    #[error("Order total is too large")]
    AmountOverflow,
}
