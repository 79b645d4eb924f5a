//! Shopping carts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::order::{BuyerId, ProductId};
use crate::request::ReservationRequest;

/// A buyer's cart: requested quantity per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub buyer_id: BuyerId,
    pub items: BTreeMap<ProductId, u32>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new(buyer_id: BuyerId) -> Self {
        Self {
            buyer_id,
            items: BTreeMap::new(),
        }
    }

    /// Adds units of a product, accumulating with what is already there.
    /// The count stops at `u32::MAX`.
    pub fn add(mut self, product_id: impl Into<ProductId>, quantity: u32) -> Self {
        let held = self.items.entry(product_id.into()).or_insert(0);
        *held = held.saturating_add(quantity);
        self
    }

    /// Returns true if the cart holds nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Turns the cart contents into a reservation request.
    pub fn to_request(&self) -> Result<ReservationRequest, ValidationError> {
        ReservationRequest::new(
            self.items
                .iter()
                .map(|(id, qty)| (id.clone(), i64::from(*qty))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let cart = Cart::new(BuyerId::new()).add("SKU-A", 1).add("SKU-A", 2);
        assert_eq!(cart.items[&ProductId::new("SKU-A")], 3);
    }

    #[test]
    fn test_add_saturates_at_max() {
        let cart = Cart::new(BuyerId::new())
            .add("SKU-A", u32::MAX)
            .add("SKU-A", u32::MAX);
        assert_eq!(cart.items[&ProductId::new("SKU-A")], u32::MAX);
        assert_eq!(cart.to_request().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_cart_cannot_become_request() {
        let cart = Cart::new(BuyerId::new());
        assert!(cart.is_empty());
        assert_eq!(cart.to_request(), Err(ValidationError::EmptyRequest));
    }

    #[test]
    fn test_zero_quantity_entry_is_rejected() {
        let cart = Cart::new(BuyerId::new()).add("SKU-A", 0);
        assert!(matches!(
            cart.to_request(),
            Err(ValidationError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_cart_to_request() {
        let cart = Cart::new(BuyerId::new()).add("SKU-B", 1).add("SKU-A", 4);
        let request = cart.to_request().unwrap();
        assert_eq!(request.product_ids(), vec![ProductId::new("SKU-A"), ProductId::new("SKU-B")]);
    }
}
