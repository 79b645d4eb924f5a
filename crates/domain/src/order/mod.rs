//! Order records and related value objects.

mod status;
mod value_objects;

pub use status::OrderStatus;
pub use value_objects::{BuyerId, Money, ProductId, ShippingAddress};

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One purchased product on an order, priced at the moment of purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity purchased.
    pub quantity: u32,

    /// Price per unit in cents when the order was placed.
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this line (quantity * unit_price), or
    /// `None` if it overflows.
    pub fn total_price(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A confirmed order.
///
/// Only ever built after its stock has been reserved. Apart from `status`,
/// which order management moves along, the record does not change once
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

impl Order {
    /// Builds a new pending order, computing its total from the lines.
    ///
    /// Fails with `AmountOverflow` if a line or the total does not fit.
    pub fn new(
        buyer_id: BuyerId,
        lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
    ) -> Result<Self, ValidationError> {
        let total_amount = lines
            .iter()
            .try_fold(Money::zero(), |total, line| {
                line.total_price().and_then(|price| total.checked_add(price))
            })
            .ok_or(ValidationError::AmountOverflow)?;
        Ok(Self {
            id: OrderId::new(),
            buyer_id,
            lines,
            shipping_address,
            total_amount,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
        })
    }

    /// Total number of units across all lines.
    pub fn unit_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}
