//! Versioned stock records and the catalog entries that carry them.

use common::Version;
use serde::{Deserialize, Serialize};

use crate::order::{Money, ProductId};

/// Stock counters of one product, guarded by an optimistic version.
///
/// `stock` is what can still be sold, `sold` is cumulative. `version`
/// moves forward by one with every committed change to either counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub product_id: ProductId,
    pub stock: u32,
    pub sold: u32,
    pub version: Version,
}

impl StockItem {
    /// Creates a fresh record at the initial version with nothing sold.
    pub fn new(product_id: impl Into<ProductId>, stock: u32) -> Self {
        Self {
            product_id: product_id.into(),
            stock,
            sold: 0,
            version: Version::initial(),
        }
    }

    /// Returns true if `quantity` units can be taken from stock.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    /// Counters after taking `quantity` units, as `(stock, sold)`.
    ///
    /// `None` when stock is insufficient.
    pub fn reserved(&self, quantity: u32) -> Option<(u32, u32)> {
        let stock = self.stock.checked_sub(quantity)?;
        Some((stock, self.sold.saturating_add(quantity)))
    }

    /// Counters after handing `quantity` units back, as `(stock, sold)`.
    pub fn released(&self, quantity: u32) -> (u32, u32) {
        (
            self.stock.saturating_add(quantity),
            self.sold.saturating_sub(quantity),
        )
    }
}

/// A catalog entry: pricing plus its stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub inventory: StockItem,
}

impl Product {
    /// Creates a product with `stock` units on hand and no discount.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            name: name.into(),
            price,
            discount_price: None,
            inventory: StockItem::new(id, stock),
        }
    }

    /// Sets a discounted price.
    pub fn with_discount(mut self, discount_price: Money) -> Self {
        self.discount_price = Some(discount_price);
        self
    }

    /// The product's key.
    pub fn id(&self) -> &ProductId {
        &self.inventory.product_id
    }

    /// Price a buyer pays per unit right now.
    pub fn unit_price(&self) -> Money {
        match self.discount_price {
            Some(discount) if discount < self.price => discount,
            _ => self.price,
        }
    }
}
