//! Domain types for storefront order placement.
//!
//! This crate provides the records the placement flow works on:
//! - `StockItem` and `Product`: versioned stock counters and catalog pricing
//! - `ReservationRequest`: validated per-product demands
//! - `Order`, `OrderLine`, `OrderStatus`: the confirmed order record
//! - `Cart`: a buyer's pending selection

pub mod cart;
pub mod error;
pub mod order;
pub mod request;
pub mod stock;

pub use cart::Cart;
pub use common::{OrderId, Version};
pub use error::ValidationError;
pub use order::{
    BuyerId, Money, Order, OrderLine, OrderStatus, ProductId, ShippingAddress,
};
pub use request::{ReservationLine, ReservationRequest};
pub use stock::{Product, StockItem};
