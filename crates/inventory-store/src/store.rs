use std::sync::Arc;

use async_trait::async_trait;
use domain::{BuyerId, Cart, Order, OrderId, Product, ProductId, Version};

use crate::Result;

/// Catalog and stock storage.
///
/// The only way to change stock counters is [`ProductStore::conditional_update`],
/// a compare-and-swap on the record's version. Implementations must apply it
/// atomically and must report a lost race as `VersionConflict`, never as a
/// generic failure.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Reads one product.
    ///
    /// Fails with `ProductNotFound` if it does not exist.
    async fn get_by_id(&self, product_id: &ProductId) -> Result<Product>;

    /// Reads several products in one round trip, in the order asked for.
    ///
    /// Fails with `ProductNotFound` naming the first missing id.
    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Writes new stock counters if the stored version still equals
    /// `expected`.
    ///
    /// On success the record moves to `expected.next()`, which is returned.
    async fn conditional_update(
        &self,
        product_id: &ProductId,
        expected: Version,
        new_stock: u32,
        new_sold: u32,
    ) -> Result<Version>;
}

/// Storage for confirmed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order and returns its id.
    async fn insert(&self, order: Order) -> Result<OrderId>;

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;
}

/// Storage for buyers' carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Loads a buyer's cart, if they have one.
    async fn get_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>>;

    /// Empties a buyer's cart. The cart itself is kept.
    async fn clear(&self, buyer_id: BuyerId) -> Result<()>;
}

#[async_trait]
impl<T: ProductStore + ?Sized> ProductStore for Arc<T> {
    async fn get_by_id(&self, product_id: &ProductId) -> Result<Product> {
        (**self).get_by_id(product_id).await
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        (**self).get_many(product_ids).await
    }

    async fn conditional_update(
        &self,
        product_id: &ProductId,
        expected: Version,
        new_stock: u32,
        new_sold: u32,
    ) -> Result<Version> {
        (**self)
            .conditional_update(product_id, expected, new_stock, new_sold)
            .await
    }
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn insert(&self, order: Order) -> Result<OrderId> {
        (**self).insert(order).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(order_id).await
    }
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn get_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>> {
        (**self).get_cart(buyer_id).await
    }

    async fn clear(&self, buyer_id: BuyerId) -> Result<()> {
        (**self).clear(buyer_id).await
    }
}
