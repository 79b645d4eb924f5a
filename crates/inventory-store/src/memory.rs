use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{BuyerId, Cart, Order, OrderId, Product, ProductId, StockItem, Version};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CartStore, OrderStore, ProductStore},
};

#[derive(Debug, Default)]
struct ProductState {
    products: HashMap<ProductId, Product>,
    /// Versions committed per product, in commit order.
    history: HashMap<ProductId, Vec<Version>>,
    forced_conflicts: HashMap<ProductId, u32>,
    unavailable_calls: u32,
    batch_reads_down: bool,
}

/// In-memory product store for testing and single-process deployments.
///
/// The compare-and-swap runs under the write lock, so concurrent callers
/// see the same semantics as the PostgreSQL implementation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<ProductState>>,
}

impl InMemoryProductStore {
    /// Creates a new empty product store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog entry.
    pub async fn insert(&self, product: Product) {
        let mut state = self.state.write().await;
        state.products.insert(product.id().clone(), product);
    }

    /// Returns the current stock record of a product.
    pub async fn stock_of(&self, product_id: &ProductId) -> Option<StockItem> {
        self.state
            .read()
            .await
            .products
            .get(product_id)
            .map(|p| p.inventory.clone())
    }

    /// Versions committed for a product so far, oldest first.
    pub async fn committed_versions(&self, product_id: &ProductId) -> Vec<Version> {
        self.state
            .read()
            .await
            .history
            .get(product_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next `count` conditional updates of a product lose their
    /// race, as if another writer got there first.
    pub async fn force_conflicts(&self, product_id: &ProductId, count: u32) {
        self.state
            .write()
            .await
            .forced_conflicts
            .insert(product_id.clone(), count);
    }

    /// Makes the next `count` calls of any kind fail as unavailable.
    pub async fn fail_next_calls(&self, count: u32) {
        self.state.write().await.unavailable_calls = count;
    }

    /// Makes every `get_many` fail as unavailable while `down` is set.
    /// Single-product reads and writes keep working.
    pub async fn set_batch_reads_down(&self, down: bool) {
        self.state.write().await.batch_reads_down = down;
    }

    fn take_unavailable(state: &mut ProductState) -> Result<()> {
        if state.unavailable_calls > 0 {
            state.unavailable_calls -= 1;
            return Err(StoreError::Unavailable(
                "product store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get_by_id(&self, product_id: &ProductId) -> Result<Product> {
        let mut state = self.state.write().await;
        Self::take_unavailable(&mut state)?;
        state
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut state = self.state.write().await;
        Self::take_unavailable(&mut state)?;
        if state.batch_reads_down {
            return Err(StoreError::Unavailable("batch reads unavailable".to_string()));
        }
        product_ids
            .iter()
            .map(|id| {
                state
                    .products
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::ProductNotFound(id.clone()))
            })
            .collect()
    }

    async fn conditional_update(
        &self,
        product_id: &ProductId,
        expected: Version,
        new_stock: u32,
        new_sold: u32,
    ) -> Result<Version> {
        let mut state = self.state.write().await;
        Self::take_unavailable(&mut state)?;

        let actual = state
            .products
            .get(product_id)
            .map(|p| p.inventory.version)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        if let Some(remaining) = state.forced_conflicts.get_mut(product_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::VersionConflict {
                product_id: product_id.clone(),
                expected,
                actual,
            });
        }

        if actual != expected {
            return Err(StoreError::VersionConflict {
                product_id: product_id.clone(),
                expected,
                actual,
            });
        }

        let next = actual.next();
        if let Some(product) = state.products.get_mut(product_id) {
            product.inventory.stock = new_stock;
            product.inventory.sold = new_sold;
            product.inventory.version = next;
        }
        state
            .history
            .entry(product_id.clone())
            .or_default()
            .push(next);

        Ok(next)
    }
}

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    fail_on_insert: bool,
}

/// In-memory order store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to reject inserts.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<OrderId> {
        let mut state = self.state.write().await;

        if state.fail_on_insert {
            return Err(StoreError::Unavailable("order store unavailable".to_string()));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }

        let id = order.id;
        state.orders.insert(id, order);
        Ok(id)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }
}

#[derive(Debug, Default)]
struct CartState {
    carts: HashMap<BuyerId, Cart>,
    fail_on_clear: bool,
}

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCartStore {
    /// Creates a new empty cart store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a cart, replacing any previous one for the buyer.
    pub async fn save(&self, cart: Cart) {
        self.state.write().await.carts.insert(cart.buyer_id, cart);
    }

    /// Configures the store to fail when clearing a cart.
    pub async fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().await.fail_on_clear = fail;
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&buyer_id).cloned())
    }

    async fn clear(&self, buyer_id: BuyerId) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_on_clear {
            return Err(StoreError::Unavailable("cart store unavailable".to_string()));
        }
        if let Some(cart) = state.carts.get_mut(&buyer_id) {
            cart.items.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderLine, ShippingAddress};

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000), stock)
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            address_line: "12 Analytical Row".to_string(),
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            phone_number: String::new(),
            email: "ada@example.com".to_string(),
            message: None,
        }
    }

    #[tokio::test]
    async fn get_missing_product_is_not_found() {
        let store = InMemoryProductStore::new();
        let result = store.get_by_id(&ProductId::new("nope")).await;
        assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn get_many_preserves_requested_order() {
        let store = InMemoryProductStore::new();
        store.insert(widget(1)).await;
        store
            .insert(Product::new("SKU-000", "Gizmo", Money::from_cents(1), 1))
            .await;

        let ids = [ProductId::new("SKU-001"), ProductId::new("SKU-000")];
        let products = store.get_many(&ids).await.unwrap();
        assert_eq!(products[0].id().as_str(), "SKU-001");
        assert_eq!(products[1].id().as_str(), "SKU-000");

        let missing = [ProductId::new("SKU-001"), ProductId::new("SKU-404")];
        let err = store.get_many(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(id) if id.as_str() == "SKU-404"));
    }

    #[tokio::test]
    async fn batch_reads_down_leaves_single_reads_working() {
        let store = InMemoryProductStore::new();
        store.insert(widget(1)).await;
        let id = ProductId::new("SKU-001");
        store.set_batch_reads_down(true).await;

        let err = store.get_many(std::slice::from_ref(&id)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.get_by_id(&id).await.is_ok());

        store.set_batch_reads_down(false).await;
        assert_eq!(store.get_many(&[id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_with_matching_version_commits() {
        let store = InMemoryProductStore::new();
        store.insert(widget(5)).await;
        let id = ProductId::new("SKU-001");

        let version = store
            .conditional_update(&id, Version::initial(), 2, 3)
            .await
            .unwrap();

        assert_eq!(version, Version::new(1));
        let item = store.stock_of(&id).await.unwrap();
        assert_eq!((item.stock, item.sold, item.version), (2, 3, Version::new(1)));
        assert_eq!(store.committed_versions(&id).await, vec![Version::new(1)]);
    }

    #[tokio::test]
    async fn conditional_update_with_stale_version_conflicts() {
        let store = InMemoryProductStore::new();
        store.insert(widget(5)).await;
        let id = ProductId::new("SKU-001");

        store
            .conditional_update(&id, Version::initial(), 4, 1)
            .await
            .unwrap();
        let err = store
            .conditional_update(&id, Version::initial(), 4, 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::VersionConflict { expected, actual, .. }
                if expected == Version::initial() && actual == Version::new(1)
        ));
        assert_eq!(store.stock_of(&id).await.unwrap().stock, 4);
    }

    #[tokio::test]
    async fn forced_conflicts_leave_record_untouched() {
        let store = InMemoryProductStore::new();
        store.insert(widget(5)).await;
        let id = ProductId::new("SKU-001");
        store.force_conflicts(&id, 1).await;

        let first = store.conditional_update(&id, Version::initial(), 4, 1).await;
        assert!(first.unwrap_err().is_conflict());
        assert_eq!(store.stock_of(&id).await.unwrap().version, Version::initial());

        let second = store.conditional_update(&id, Version::initial(), 4, 1).await;
        assert_eq!(second.unwrap(), Version::new(1));
    }

    #[tokio::test]
    async fn unavailable_calls_are_transient() {
        let store = InMemoryProductStore::new();
        store.insert(widget(5)).await;
        store.fail_next_calls(1).await;

        let id = ProductId::new("SKU-001");
        assert!(store.get_by_id(&id).await.unwrap_err().is_transient());
        assert!(store.get_by_id(&id).await.is_ok());
    }

    #[tokio::test]
    async fn order_insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(
            BuyerId::new(),
            vec![OrderLine::new("SKU-001", "Widget", 1, Money::from_cents(1000))],
            address(),
        )
        .unwrap();

        let id = store.insert(order.clone()).await.unwrap();
        assert_eq!(id, order.id);
        assert_eq!(store.get_order(id).await.unwrap(), Some(order.clone()));
        assert!(matches!(
            store.insert(order).await,
            Err(StoreError::DuplicateOrder(_))
        ));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn order_insert_failure() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_insert(true).await;
        let order = Order::new(BuyerId::new(), vec![], address()).unwrap();

        assert!(store.insert(order).await.is_err());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn clearing_cart_keeps_it() {
        let store = InMemoryCartStore::new();
        let buyer = BuyerId::new();
        store.save(Cart::new(buyer).add("SKU-001", 2)).await;

        store.clear(buyer).await.unwrap();

        let cart = store.get_cart(buyer).await.unwrap().unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn clearing_unknown_cart_is_a_no_op() {
        let store = InMemoryCartStore::new();
        store.clear(BuyerId::new()).await.unwrap();
    }
}
