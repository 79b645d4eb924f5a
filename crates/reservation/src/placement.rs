//! Order placement: reserve, price, persist, clear the cart.

use std::time::Instant;

use domain::{
    BuyerId, Order, OrderId, OrderLine, Product, ProductId, ReservationRequest, ShippingAddress,
    StockItem, ValidationError,
};
use inventory_store::{CartStore, OrderStore, ProductStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::coordinator::{Reservation, ReservationCoordinator};
use crate::error::{PlacementError, ReservationError, Result};
use crate::retry::retry_transient;

/// One requested product and quantity, as submitted.
///
/// The quantity is signed so that malformed input reaches validation
/// instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDemand {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Command to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub buyer_id: BuyerId,
    pub items: Vec<OrderDemand>,
    pub shipping_address: ShippingAddress,
}

impl PlaceOrder {
    /// Creates a command with no items.
    pub fn new(buyer_id: BuyerId, shipping_address: ShippingAddress) -> Self {
        Self {
            buyer_id,
            items: Vec::new(),
            shipping_address,
        }
    }

    /// Adds a demand for `quantity` units of a product.
    pub fn with_item(mut self, product_id: impl Into<ProductId>, quantity: i64) -> Self {
        self.items.push(OrderDemand {
            product_id: product_id.into(),
            quantity,
        });
        self
    }

    fn to_request(&self) -> std::result::Result<ReservationRequest, ValidationError> {
        ReservationRequest::new(
            self.items
                .iter()
                .map(|demand| (demand.product_id.clone(), demand.quantity)),
        )
    }
}

/// Entry point for turning demands into confirmed orders.
///
/// An order is stored only after all its stock is reserved. If storing it
/// fails, the stock is released again, so no failure leaves stock held
/// without an order.
pub struct OrderPlacementService<P, O, C>
where
    P: ProductStore,
    O: OrderStore,
    C: CartStore,
{
    coordinator: ReservationCoordinator<P>,
    orders: O,
    carts: C,
}

impl<P, O, C> OrderPlacementService<P, O, C>
where
    P: ProductStore,
    O: OrderStore,
    C: CartStore,
{
    /// Creates a new placement service.
    pub fn new(coordinator: ReservationCoordinator<P>, orders: O, carts: C) -> Self {
        Self {
            coordinator,
            orders,
            carts,
        }
    }

    /// The coordinator used for reservations.
    pub fn coordinator(&self) -> &ReservationCoordinator<P> {
        &self.coordinator
    }

    /// Places an order for the demands in `command`.
    ///
    /// Malformed commands fail with `Validation` before any store is
    /// touched. Reservation failures are returned unchanged. On success the
    /// buyer's cart is cleared on a best-effort basis.
    #[tracing::instrument(
        skip(self, command),
        fields(buyer_id = %command.buyer_id, items = command.items.len())
    )]
    pub async fn place_order(&self, command: PlaceOrder) -> Result<Order> {
        let started = Instant::now();
        metrics::counter!("order_placements_total").increment(1);

        let result = match Self::validate(&command) {
            Ok(request) => {
                self.place(command.buyer_id, &request, command.shipping_address)
                    .await
            }
            Err(err) => Err(err.into()),
        };
        Self::observe(&result, started);
        result
    }

    /// Places an order for everything in the buyer's stored cart.
    ///
    /// A missing or empty cart is a validation error.
    #[tracing::instrument(skip(self, buyer_id, shipping_address), fields(%buyer_id))]
    pub async fn place_order_from_cart(
        &self,
        buyer_id: BuyerId,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        let started = Instant::now();
        metrics::counter!("order_placements_total").increment(1);

        let result = match self.cart_request(buyer_id, &shipping_address).await {
            Ok(request) => self.place(buyer_id, &request, shipping_address).await,
            Err(err) => Err(err),
        };
        Self::observe(&result, started);
        result
    }

    /// Loads a stored order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.orders
            .get_order(order_id)
            .await
            .map_err(PlacementError::Store)
    }

    /// Reads the current stock record of a product.
    pub async fn stock_of(&self, product_id: &ProductId) -> Result<StockItem> {
        self.coordinator
            .ledger()
            .products()
            .get_by_id(product_id)
            .await
            .map(|product| product.inventory)
            .map_err(|err| ReservationError::from(err).into())
    }

    fn validate(command: &PlaceOrder) -> std::result::Result<ReservationRequest, ValidationError> {
        let request = command.to_request()?;
        command.shipping_address.validate()?;
        Ok(request)
    }

    async fn cart_request(
        &self,
        buyer_id: BuyerId,
        shipping_address: &ShippingAddress,
    ) -> Result<ReservationRequest> {
        shipping_address.validate()?;
        let policy = self.coordinator.ledger().policy();
        let cart = retry_transient(policy, "load cart", || self.carts.get_cart(buyer_id))
            .await
            .map_err(PlacementError::Store)?
            .ok_or(ValidationError::EmptyRequest)?;
        Ok(cart.to_request()?)
    }

    async fn place(
        &self,
        buyer_id: BuyerId,
        request: &ReservationRequest,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        let reservation = self.coordinator.reserve_all(request).await?;

        let products = match self.price(request).await {
            Ok(products) => products,
            Err(err) => {
                tracing::warn!(error = %err, "pricing read failed, releasing stock");
                self.coordinator.release_all(&reservation).await;
                return Err(PlacementError::Store(err));
            }
        };

        let lines = Self::order_lines(&reservation, &products);
        let order = match Order::new(buyer_id, lines, shipping_address) {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, "order could not be priced, releasing stock");
                self.coordinator.release_all(&reservation).await;
                return Err(err.into());
            }
        };
        let order_id = order.id;

        // Inserts are not retried: a timed-out insert may still have landed.
        if let Err(err) = self.orders.insert(order.clone()).await {
            tracing::error!(%order_id, error = %err, "order insert failed, releasing stock");
            self.coordinator.release_all(&reservation).await;
            return Err(PlacementError::Persistence(err));
        }

        if let Err(err) = self.carts.clear(buyer_id).await {
            metrics::counter!("cart_clear_failures_total").increment(1);
            tracing::warn!(%order_id, error = %err, "failed to clear cart after placement");
        }

        tracing::info!(
            %order_id,
            total = %order.total_amount,
            units = reservation.total_units(),
            "order placed"
        );
        Ok(order)
    }

    /// Reads current pricing for the request's products, in request order.
    async fn price(&self, request: &ReservationRequest) -> std::result::Result<Vec<Product>, StoreError> {
        let ids = request.product_ids();
        let ids = ids.as_slice();
        let products = self.coordinator.ledger().products();
        retry_transient(self.coordinator.ledger().policy(), "pricing", || {
            products.get_many(ids)
        })
        .await
    }

    fn order_lines(reservation: &Reservation, products: &[Product]) -> Vec<OrderLine> {
        reservation
            .units()
            .iter()
            .zip(products)
            .map(|(unit, product)| {
                OrderLine::new(
                    unit.product_id.clone(),
                    product.name.clone(),
                    unit.quantity,
                    product.unit_price(),
                )
            })
            .collect()
    }

    fn observe(result: &Result<Order>, started: Instant) {
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if let Err(err) = result {
            metrics::counter!("order_placements_failed_total", "reason" => err.kind())
                .increment(1);
            tracing::info!(reason = err.kind(), error = %err, "order placement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::{Cart, Money, Version};
    use inventory_store::{InMemoryCartStore, InMemoryOrderStore, InMemoryProductStore};

    use super::*;
    use crate::policy::ConflictPolicy;

    type Service =
        OrderPlacementService<InMemoryProductStore, InMemoryOrderStore, InMemoryCartStore>;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Grace Hopper".to_string(),
            address_line: "1 Compiler Way".to_string(),
            city: "Arlington".to_string(),
            postal_code: "22201".to_string(),
            phone_number: "555-0100".to_string(),
            email: "grace@example.com".to_string(),
            message: Some("Leave at the door".to_string()),
        }
    }

    async fn service() -> (Service, InMemoryProductStore, InMemoryOrderStore, InMemoryCartStore) {
        let products = InMemoryProductStore::new();
        products
            .insert(Product::new("A", "Keyboard", Money::from_cents(4_500), 5))
            .await;
        products
            .insert(
                Product::new("B", "Mouse", Money::from_cents(2_000), 5)
                    .with_discount(Money::from_cents(1_500)),
            )
            .await;
        let orders = InMemoryOrderStore::new();
        let carts = InMemoryCartStore::new();
        let policy = ConflictPolicy::builder()
            .base_delay(Duration::ZERO)
            .max_delay(Duration::ZERO)
            .build();
        let service = OrderPlacementService::new(
            ReservationCoordinator::new(products.clone(), policy),
            orders.clone(),
            carts.clone(),
        );
        (service, products, orders, carts)
    }

    #[tokio::test]
    async fn test_place_order_prices_lines_at_purchase() {
        let (service, _, orders, _) = service().await;
        let command = PlaceOrder::new(BuyerId::new(), address())
            .with_item("B", 2)
            .with_item("A", 1);

        let order = service.place_order(command).await.unwrap();

        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].product_name, "Keyboard");
        assert_eq!(order.lines[1].unit_price, Money::from_cents(1_500));
        assert_eq!(order.total_amount, Money::from_cents(7_500));
        assert_eq!(orders.order_count().await, 1);
        assert_eq!(service.get_order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected_before_store_access() {
        let (service, products, _, _) = service().await;
        products.fail_next_calls(1).await;

        let err = service
            .place_order(PlaceOrder::new(BuyerId::new(), address()))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::Validation(ValidationError::EmptyRequest)));
        // the injected failure is still pending
        assert!(service.stock_of(&ProductId::new("A")).await.is_err());
    }

    #[tokio::test]
    async fn test_non_positive_quantity_is_rejected() {
        let (service, products, _, _) = service().await;
        let command = PlaceOrder::new(BuyerId::new(), address())
            .with_item("A", 1)
            .with_item("B", 0);

        let err = service.place_order(command).await.unwrap_err();

        assert_eq!(err.kind(), "validation");
        let a = products.stock_of(&ProductId::new("A")).await.unwrap();
        assert_eq!(a.version, Version::initial());
    }

    #[tokio::test]
    async fn test_blank_address_is_rejected() {
        let (service, _, _, _) = service().await;
        let mut bad = address();
        bad.city = "  ".to_string();

        let err = service
            .place_order(PlaceOrder::new(BuyerId::new(), bad).with_item("A", 1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlacementError::Validation(ValidationError::MissingAddressField { field: "city" })
        ));
    }

    #[tokio::test]
    async fn test_insert_failure_releases_stock() {
        let (service, products, orders, _) = service().await;
        orders.set_fail_on_insert(true).await;

        let err = service
            .place_order(PlaceOrder::new(BuyerId::new(), address()).with_item("A", 3))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::Persistence(_)));
        assert_eq!(products.stock_of(&ProductId::new("A")).await.unwrap().stock, 5);
        assert_eq!(orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_pricing_read_failure_releases_stock() {
        let (service, products, orders, _) = service().await;
        products.set_batch_reads_down(true).await;

        let err = service
            .place_order(PlaceOrder::new(BuyerId::new(), address()).with_item("A", 2))
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::Store(ref e) if e.is_transient()));
        assert_eq!(err.kind(), "store");
        let a = products.stock_of(&ProductId::new("A")).await.unwrap();
        assert_eq!((a.stock, a.sold), (5, 0));
        assert_eq!(a.version, Version::new(2));
        assert_eq!(orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_unpriceable_total_releases_stock() {
        let (service, products, orders, _) = service().await;
        products
            .insert(Product::new("Z", "Yacht", Money::from_cents(i64::MAX), 5))
            .await;

        let err = service
            .place_order(
                PlaceOrder::new(BuyerId::new(), address())
                    .with_item("A", 1)
                    .with_item("Z", 2),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlacementError::Validation(ValidationError::AmountOverflow)
        ));
        for id in ["A", "Z"] {
            let item = products.stock_of(&ProductId::new(id)).await.unwrap();
            assert_eq!((item.stock, item.sold), (5, 0));
        }
        assert_eq!(orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_place_order_from_cart_clears_it() {
        let (service, products, _, carts) = service().await;
        let buyer = BuyerId::new();
        carts.save(Cart::new(buyer).add("A", 2).add("B", 1)).await;

        let order = service.place_order_from_cart(buyer, address()).await.unwrap();

        assert_eq!(order.buyer_id, buyer);
        assert_eq!(products.stock_of(&ProductId::new("A")).await.unwrap().stock, 3);
        let cart = carts.get_cart(buyer).await.unwrap().unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_missing_cart_is_empty_request() {
        let (service, _, _, _) = service().await;

        let err = service
            .place_order_from_cart(BuyerId::new(), address())
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::Validation(ValidationError::EmptyRequest)));
    }

    #[tokio::test]
    async fn test_stock_of_unknown_product() {
        let (service, _, _, _) = service().await;

        let err = service.stock_of(&ProductId::new("nope")).await.unwrap_err();

        assert_eq!(err.kind(), "product_not_found");
    }
}
