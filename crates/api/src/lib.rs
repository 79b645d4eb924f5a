//! HTTP API for storefront order placement.
//!
//! Exposes order placement, cart checkout and stock inspection over REST,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory_store::{
    CartStore, InMemoryCartStore, InMemoryOrderStore, InMemoryProductStore, OrderStore,
    PostgresStore, ProductStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::{OrderPlacementService, ReservationCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::{AppState, Storage};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/carts/{buyer_id}/checkout", post(routes::carts::checkout))
        .route("/products/{id}/stock", get(routes::products::stock))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds application state over the given stores.
pub fn create_state(
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    config: &Config,
    storage: Storage,
) -> Arc<AppState> {
    let mut coordinator = ReservationCoordinator::new(products, config.conflict_policy());
    if let Some(deadline) = config.placement_deadline() {
        coordinator = coordinator.with_deadline(deadline);
    }

    Arc::new(AppState {
        placement: OrderPlacementService::new(coordinator, orders, carts),
        storage,
    })
}

/// Handles to the in-memory stores behind an in-memory [`AppState`].
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub products: InMemoryProductStore,
    pub orders: InMemoryOrderStore,
    pub carts: InMemoryCartStore,
}

/// Creates application state backed by fresh in-memory stores.
pub fn create_in_memory_state(config: &Config) -> (Arc<AppState>, InMemoryStores) {
    let stores = InMemoryStores::default();
    let state = create_state(
        Arc::new(stores.products.clone()),
        Arc::new(stores.orders.clone()),
        Arc::new(stores.carts.clone()),
        config,
        Storage::Memory,
    );
    (state, stores)
}

/// Creates application state backed by PostgreSQL.
pub fn create_postgres_state(store: PostgresStore, config: &Config) -> Arc<AppState> {
    let store = Arc::new(store);
    create_state(
        store.clone(),
        store.clone(),
        store,
        config,
        Storage::Postgres,
    )
}
