//! Integration tests for the API server.

use std::sync::OnceLock;

use api::InMemoryStores;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use domain::{BuyerId, Cart, Money, Product, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> Config {
    Config {
        conflict_backoff_ms: 0,
        conflict_backoff_cap_ms: 0,
        ..Config::default()
    }
}

async fn setup() -> (axum::Router, InMemoryStores) {
    let (state, stores) = api::create_in_memory_state(&test_config());
    stores
        .products
        .insert(Product::new("A", "Desk Lamp", Money::from_cents(2_500), 5))
        .await;
    stores
        .products
        .insert(Product::new("B", "Bulb", Money::from_cents(300), 0))
        .await;
    let app = api::create_app(state, get_metrics_handle());
    (app, stores)
}

fn shipping_address() -> serde_json::Value {
    serde_json::json!({
        "full_name": "Katherine Johnson",
        "address_line": "1 Langley Blvd",
        "city": "Hampton",
        "postal_code": "23681",
        "phone_number": "555-0123",
        "email": "katherine@example.com"
    })
}

fn order_body(buyer_id: BuyerId, items: &[(&str, i64)]) -> serde_json::Value {
    let items: Vec<_> = items
        .iter()
        .map(|(id, qty)| serde_json::json!({ "product_id": id, "quantity": qty }))
        .collect();
    serde_json::json!({
        "buyer_id": buyer_id.to_string(),
        "items": items,
        "shipping_address": shipping_address()
    })
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let response = send(&app, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_place_order_returns_created_order() {
    let (app, stores) = setup().await;
    let buyer = BuyerId::new();

    let response = send(&app, post_json("/orders", &order_body(buyer, &[("A", 2)]))).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["buyer_id"], buyer.to_string());
    assert_eq!(json["status"], "pending");
    assert_eq!(json["total_cents"], 5_000);
    assert_eq!(json["lines"][0]["product_name"], "Desk Lamp");
    assert_eq!(json["lines"][0]["quantity"], 2);
    assert_eq!(json["shipping_address"]["city"], "Hampton");
    let stock = stores.products.stock_of(&ProductId::new("A")).await.unwrap();
    assert_eq!(stock.stock, 3);
}

#[tokio::test]
async fn test_get_order_after_placement() {
    let (app, _) = setup().await;
    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 1)])),
    )
    .await;
    let order_id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = send(&app, get(&format!("/orders/{order_id}"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["id"], order_id);
    assert_eq!(json["lines"][0]["unit_price_cents"], 2_500);
}

#[tokio::test]
async fn test_get_unknown_order_is_not_found() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        get("/orders/00000000-0000-0000-0000-000000000000"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_order_id_is_bad_request() {
    let (app, _) = setup().await;

    let response = send(&app, get("/orders/not-a-uuid")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insufficient_stock_names_product() {
    let (app, stores) = setup().await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 2), ("B", 1)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["product_id"], "B");
    let stock = stores.products.stock_of(&ProductId::new("A")).await.unwrap();
    assert_eq!(stock.stock, 5);
    assert_eq!(stores.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_zero_quantity_is_rejected() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 0)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("Invalid quantity"));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("NOPE", 1)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["product_id"], "NOPE");
}

#[tokio::test]
async fn test_contention_maps_to_conflict() {
    let (app, stores) = setup().await;
    stores.products.force_conflicts(&ProductId::new("A"), 10).await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 1)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_persistence_failure_is_server_error() {
    let (app, stores) = setup().await;
    stores.orders.set_fail_on_insert(true).await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 3)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let stock = stores.products.stock_of(&ProductId::new("A")).await.unwrap();
    assert_eq!((stock.stock, stock.sold), (5, 0));
}

#[tokio::test]
async fn test_unpriceable_order_is_rejected_and_stock_restored() {
    let (app, stores) = setup().await;
    stores
        .products
        .insert(Product::new("Y", "Yacht", Money::from_cents(i64::MAX), 3))
        .await;

    let response = send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 1), ("Y", 2)])),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("too large"));
    let yacht = stores.products.stock_of(&ProductId::new("Y")).await.unwrap();
    assert_eq!((yacht.stock, yacht.sold), (3, 0));
    let lamp = stores.products.stock_of(&ProductId::new("A")).await.unwrap();
    assert_eq!(lamp.stock, 5);
    assert_eq!(stores.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_checkout_places_cart_contents() {
    let (app, stores) = setup().await;
    let buyer = BuyerId::new();
    stores.carts.save(Cart::new(buyer).add("A", 4)).await;

    let response = send(
        &app,
        post_json(
            &format!("/carts/{buyer}/checkout"),
            &serde_json::json!({ "shipping_address": shipping_address() }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["total_cents"], 10_000);

    let response = send(
        &app,
        post_json(
            &format!("/carts/{buyer}/checkout"),
            &serde_json::json!({ "shipping_address": shipping_address() }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stock_endpoint_reports_version() {
    let (app, _) = setup().await;
    send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 2)])),
    )
    .await;

    let response = send(&app, get("/products/A/stock")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["stock"], 3);
    assert_eq!(json["sold"], 2);
    assert_eq!(json["version"], 1);
}

#[tokio::test]
async fn test_stock_of_unknown_product() {
    let (app, _) = setup().await;

    let response = send(&app, get("/products/ghost/stock")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;
    send(
        &app,
        post_json("/orders", &order_body(BuyerId::new(), &[("A", 1)])),
    )
    .await;

    let response = send(&app, get("/metrics")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("order_placements_total"));
}
