//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{BuyerId, Order, OrderId, ShippingAddress};
use reservation::PlaceOrder;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_uuid, run_detached};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub buyer_id: String,
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddress,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_cents: i64,
    pub shipping_address: ShippingAddress,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    /// Null if the line total does not fit in cents.
    pub total_cents: Option<i64>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let lines = order
            .lines
            .iter()
            .map(|line| OrderLineResponse {
                product_id: line.product_id.to_string(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                total_cents: line.total_price().map(|total| total.cents()),
            })
            .collect();

        Self {
            id: order.id.to_string(),
            buyer_id: order.buyer_id.to_string(),
            status: order.status.to_string(),
            lines,
            total_cents: order.total_amount.cents(),
            shipping_address: order.shipping_address,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders: reserve stock and place an order.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let buyer_id = BuyerId::from_uuid(parse_uuid(&req.buyer_id, "buyer_id")?);
    let command = req
        .items
        .into_iter()
        .fold(PlaceOrder::new(buyer_id, req.shipping_address), |cmd, item| {
            cmd.with_item(item.product_id, item.quantity)
        });

    let order = run_detached(async move { state.placement.place_order(command).await }).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: load a placed order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    let order = state
        .placement
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order.into()))
}
