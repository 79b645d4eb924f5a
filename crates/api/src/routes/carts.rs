//! Cart checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{BuyerId, ShippingAddress};
use serde::Deserialize;

use super::orders::OrderResponse;
use super::{AppState, parse_uuid, run_detached};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
}

/// POST /carts/{buyer_id}/checkout: place an order for the stored cart.
#[tracing::instrument(skip(state, req))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(buyer_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let buyer_id = BuyerId::from_uuid(parse_uuid(&buyer_id, "buyer_id")?);

    let order = run_detached(async move {
        state
            .placement
            .place_order_from_cart(buyer_id, req.shipping_address)
            .await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}
