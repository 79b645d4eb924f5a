//! Stock inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::ProductId;
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub stock: u32,
    pub sold: u32,
    pub version: i64,
}

/// GET /products/{id}/stock: current stock counters of a product.
#[tracing::instrument(skip(state))]
pub async fn stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    let item = state.placement.stock_of(&ProductId::new(id)).await?;

    Ok(Json(StockResponse {
        product_id: item.product_id.to_string(),
        stock: item.stock,
        sold: item.sold,
        version: item.version.as_i64(),
    }))
}
