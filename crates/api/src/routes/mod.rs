//! HTTP route handlers and the state they share.

pub mod carts;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::future::Future;
use std::sync::Arc;

use inventory_store::{CartStore, OrderStore, ProductStore};
use reservation::{OrderPlacementService, PlacementError};

use crate::error::ApiError;

/// Placement service over shared, type-erased stores.
pub type PlacementService =
    OrderPlacementService<Arc<dyn ProductStore>, Arc<dyn OrderStore>, Arc<dyn CartStore>>;

/// Which backend holds products, orders and carts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Memory,
    Postgres,
}

impl Storage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::Memory => "memory",
            Storage::Postgres => "postgres",
        }
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub placement: PlacementService,
    pub storage: Storage,
}

/// Runs a placement on its own task so it finishes, compensation included,
/// even if the client goes away.
pub(crate) async fn run_detached<F, T>(work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, PlacementError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::Internal(format!("placement task failed: {err}"))),
    }
}

fn parse_uuid(id: &str, what: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
