//! Reservation and placement error types.

use domain::{ProductId, ValidationError};
use inventory_store::StoreError;
use thiserror::Error;

/// Why stock could not be reserved.
///
/// Whenever one of these is returned, nothing from the attempt is left
/// reserved, except after [`ReservationError::OutcomeUnknown`].
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Not enough stock. Repeating the same request will not help.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Competing writers kept winning the compare-and-swap. Safe to retry later.
    #[error("Stock for product {product_id} is contended; gave up after {attempts} attempts")]
    Conflict { product_id: ProductId, attempts: u32 },

    /// A requested product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The placement deadline passed before every product was reserved.
    #[error("Deadline exceeded after reserving {reserved} of {requested} products")]
    DeadlineExceeded { reserved: usize, requested: usize },

    /// A stock write failed without an answer and the record has moved
    /// since, so it cannot be told whether this call's write landed.
    #[error("Outcome of stock write for product {product_id} is unknown: {source}")]
    OutcomeUnknown {
        product_id: ProductId,
        source: StoreError,
    },

    /// The product store failed in a way retrying did not fix.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ReservationError {
    /// The product the failure is about, if there is one.
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            ReservationError::InsufficientStock { product_id, .. }
            | ReservationError::Conflict { product_id, .. }
            | ReservationError::ProductNotFound(product_id)
            | ReservationError::OutcomeUnknown { product_id, .. } => Some(product_id),
            ReservationError::DeadlineExceeded { .. } | ReservationError::Store(_) => None,
        }
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(id) => ReservationError::ProductNotFound(id),
            other => ReservationError::Store(other),
        }
    }
}

/// Errors returned by order placement.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The request was malformed; nothing was touched.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Stock could not be reserved.
    #[error(transparent)]
    Reservation(#[from] ReservationError),

    /// Stock was reserved but the order could not be stored. The stock has
    /// been released again.
    #[error("Failed to persist order: {0}")]
    Persistence(StoreError),

    /// A read needed to build or look up an order failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl PlacementError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PlacementError::Validation(_) => "validation",
            PlacementError::Reservation(err) => match err {
                ReservationError::InsufficientStock { .. } => "insufficient_stock",
                ReservationError::Conflict { .. } => "conflict",
                ReservationError::ProductNotFound(_) => "product_not_found",
                ReservationError::DeadlineExceeded { .. } => "deadline_exceeded",
                ReservationError::OutcomeUnknown { .. } => "outcome_unknown",
                ReservationError::Store(_) => "store",
            },
            PlacementError::Persistence(_) => "persistence",
            PlacementError::Store(_) => "store",
        }
    }
}

/// Convenience type alias for placement results.
pub type Result<T> = std::result::Result<T, PlacementError>;
