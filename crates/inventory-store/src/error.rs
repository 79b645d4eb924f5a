use domain::{OrderId, ProductId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock write was rejected because another writer
    /// committed first.
    #[error(
        "Version conflict for product {product_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        product_id: ProductId,
        expected: Version,
        actual: Version,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// An order with this id is already stored.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The store could not be reached; the call may succeed if repeated.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for a rejected compare-and-swap.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// True for failures that say nothing about the data and may clear up
    /// on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => {
                matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
