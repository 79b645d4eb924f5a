pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCartStore, InMemoryOrderStore, InMemoryProductStore};
pub use postgres::PostgresStore;
pub use store::{CartStore, OrderStore, ProductStore};
