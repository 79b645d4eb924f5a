//! Stock reservation and order placement.
//!
//! This crate provides:
//! - `ConflictPolicy`: retry budget and backoff for lost compare-and-swaps
//! - `StockLedger`: reserve/release on a single product
//! - `ReservationCoordinator`: all-or-nothing reservation of a request
//! - `OrderPlacementService`: reservation, order persistence and cart cleanup

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod placement;
pub mod policy;
pub mod retry;

pub use coordinator::{Reservation, ReservationCoordinator};
pub use error::{PlacementError, ReservationError, Result};
pub use ledger::{ReservedUnit, StockLedger};
pub use placement::{OrderDemand, OrderPlacementService, PlaceOrder};
pub use policy::{ConflictPolicy, ConflictPolicyBuilder};
pub use retry::retry_transient;
