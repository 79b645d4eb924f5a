//! Multi-product reservation with compensation.

use std::time::Duration;

use domain::{ProductId, ReservationRequest};
use inventory_store::{ProductStore, StoreError};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::ReservationError;
use crate::ledger::{ReservedUnit, StockLedger};
use crate::policy::ConflictPolicy;

/// Stock held for one request, in ascending product order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    units: Vec<ReservedUnit>,
}

impl Reservation {
    /// Units reserved per product.
    pub fn units(&self) -> &[ReservedUnit] {
        &self.units
    }

    /// Quantity held for `product_id`, or 0.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.units
            .iter()
            .find(|unit| &unit.product_id == product_id)
            .map_or(0, |unit| unit.quantity)
    }

    /// Total units across all products.
    pub fn total_units(&self) -> u64 {
        self.units.iter().map(|unit| u64::from(unit.quantity)).sum()
    }
}

/// Reserves every line of a request or none of them.
///
/// The protocol has two phases. A batch read rejects requests that cannot
/// possibly succeed without writing anything. Then each line is reserved
/// through the [`StockLedger`] in ascending product order, and the first
/// failure releases what was already taken, newest first.
pub struct ReservationCoordinator<P: ProductStore> {
    ledger: StockLedger<P>,
    deadline: Option<Duration>,
}

impl<P: ProductStore> ReservationCoordinator<P> {
    /// Creates a coordinator with no deadline.
    pub fn new(products: P, policy: ConflictPolicy) -> Self {
        Self {
            ledger: StockLedger::new(products, policy),
            deadline: None,
        }
    }

    /// Limits how long the reserve phase of one request may run.
    ///
    /// The deadline is checked before each product. A store call that has
    /// started is always allowed to finish, so its outcome is known.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The ledger used for single-product changes.
    pub fn ledger(&self) -> &StockLedger<P> {
        &self.ledger
    }

    /// Reserves all lines of `request`.
    ///
    /// On error nothing from this call remains reserved, unless a release
    /// was abandoned, which is logged as an incident by the ledger.
    #[tracing::instrument(skip(self, request), fields(lines = request.len()))]
    pub async fn reserve_all(
        &self,
        request: &ReservationRequest,
    ) -> Result<Reservation, ReservationError> {
        let started = Instant::now();
        self.validate(request).await?;

        let mut units = Vec::with_capacity(request.len());
        for line in request.lines() {
            if let Some(limit) = self.deadline
                && started.elapsed() >= limit
            {
                tracing::warn!(
                    reserved = units.len(),
                    requested = request.len(),
                    "placement deadline passed, unwinding"
                );
                let reserved = units.len();
                self.compensate(&units).await;
                return Err(ReservationError::DeadlineExceeded {
                    reserved,
                    requested: request.len(),
                });
            }

            match self.ledger.reserve(&line.product_id, line.quantity).await {
                Ok(unit) => units.push(unit),
                Err(err) => {
                    tracing::info!(
                        product_id = %line.product_id,
                        error = %err,
                        reserved = units.len(),
                        "reservation failed, unwinding"
                    );
                    self.compensate(&units).await;
                    return Err(err);
                }
            }
        }

        Ok(Reservation { units })
    }

    /// Gives back everything held by `reservation`.
    ///
    /// Returns false if any product could not be released.
    pub async fn release_all(&self, reservation: &Reservation) -> bool {
        self.compensate(&reservation.units).await
    }

    /// Fast-path rejection from one batch read. Writes nothing.
    async fn validate(&self, request: &ReservationRequest) -> Result<(), ReservationError> {
        let products = match self
            .ledger
            .products()
            .get_many(&request.product_ids())
            .await
        {
            Ok(products) => products,
            Err(err) if err.is_transient() => {
                tracing::debug!(error = %err, "batch read failed, skipping fast-path check");
                return Ok(());
            }
            Err(StoreError::ProductNotFound(id)) => {
                return Err(ReservationError::ProductNotFound(id));
            }
            Err(err) => return Err(ReservationError::Store(err)),
        };

        for (line, product) in request.lines().iter().zip(&products) {
            if !product.inventory.can_fulfil(line.quantity) {
                return Err(ReservationError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    available: product.inventory.stock,
                });
            }
        }
        Ok(())
    }

    async fn compensate(&self, units: &[ReservedUnit]) -> bool {
        let mut all_released = true;
        for unit in units.iter().rev() {
            all_released &= self.ledger.release(&unit.product_id, unit.quantity).await;
        }
        all_released
    }
}
