//! Per-product stock reservation over the conditional-update contract.

use domain::{ProductId, Version};
use inventory_store::{ProductStore, StoreError};
use serde::Serialize;

use crate::error::ReservationError;
use crate::policy::ConflictPolicy;
use crate::retry::retry_transient;

/// Units taken from one product's stock, and the version the record moved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservedUnit {
    pub product_id: ProductId,
    pub quantity: u32,
    pub version: Version,
}

/// Reserves and releases stock one product at a time.
///
/// Every change is a read followed by a compare-and-swap on the record's
/// version. A lost race re-reads and decides again, within the bounds of
/// the [`ConflictPolicy`].
pub struct StockLedger<P: ProductStore> {
    products: P,
    policy: ConflictPolicy,
}

impl<P: ProductStore> StockLedger<P> {
    /// Creates a ledger over `products`.
    pub fn new(products: P, policy: ConflictPolicy) -> Self {
        Self { products, policy }
    }

    /// The underlying product store.
    pub fn products(&self) -> &P {
        &self.products
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Takes `quantity` units of a product.
    ///
    /// Insufficient stock is final and never retried. Conflicts and
    /// transient store failures are retried until the policy runs out.
    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReservedUnit, ReservationError> {
        let mut attempt = 1;
        loop {
            let failure = match self.try_reserve(product_id, quantity).await {
                Round::Committed(version) => {
                    metrics::counter!("stock_reservations_total").increment(1);
                    tracing::debug!(%version, attempt, "stock reserved");
                    return Ok(ReservedUnit {
                        product_id: product_id.clone(),
                        quantity,
                        version,
                    });
                }
                Round::Stop(err) => return Err(err),
                Round::Retry(err) => {
                    if err.is_conflict() {
                        metrics::counter!("stock_conflicts_total", "operation" => "reserve")
                            .increment(1);
                    }
                    err
                }
            };

            if !self.policy.should_retry(attempt) {
                tracing::warn!(attempt, error = %failure, "giving up on stock reservation");
                return Err(if failure.is_conflict() {
                    ReservationError::Conflict {
                        product_id: product_id.clone(),
                        attempts: attempt,
                    }
                } else {
                    ReservationError::Store(failure)
                });
            }

            let delay = self.policy.backoff(attempt);
            tracing::debug!(attempt, ?delay, error = %failure, "retrying stock reservation");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn try_reserve(&self, product_id: &ProductId, quantity: u32) -> Round {
        let item = match self.products.get_by_id(product_id).await {
            Ok(product) => product.inventory,
            Err(err) if err.is_transient() => return Round::Retry(err),
            Err(err) => return Round::Stop(err.into()),
        };

        let Some((stock, sold)) = item.reserved(quantity) else {
            return Round::Stop(ReservationError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: item.stock,
            });
        };

        self.write(product_id, item.version, stock, sold, "reserve")
            .await
    }

    /// Hands `quantity` units of a product back to stock.
    ///
    /// Never fails the caller. Conflicts and transient failures are retried
    /// up to `max_release_attempts`; past that, or on a permanent failure,
    /// the lost units are reported as an incident and `false` is returned.
    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn release(&self, product_id: &ProductId, quantity: u32) -> bool {
        let mut attempt = 1;
        loop {
            let failure = match self.try_release(product_id, quantity).await {
                Round::Committed(version) => {
                    metrics::counter!("stock_releases_total").increment(1);
                    tracing::debug!(%version, attempt, "stock released");
                    return true;
                }
                Round::Stop(err) => err,
                Round::Retry(err) => {
                    if err.is_conflict() {
                        metrics::counter!("stock_conflicts_total", "operation" => "release")
                            .increment(1);
                    }
                    if self.policy.should_retry_release(attempt) {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    ReservationError::from(err)
                }
            };

            metrics::counter!("stock_release_abandoned_total").increment(1);
            tracing::error!(
                quantity,
                attempt,
                error = %failure,
                "stock release abandoned; units may be missing from stock"
            );
            return false;
        }
    }

    async fn try_release(&self, product_id: &ProductId, quantity: u32) -> Round {
        let item = match self.products.get_by_id(product_id).await {
            Ok(product) => product.inventory,
            Err(err) if err.is_transient() => return Round::Retry(err),
            Err(err) => return Round::Stop(err.into()),
        };
        let (stock, sold) = item.released(quantity);
        self.write(product_id, item.version, stock, sold, "release")
            .await
    }

    /// The compare-and-swap step shared by reserve and release.
    ///
    /// A transient failure does not say whether the write landed. The record
    /// is read again: if it still sits at `expected` nothing was applied and
    /// the round can be repeated. Anything else is an unknown outcome and is
    /// never repeated, since a second write could take the units twice.
    async fn write(
        &self,
        product_id: &ProductId,
        expected: Version,
        stock: u32,
        sold: u32,
        operation: &'static str,
    ) -> Round {
        let err = match self
            .products
            .conditional_update(product_id, expected, stock, sold)
            .await
        {
            Ok(version) => return Round::Committed(version),
            Err(err) if err.is_conflict() => return Round::Retry(err),
            Err(err) if err.is_transient() => err,
            Err(err) => return Round::Stop(err.into()),
        };

        let current = retry_transient(&self.policy, "confirm stock write", || {
            self.products.get_by_id(product_id)
        })
        .await;
        match current {
            Ok(product) if product.inventory.version == expected => {
                tracing::debug!(error = %err, "stock write was not applied");
                Round::Retry(err)
            }
            current => {
                metrics::counter!("stock_write_outcome_unknown_total", "operation" => operation)
                    .increment(1);
                tracing::error!(
                    %expected,
                    found = ?current.map(|product| product.inventory.version),
                    error = %err,
                    "stock write unacknowledged and record has moved"
                );
                Round::Stop(ReservationError::OutcomeUnknown {
                    product_id: product_id.clone(),
                    source: err,
                })
            }
        }
    }
}

/// How one read-decide-write round ended.
enum Round {
    Committed(Version),
    /// Nothing was written; the round may be repeated.
    Retry(StoreError),
    Stop(ReservationError),
}
