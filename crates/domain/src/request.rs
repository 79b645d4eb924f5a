//! Validated reservation requests.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ValidationError;
use crate::order::ProductId;

/// One product and how many units of it to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A non-empty set of positive demands, one line per product.
///
/// Lines are kept in ascending product order, which is the order stock is
/// reserved in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRequest {
    lines: Vec<ReservationLine>,
}

impl ReservationRequest {
    /// Validates raw `(product, quantity)` demands.
    ///
    /// Repeated products are merged by adding their quantities.
    pub fn new<I, P>(demands: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (P, i64)>,
        P: Into<ProductId>,
    {
        let mut merged: BTreeMap<ProductId, i64> = BTreeMap::new();
        for (product_id, quantity) in demands {
            let product_id = product_id.into();
            if quantity <= 0 {
                return Err(ValidationError::InvalidQuantity {
                    product_id,
                    quantity,
                });
            }
            let entry = merged.entry(product_id).or_insert(0);
            *entry = entry.saturating_add(quantity);
        }

        if merged.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }

        let lines = merged
            .into_iter()
            .map(|(product_id, quantity)| match u32::try_from(quantity) {
                Ok(quantity) => Ok(ReservationLine {
                    product_id,
                    quantity,
                }),
                Err(_) => Err(ValidationError::InvalidQuantity {
                    product_id,
                    quantity,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { lines })
    }

    /// Lines in reservation order.
    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    /// Requested products in reservation order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|l| l.product_id.clone()).collect()
    }

    /// Number of distinct products.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false; an empty request cannot be built.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
