use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::config::ConstraintConfig;
use crate::db::Dataset;
use crate::services::scoring::{days_before, ScoredProduct};

/// Hard business rules applied after scoring
///
/// Rules run in a fixed order: recent purchases, discounts, stock. A product
/// missing the flag a rule needs is kept for that rule and a warning is logged.
pub struct ConstraintFilter {
    config: ConstraintConfig,
}

impl ConstraintFilter {
    pub fn new(config: ConstraintConfig) -> Self {
        Self { config }
    }

    /// Returns the candidates that pass every enabled rule, in input order
    pub fn filter(
        &self,
        dataset: &Dataset,
        customer_id: &str,
        candidates: Vec<ScoredProduct>,
        now: DateTime<Utc>,
    ) -> Vec<ScoredProduct> {
        let initial_count = candidates.len();
        let mut filtered = candidates;

        if self.config.exclude_recent_purchases_days > 0 {
            let recent = self.recently_purchased(dataset, customer_id, now);
            if !recent.is_empty() {
                tracing::debug!(
                    customer_id = %customer_id,
                    excluded = recent.len(),
                    days = self.config.exclude_recent_purchases_days,
                    "Excluding recently purchased products"
                );
            }
            filtered.retain(|c| !recent.contains(c.product_id.as_str()));
            tracing::debug!(remaining = filtered.len(), total = initial_count, "After recent purchase filter");
        }

        if self.config.exclude_discounted {
            filtered.retain(|c| match dataset.product(&c.product_id).and_then(|p| p.is_discounted) {
                Some(discounted) => !discounted,
                None => {
                    tracing::warn!(product_id = %c.product_id, "Discount flag missing, skipping discount rule");
                    true
                }
            });
            tracing::debug!(remaining = filtered.len(), total = initial_count, "After discount filter");
        }

        if self.config.exclude_out_of_stock {
            filtered.retain(|c| match dataset.product(&c.product_id).and_then(|p| p.in_stock) {
                Some(in_stock) => in_stock,
                None => {
                    tracing::warn!(product_id = %c.product_id, "Stock flag missing, skipping stock rule");
                    true
                }
            });
            tracing::debug!(remaining = filtered.len(), total = initial_count, "After stock filter");
        }

        tracing::info!(
            customer_id = %customer_id,
            excluded = initial_count - filtered.len(),
            remaining = filtered.len(),
            "Applied constraints"
        );

        filtered
    }

    fn recently_purchased<'a>(
        &self,
        dataset: &'a Dataset,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> HashSet<&'a str> {
        let cutoff = days_before(now, self.config.exclude_recent_purchases_days);
        dataset
            .customer_transactions(customer_id)
            .filter(|txn| txn.date >= cutoff)
            .map(|txn| txn.product_id.as_str())
            .collect()
    }
}
