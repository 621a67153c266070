use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{days_between, ScoringContext, Scorer};
use crate::config::RepurchaseConfig;
use crate::models::Component;

/// Likelihood that a product is due to be bought again
///
/// Uses a Gaussian around the customer's average purchase cycle for the
/// product: a product whose last purchase was exactly one cycle ago scores 1.
pub struct RepurchaseScorer {
    config: RepurchaseConfig,
}

impl RepurchaseScorer {
    pub fn new(config: RepurchaseConfig) -> Self {
        Self { config }
    }

    /// Score for one product given its purchase dates, oldest first
    fn score_dates(&self, dates: &[DateTime<Utc>], now: DateTime<Utc>) -> f64 {
        let Some(&last) = dates.last() else {
            return 0.0;
        };
        if dates.len() < self.config.min_purchases.max(1) {
            return 0.0;
        }

        let avg_cycle = if dates.len() >= 2 {
            let total: f64 = dates
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).num_days() as f64)
                .sum();
            total / (dates.len() - 1) as f64
        } else {
            self.config.expected_cycle_days
        };

        let deviation = (days_between(last, now) - avg_cycle).abs();
        let std = self.config.cycle_std_days;
        (-(deviation * deviation) / (2.0 * std * std)).exp()
    }
}

impl Scorer for RepurchaseScorer {
    fn component(&self) -> Component {
        Component::RepurchaseLikelihood
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64> {
        if ctx.transactions.is_empty() {
            return ctx.zeros();
        }

        // Transactions arrive oldest first, so each list is already sorted
        let mut purchase_dates: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
        for txn in &ctx.transactions {
            purchase_dates
                .entry(txn.product_id.as_str())
                .or_default()
                .push(txn.date);
        }

        ctx.products()
            .iter()
            .map(|product| {
                purchase_dates
                    .get(product.id.as_str())
                    .map_or(0.0, |dates| self.score_dates(dates, ctx.now))
            })
            .collect()
    }
}
