use std::collections::HashMap;

use super::{hours_between, normalize_by_max, ScoringContext, Scorer};
use crate::config::ClickstreamConfig;
use crate::models::Component;

/// Short-term purchase intent from the customer's browsing
pub struct ClickstreamIntentScorer {
    config: ClickstreamConfig,
}

impl ClickstreamIntentScorer {
    pub fn new(config: ClickstreamConfig) -> Self {
        Self { config }
    }
}

impl Scorer for ClickstreamIntentScorer {
    fn component(&self) -> Component {
        Component::ClickstreamIntent
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64> {
        let recency_weight = self.config.recency_weight;

        let mut per_product: HashMap<&str, f64> = HashMap::new();
        for event in &ctx.events {
            let Some(product_id) = event.product_id.as_deref() else {
                continue;
            };
            let recency =
                (-hours_between(event.timestamp, ctx.now) / self.config.decay_hours).exp();
            let combined = recency_weight * recency
                + (1.0 - recency_weight) * self.config.event_weight(&event.event_type);
            *per_product.entry(product_id).or_default() += combined;
        }

        if per_product.is_empty() {
            return ctx.zeros();
        }

        let sums = ctx
            .products()
            .iter()
            .map(|product| per_product.get(product.id.as_str()).copied().unwrap_or(0.0))
            .collect();
        normalize_by_max(sums)
    }
}
