use super::{ScoringContext, Scorer};
use crate::config::PopularityConfig;
use crate::models::Component;

/// Global product popularity, identical for every customer
///
/// Blends reach (distinct buyers) and volume (units sold), each relative to
/// the best-selling catalog product. The underlying counts are cached on the
/// dataset, so a batch computes them once.
pub struct PopularityScorer {
    config: PopularityConfig,
}

impl PopularityScorer {
    pub fn new(config: PopularityConfig) -> Self {
        Self { config }
    }
}

impl Scorer for PopularityScorer {
    fn component(&self) -> Component {
        Component::ProductPopularity
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64> {
        let stats = ctx.dataset.sales_stats();

        ctx.products()
            .iter()
            .map(|product| {
                let customer_score = match stats.unique_customers.get(&product.id) {
                    Some(&count) if stats.max_unique_customers > 0 => {
                        count as f64 / stats.max_unique_customers as f64
                    }
                    _ => 0.0,
                };
                let frequency_score = match stats.total_quantity.get(&product.id) {
                    Some(&quantity) if stats.max_total_quantity > 0 => {
                        quantity as f64 / stats.max_total_quantity as f64
                    }
                    _ => 0.0,
                };

                self.config.customer_weight * customer_score
                    + self.config.frequency_weight * frequency_score
            })
            .collect()
    }
}
