use std::collections::HashMap;

use super::{days_between, ScoringContext, Scorer};
use crate::config::CategoryAffinityConfig;
use crate::models::Component;

/// Time-decayed preference for the categories a customer buys from
///
/// Every purchase adds `exp(-days_ago / decay_days) * ln(1 + quantity)` to its
/// category. A product scores its category's total divided by the customer's
/// strongest category.
pub struct CategoryAffinityScorer {
    config: CategoryAffinityConfig,
}

impl CategoryAffinityScorer {
    pub fn new(config: CategoryAffinityConfig) -> Self {
        Self { config }
    }

    fn category_scores<'a>(&self, ctx: &ScoringContext<'a>) -> HashMap<&'a str, f64> {
        let mut scores: HashMap<&'a str, f64> = HashMap::new();
        for txn in &ctx.transactions {
            let Some(category) = ctx.dataset.transaction_category(txn) else {
                tracing::warn!(
                    customer_id = %ctx.customer_id,
                    product_id = %txn.product_id,
                    "Purchase has no category, skipping for category affinity"
                );
                continue;
            };
            let weight = (-days_between(txn.date, ctx.now) / self.config.decay_days).exp();
            *scores.entry(category).or_default() += weight * f64::from(txn.quantity).ln_1p();
        }
        scores
    }
}

impl Scorer for CategoryAffinityScorer {
    fn component(&self) -> Component {
        Component::CategoryAffinity
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64> {
        if ctx.transactions.is_empty() {
            return ctx.zeros();
        }

        let scores = self.category_scores(ctx);
        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return ctx.zeros();
        }

        ctx.products()
            .iter()
            .map(|product| {
                product
                    .category
                    .as_deref()
                    .and_then(|category| scores.get(category))
                    .map_or(0.0, |score| score / max)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Dataset;
    use crate::models::{Product, Transaction};
    use crate::services::scoring::test_support::*;

    fn catalog() -> Vec<Product> {
        vec![
            Product::new("P001", "Carrots", "produce"),
            Product::new("P002", "Milk", "dairy"),
            Product::new("P003", "Bread", "bakery"),
        ]
    }

    fn scorer() -> CategoryAffinityScorer {
        CategoryAffinityScorer::new(CategoryAffinityConfig { decay_days: 30.0 })
    }

    #[test]
    fn test_no_purchases_scores_zero() {
        let dataset = Dataset::new(catalog(), Vec::new(), Vec::new());
        let ctx = ScoringContext::new(&dataset, "C001", now());
        assert_eq!(scorer().score(&ctx), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_strongest_category_scores_one() {
        let dataset = Dataset::new(
            catalog(),
            vec![
                Transaction::new("C001", "P001", days_ago(1), 3).with_category("produce"),
                Transaction::new("C001", "P002", days_ago(1), 1).with_category("dairy"),
            ],
            Vec::new(),
        );
        let ctx = ScoringContext::new(&dataset, "C001", now());
        let scores = scorer().score(&ctx);

        assert_eq!(scores[0], 1.0);
        let expected_dairy = 2.0_f64.ln() / 4.0_f64.ln();
        assert!((scores[1] - expected_dairy).abs() < 1e-12);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_recent_purchases_outweigh_old_ones() {
        let dataset = Dataset::new(
            catalog(),
            vec![
                Transaction::new("C001", "P001", days_ago(90), 1).with_category("produce"),
                Transaction::new("C001", "P002", days_ago(2), 1).with_category("dairy"),
            ],
            Vec::new(),
        );
        let ctx = ScoringContext::new(&dataset, "C001", now());
        let scores = scorer().score(&ctx);

        assert_eq!(scores[1], 1.0);
        let expected = (-90.0_f64 / 30.0).exp() / (-2.0_f64 / 30.0).exp();
        assert!((scores[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_quantity_purchases_give_zero() {
        let dataset = Dataset::new(
            catalog(),
            vec![Transaction::new("C001", "P001", days_ago(1), 0).with_category("produce")],
            Vec::new(),
        );
        let ctx = ScoringContext::new(&dataset, "C001", now());
        assert_eq!(scorer().score(&ctx), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_purchase_category_uses_catalog() {
        let dataset = Dataset::new(
            catalog(),
            vec![Transaction::new("C001", "P003", days_ago(1), 1)],
            Vec::new(),
        );
        let ctx = ScoringContext::new(&dataset, "C001", now());
        assert_eq!(scorer().score(&ctx), vec![0.0, 0.0, 1.0]);
    }
}
