//! Multi-signal product scoring.
//!
//! Each signal is a [`Scorer`] producing one [0, 1] score per catalog product
//! for a single customer at a single instant. The [`ScoringEngine`] runs every
//! registered scorer and folds the results into a [`ScoreBreakdown`] using the
//! configured weights.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::{EngineConfig, ScoringWeights};
use crate::db::Dataset;
use crate::models::{Component, InteractionEvent, Product, ScoreBreakdown, Transaction};
use crate::services::random::SharedRng;

pub mod category_affinity;
pub mod clickstream;
pub mod exploration;
pub mod popularity;
pub mod repurchase;

pub use category_affinity::CategoryAffinityScorer;
pub use clickstream::ClickstreamIntentScorer;
pub use exploration::ExplorationScorer;
pub use popularity::PopularityScorer;
pub use repurchase::RepurchaseScorer;

/// Everything a scorer may look at for one customer
pub struct ScoringContext<'a> {
    pub dataset: &'a Dataset,
    pub customer_id: &'a str,
    pub now: DateTime<Utc>,
    /// The customer's purchases, oldest first
    pub transactions: Vec<&'a Transaction>,
    /// The customer's interaction events, oldest first
    pub events: Vec<&'a InteractionEvent>,
}

impl<'a> ScoringContext<'a> {
    pub fn new(dataset: &'a Dataset, customer_id: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            dataset,
            customer_id,
            now,
            transactions: dataset.customer_transactions(customer_id).collect(),
            events: dataset.customer_events(customer_id).collect(),
        }
    }

    pub fn products(&self) -> &'a [Product] {
        self.dataset.products()
    }

    fn zeros(&self) -> Vec<f64> {
        vec![0.0; self.products().len()]
    }
}

/// A single scoring signal
///
/// Implementations return one score per product of `ctx.products()`, in
/// catalog order. Scores outside [0, 1] are clamped by the engine. A signal
/// with no data for the customer returns zeros rather than failing.
pub trait Scorer: Send + Sync {
    fn component(&self) -> Component;

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64>;
}

/// A catalog product with its score breakdown for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    /// Position in the catalog, used as the tie-break order
    pub catalog_index: usize,
    pub product_id: String,
    pub breakdown: ScoreBreakdown,
}

impl ScoredProduct {
    pub fn final_score(&self) -> f64 {
        self.breakdown.final_score
    }
}

/// Runs every scorer over the catalog and weights the results
pub struct ScoringEngine {
    weights: ScoringWeights,
    scorers: Vec<Box<dyn Scorer>>,
}

impl ScoringEngine {
    /// Builds the engine with the five standard signals
    pub fn new(config: &EngineConfig, rng: SharedRng) -> Self {
        let scorers: Vec<Box<dyn Scorer>> = vec![
            Box::new(CategoryAffinityScorer::new(config.category_affinity.clone())),
            Box::new(RepurchaseScorer::new(config.repurchase_likelihood.clone())),
            Box::new(ClickstreamIntentScorer::new(config.clickstream_intent.clone())),
            Box::new(PopularityScorer::new(config.product_popularity.clone())),
            Box::new(ExplorationScorer::new(rng)),
        ];
        Self::with_scorers(config.scoring_weights.clone(), scorers)
    }

    pub fn with_scorers(weights: ScoringWeights, scorers: Vec<Box<dyn Scorer>>) -> Self {
        Self { weights, scorers }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scores every catalog product for `customer_id` at `now`
    ///
    /// The result is in catalog order and always has one entry per product.
    pub fn score_products(
        &self,
        dataset: &Dataset,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<ScoredProduct> {
        let ctx = ScoringContext::new(dataset, customer_id, now);
        let products = ctx.products();

        tracing::debug!(
            customer_id = %customer_id,
            products = products.len(),
            transactions = ctx.transactions.len(),
            events = ctx.events.len(),
            "Scoring products"
        );

        let mut columns: Vec<(Component, Vec<f64>)> = Vec::with_capacity(self.scorers.len());
        for scorer in &self.scorers {
            let scores = scorer.score(&ctx);
            if scores.len() != products.len() {
                tracing::warn!(
                    component = %scorer.component(),
                    expected = products.len(),
                    got = scores.len(),
                    "Scorer returned the wrong number of scores, ignoring it"
                );
                continue;
            }
            columns.push((scorer.component(), scores));
        }

        products
            .iter()
            .enumerate()
            .map(|(idx, product)| ScoredProduct {
                catalog_index: idx,
                product_id: product.id.clone(),
                breakdown: ScoreBreakdown::new(
                    columns.iter().map(|(component, scores)| (*component, scores[idx])),
                    &self.weights,
                ),
            })
            .collect()
    }
}

/// Whole days elapsed from `then` to `now`, never negative
pub(crate) fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_days().max(0) as f64
}

/// Fractional hours elapsed from `then` to `now`, never negative
pub(crate) fn hours_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_seconds().max(0) as f64) / 3600.0
}

/// Start of a window of `days` ending at `now`, saturating at the earliest instant
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Start of a window of `hours` ending at `now`, saturating at the earliest instant
pub fn hours_before(now: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    TimeDelta::try_milliseconds((hours * 3_600_000.0) as i64)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Divides every value by the maximum; all zeros when the maximum is not positive
pub(crate) fn normalize_by_max(values: Vec<f64>) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.into_iter().map(|v| v / max).collect()
}
