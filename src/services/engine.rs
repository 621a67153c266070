use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{Dataset, ShownStore};
use crate::models::{BatchRecommendation, Recommendation};
use crate::services::constraints::ConstraintFilter;
use crate::services::random::SharedRng;
use crate::services::scoring::{ScoredProduct, ScoringEngine};
use crate::services::selector::{rank, Selector};

/// How many of the best-scored products verbose mode logs
const VERBOSE_TOP_N: usize = 10;

/// End-to-end recommendation pipeline
///
/// Scores the whole catalog for a customer, drops products that break a
/// business rule, then draws one of the best remaining products while
/// avoiding recent repeats.
pub struct RecommendationEngine {
    scoring: ScoringEngine,
    constraints: ConstraintFilter,
    selector: Selector,
    verbose: bool,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn ShownStore>, rng: SharedRng) -> Self {
        tracing::info!(
            store = store.name(),
            top_k = config.selection.top_k,
            "Initialized recommendation engine"
        );

        Self {
            scoring: ScoringEngine::new(&config, rng.clone()),
            constraints: ConstraintFilter::new(config.constraints),
            selector: Selector::new(config.selection, store, rng),
            verbose: config.logging.verbose,
        }
    }

    pub fn shown_store(&self) -> &Arc<dyn ShownStore> {
        self.selector.store()
    }

    /// Recommends one product for `customer_id`, evaluated at `at` (now if absent)
    ///
    /// Returns `None` when no catalog product survives the constraints.
    /// Unknown customers are scored as cold starts.
    pub async fn recommend(
        &self,
        dataset: &Dataset,
        customer_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Option<Recommendation> {
        let now = at.unwrap_or_else(Utc::now);
        tracing::info!(customer_id = %customer_id, evaluated_at = %now, "Generating recommendation");

        let scored = self.scoring.score_products(dataset, customer_id, now);
        if self.verbose {
            log_top_scores(customer_id, &scored);
        }

        let candidates = self.constraints.filter(dataset, customer_id, scored, now);
        let selection = self.selector.select(customer_id, candidates, now).await?;

        let product = dataset.product(&selection.product.product_id)?;
        Some(Recommendation {
            customer_id: customer_id.to_string(),
            recommended_product_id: product.id.clone(),
            product_name: product.display_name().to_string(),
            product_category: product.display_category().to_string(),
            scores: selection.product.breakdown,
            rank: selection.rank,
            total_candidates: selection.total_candidates,
            evaluated_at: now,
        })
    }

    /// Recommends for several customers concurrently
    ///
    /// Each customer runs on its own task. Results keep the order of
    /// `customer_ids`; a customer whose task fails gets `None`.
    pub async fn recommend_batch(
        self: &Arc<Self>,
        dataset: Arc<Dataset>,
        customer_ids: Vec<String>,
        at: Option<DateTime<Utc>>,
    ) -> Vec<BatchRecommendation> {
        let now = at.unwrap_or_else(Utc::now);
        tracing::info!(customers = customer_ids.len(), "Generating batch recommendations");

        let mut tasks = Vec::with_capacity(customer_ids.len());
        for customer_id in customer_ids {
            let engine = Arc::clone(self);
            let dataset = Arc::clone(&dataset);
            let task_customer = customer_id.clone();
            let task = tokio::spawn(async move {
                engine.recommend(&dataset, &task_customer, Some(now)).await
            });
            tasks.push((customer_id, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        let mut failures = 0usize;
        for (customer_id, task) in tasks {
            let recommendation = match task.await {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    tracing::error!(customer_id = %customer_id, error = %e, "Task join error");
                    failures += 1;
                    None
                }
            };
            results.push(BatchRecommendation {
                customer_id,
                recommendation,
            });
        }

        let recommended = results.iter().filter(|r| r.recommendation.is_some()).count();
        tracing::info!(
            customers = results.len(),
            recommended,
            failures,
            "Finished batch recommendations"
        );

        results
    }
}

fn log_top_scores(customer_id: &str, scored: &[ScoredProduct]) {
    let ranked = rank(scored.to_vec());
    tracing::debug!(customer_id = %customer_id, "Top {} products by score", VERBOSE_TOP_N);
    for (position, product) in ranked.iter().take(VERBOSE_TOP_N).enumerate() {
        tracing::debug!(
            rank = position + 1,
            product_id = %product.product_id,
            score = product.final_score(),
            components = ?product.breakdown.components,
            "Scored product"
        );
    }
}
