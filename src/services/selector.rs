use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::SelectionConfig;
use crate::db::ShownStore;
use crate::models::ShownEntry;
use crate::services::random::{with_rng, SharedRng};
use crate::services::scoring::{hours_before, ScoredProduct};

/// The product picked for a customer and where it stood among the candidates
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub product: ScoredProduct,
    /// 1-based position in the score-sorted candidate list
    pub rank: usize,
    /// Candidates handed to the selector, before top-K truncation
    pub total_candidates: usize,
}

/// One async mutex per customer id
///
/// Held across the shown-store read and append so that two concurrent
/// selections for the same customer cannot both miss each other's pick.
#[derive(Default)]
pub struct CustomerLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn lock_for(&self, customer_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(customer_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Picks one product from the filtered candidates with variety across calls
pub struct Selector {
    config: SelectionConfig,
    store: Arc<dyn ShownStore>,
    rng: SharedRng,
    locks: CustomerLocks,
}

impl Selector {
    pub fn new(config: SelectionConfig, store: Arc<dyn ShownStore>, rng: SharedRng) -> Self {
        Self {
            config,
            store,
            rng,
            locks: CustomerLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ShownStore> {
        &self.store
    }

    /// Start of the window in which shown products are held back
    pub fn shown_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        hours_before(now, self.config.decay_hours)
    }

    /// Selects one product and records it as shown
    ///
    /// Returns `None` only when `candidates` is empty.
    pub async fn select(
        &self,
        customer_id: &str,
        candidates: Vec<ScoredProduct>,
        now: DateTime<Utc>,
    ) -> Option<Selection> {
        if candidates.is_empty() {
            tracing::warn!(customer_id = %customer_id, "No valid products to recommend");
            return None;
        }

        let total_candidates = candidates.len();
        let ranked = rank(candidates);
        let top_k = self.config.top_k.min(total_candidates);

        tracing::debug!(
            customer_id = %customer_id,
            top_k,
            total = total_candidates,
            "Selected top candidates"
        );

        let customer_lock = self.locks.lock_for(customer_id);
        let _guard = customer_lock.lock().await;

        let shown = self.recently_shown(customer_id, now).await;
        let pool = candidate_pool(&ranked, top_k, &shown, customer_id);
        let weights: Vec<f64> = pool.iter().map(|&i| ranked[i].final_score()).collect();
        let picked = weighted_choice(&self.rng, &weights)?;
        let position = pool[picked];
        let selected = ranked[position].clone();

        let entry = ShownEntry::new(selected.product_id.clone(), now);
        if let Err(e) = self.store.record(customer_id, entry).await {
            tracing::warn!(
                customer_id = %customer_id,
                store = self.store.name(),
                error = %e,
                "Failed to record shown product"
            );
        }

        tracing::info!(
            customer_id = %customer_id,
            product_id = %selected.product_id,
            rank = position + 1,
            score = selected.final_score(),
            "Selected product"
        );

        Some(Selection {
            product: selected,
            rank: position + 1,
            total_candidates,
        })
    }

    async fn recently_shown(&self, customer_id: &str, now: DateTime<Utc>) -> HashSet<String> {
        match self.store.recent(customer_id, self.shown_cutoff(now)).await {
            Ok(entries) => entries.into_iter().map(|e| e.product_id).collect(),
            Err(e) => {
                tracing::warn!(
                    customer_id = %customer_id,
                    store = self.store.name(),
                    error = %e,
                    "Failed to read shown products, continuing without history"
                );
                HashSet::new()
            }
        }
    }
}

/// Sorts by final score, highest first; equal scores keep catalog order
pub fn rank(mut candidates: Vec<ScoredProduct>) -> Vec<ScoredProduct> {
    candidates.sort_by(|a, b| {
        b.final_score()
            .total_cmp(&a.final_score())
            .then(a.catalog_index.cmp(&b.catalog_index))
    });
    candidates
}

/// Indices into `ranked` eligible for the draw
///
/// Prefers the top-K minus recently shown products, then any other candidate
/// not recently shown, and finally the full top-K so a customer always gets
/// something.
fn candidate_pool(
    ranked: &[ScoredProduct],
    top_k: usize,
    shown: &HashSet<String>,
    customer_id: &str,
) -> Vec<usize> {
    let fresh = |range: std::ops::Range<usize>| -> Vec<usize> {
        range
            .filter(|&i| !shown.contains(&ranked[i].product_id))
            .collect()
    };

    let pool = fresh(0..top_k);
    if !pool.is_empty() {
        if pool.len() < top_k {
            tracing::debug!(
                customer_id = %customer_id,
                held_back = top_k - pool.len(),
                "Filtered recently shown products"
            );
        }
        return pool;
    }

    let pool = fresh(top_k..ranked.len());
    if !pool.is_empty() {
        tracing::warn!(
            customer_id = %customer_id,
            "All top candidates were recently shown, expanding to all products"
        );
        return pool;
    }

    tracing::warn!(
        customer_id = %customer_id,
        "Every candidate was recently shown, allowing a repeat"
    );
    (0..top_k).collect()
}

/// Draws an index with probability proportional to its weight
///
/// Negative and non-finite weights count as zero. When every weight is zero
/// the draw is uniform. Returns `None` for an empty slice.
pub fn weighted_choice(rng: &SharedRng, weights: &[f64]) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }

    let weights: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();

    Some(with_rng(rng, |rng| match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..weights.len()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use crate::db::shown::MockShownStore;
    use crate::db::InMemoryShownStore;
    use crate::error::AppError;
    use crate::models::{Component, ScoreBreakdown};
    use crate::services::random::shared_rng;
    use crate::services::scoring::test_support::*;

    /// Candidate whose final score equals `score`
    fn candidate(idx: usize, score: f64) -> ScoredProduct {
        let weights = ScoringWeights {
            category_affinity: 1.0,
            repurchase_likelihood: 0.0,
            clickstream_intent: 0.0,
            product_popularity: 0.0,
            exploration: 0.0,
        };
        ScoredProduct {
            catalog_index: idx,
            product_id: format!("P{:03}", idx),
            breakdown: ScoreBreakdown::new([(Component::CategoryAffinity, score)], &weights),
        }
    }

    fn selector(top_k: usize, store: Arc<dyn ShownStore>, seed: u64) -> Selector {
        Selector::new(
            SelectionConfig {
                top_k,
                decay_hours: 24.0,
                random_seed: Some(seed),
            },
            store,
            shared_rng(Some(seed)),
        )
    }

    #[tokio::test]
    async fn test_empty_candidates_yield_none() {
        let selector = selector(20, Arc::new(InMemoryShownStore::new()), 1);
        assert!(selector.select("C001", Vec::new(), now()).await.is_none());
    }

    #[tokio::test]
    async fn test_single_candidate_is_always_selected() {
        let store = Arc::new(InMemoryShownStore::new());
        let selector = selector(20, store.clone(), 1);

        for _ in 0..5 {
            let selection = selector
                .select("C001", vec![candidate(0, 0.0)], now())
                .await
                .unwrap();
            assert_eq!(selection.product.product_id, "P000");
            assert_eq!(selection.rank, 1);
            assert_eq!(selection.total_candidates, 1);
        }
        assert_eq!(store.entries("C001").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_only_top_k_are_drawn() {
        let candidates: Vec<_> = (0..10).map(|i| candidate(i, 1.0 - i as f64 * 0.05)).collect();

        for seed in 0..50 {
            let selector = selector(3, Arc::new(InMemoryShownStore::new()), seed);
            let selection = selector.select("C001", candidates.clone(), now()).await.unwrap();
            assert!(selection.rank <= 3);
            assert_eq!(selection.total_candidates, 10);
        }
    }

    #[tokio::test]
    async fn test_top_k_larger_than_candidates_uses_all() {
        let selector = selector(100, Arc::new(InMemoryShownStore::new()), 3);
        let selection = selector
            .select("C001", vec![candidate(0, 0.2), candidate(1, 0.4)], now())
            .await
            .unwrap();
        assert_eq!(selection.total_candidates, 2);
    }

    #[tokio::test]
    async fn test_rank_reflects_sorted_position() {
        let selector = selector(1, Arc::new(InMemoryShownStore::new()), 3);
        let selection = selector
            .select(
                "C001",
                vec![candidate(0, 0.1), candidate(1, 0.9), candidate(2, 0.5)],
                now(),
            )
            .await
            .unwrap();
        assert_eq!(selection.product.product_id, "P001");
        assert_eq!(selection.rank, 1);
    }

    #[tokio::test]
    async fn test_successive_calls_do_not_repeat() {
        let candidates: Vec<_> = (0..4).map(|i| candidate(i, 0.5)).collect();
        let selector = selector(20, Arc::new(InMemoryShownStore::new()), 9);

        let mut seen = HashSet::new();
        for _ in 0..4 {
            let selection = selector.select("C001", candidates.clone(), now()).await.unwrap();
            assert!(seen.insert(selection.product.product_id));
        }
    }

    #[tokio::test]
    async fn test_widens_beyond_top_k_before_repeating() {
        let candidates = vec![candidate(0, 0.9), candidate(1, 0.1)];
        let selector = selector(1, Arc::new(InMemoryShownStore::new()), 5);

        let first = selector.select("C001", candidates.clone(), now()).await.unwrap();
        let second = selector.select("C001", candidates.clone(), now()).await.unwrap();
        assert_eq!(first.product.product_id, "P000");
        assert_eq!(second.product.product_id, "P001");
        assert_eq!(second.rank, 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_top_k_when_everything_was_shown() {
        let store = Arc::new(InMemoryShownStore::new());
        store.record("C001", ShownEntry::new("P000", hours_ago(1))).await.unwrap();
        store.record("C001", ShownEntry::new("P001", hours_ago(1))).await.unwrap();

        let selector = selector(2, store, 5);
        let selection = selector
            .select("C001", vec![candidate(0, 0.5), candidate(1, 0.5)], now())
            .await;
        assert!(selection.is_some());
    }

    #[tokio::test]
    async fn test_entries_outside_window_do_not_block() {
        let store = Arc::new(InMemoryShownStore::new());
        store.record("C001", ShownEntry::new("P000", hours_ago(25))).await.unwrap();

        let selector = selector(1, store, 5);
        let selection = selector
            .select("C001", vec![candidate(0, 0.9), candidate(1, 0.1)], now())
            .await
            .unwrap();
        assert_eq!(selection.product.product_id, "P000");
    }

    #[tokio::test]
    async fn test_huge_window_still_selects() {
        let store = Arc::new(InMemoryShownStore::new());
        let selector = Selector::new(
            SelectionConfig {
                top_k: 20,
                decay_hours: 1e10,
                random_seed: Some(4),
            },
            store,
            shared_rng(Some(4)),
        );

        assert_eq!(selector.shown_cutoff(now()), DateTime::<Utc>::MIN_UTC);
        let first = selector
            .select("C001", vec![candidate(0, 0.5), candidate(1, 0.5)], now())
            .await
            .unwrap();
        let second = selector
            .select("C001", vec![candidate(0, 0.5), candidate(1, 0.5)], now())
            .await
            .unwrap();
        assert_ne!(first.product.product_id, second.product.product_id);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_gracefully() {
        let mut store = MockShownStore::new();
        store
            .expect_recent()
            .returning(|_, _| Err(AppError::Internal("disk gone".to_string())));
        store
            .expect_record()
            .times(1)
            .returning(|_, _| Err(AppError::Internal("disk gone".to_string())));
        store.expect_name().return_const("mock");

        let selector = selector(20, Arc::new(store), 5);
        let selection = selector
            .select("C001", vec![candidate(0, 0.5)], now())
            .await
            .unwrap();
        assert_eq!(selection.product.product_id, "P000");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_for_one_customer_are_serialized() {
        let selector = Arc::new(selector(20, Arc::new(InMemoryShownStore::new()), 11));
        let candidates: Vec<_> = (0..2).map(|i| candidate(i, 0.5)).collect();

        let a = {
            let selector = selector.clone();
            let candidates = candidates.clone();
            tokio::spawn(async move { selector.select("C001", candidates, now()).await })
        };
        let b = {
            let selector = selector.clone();
            tokio::spawn(async move { selector.select("C001", candidates, now()).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_ne!(a.product.product_id, b.product.product_id);
    }

    #[test]
    fn test_weighted_choice_matches_scores() {
        let rng = shared_rng(Some(2024));
        let weights = [0.9, 0.05, 0.05];
        let draws = 10_000;

        let mut counts = [0usize; 3];
        for _ in 0..draws {
            counts[weighted_choice(&rng, &weights).unwrap()] += 1;
        }

        let first = counts[0] as f64 / draws as f64;
        assert!((first - 0.9).abs() < 0.02, "first candidate frequency {first}");
        assert!(counts[1] > 0 && counts[2] > 0);
    }

    #[test]
    fn test_weighted_choice_all_zero_is_uniform() {
        let rng = shared_rng(Some(7));
        let weights = [0.0, 0.0, -1.0, f64::NAN];

        let mut counts = [0usize; 4];
        for _ in 0..4_000 {
            counts[weighted_choice(&rng, &weights).unwrap()] += 1;
        }
        for count in counts {
            assert!((800..1200).contains(&count), "counts {counts:?}");
        }
    }

    #[test]
    fn test_weighted_choice_empty() {
        assert_eq!(weighted_choice(&shared_rng(Some(1)), &[]), None);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let ranked = rank(vec![candidate(0, 0.5), candidate(1, 0.7), candidate(2, 0.5)]);
        let ids: Vec<_> = ranked.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P001", "P000", "P002"]);
    }
}
