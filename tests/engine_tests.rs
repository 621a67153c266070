mod common;

use std::collections::HashSet;
use std::sync::Arc;

use basket_recommender::config::EngineConfig;
use basket_recommender::db::{Dataset, InMemoryShownStore, JsonFileShownStore, ShownStore};
use basket_recommender::models::Component;
use basket_recommender::services::selector::weighted_choice;
use basket_recommender::services::{shared_rng, RecommendationEngine};

use common::{evaluated_at, Fixture};

fn engine_with(store: Arc<dyn ShownStore>, seed: u64) -> RecommendationEngine {
    let mut config = EngineConfig::default();
    config.selection.random_seed = Some(seed);
    RecommendationEngine::new(config, store, shared_rng(Some(seed)))
}

fn engine(seed: u64) -> RecommendationEngine {
    engine_with(Arc::new(InMemoryShownStore::new()), seed)
}

#[tokio::test]
async fn test_breakdown_is_complete_and_weighted() {
    let fixture = Fixture::grocery();
    let dataset = Dataset::load(&fixture.paths).unwrap();
    let config = EngineConfig::default();

    for seed in 0..10 {
        let rec = engine(seed)
            .recommend(&dataset, "C001", Some(evaluated_at()))
            .await
            .unwrap();

        let mut expected = 0.0;
        for component in Component::ALL {
            let value = rec.scores.get(component);
            assert!((0.0..=1.0).contains(&value), "{component} = {value}");
            expected += config.scoring_weights.weight(component) * value;
        }
        assert_eq!(rec.scores.components.len(), 5);
        assert!((rec.scores.final_score - expected).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_ineligible_products_are_never_selected() {
    let fixture = Fixture::grocery();
    let dataset = Dataset::load(&fixture.paths).unwrap();

    for seed in 0..50 {
        let rec = engine(seed)
            .recommend(&dataset, "C001", Some(evaluated_at()))
            .await
            .unwrap();
        assert!(
            ["P002", "P005", "P006"].contains(&rec.recommended_product_id.as_str()),
            "seed {seed} picked {}",
            rec.recommended_product_id
        );
        assert_eq!(rec.total_candidates, 3);
    }
}

#[tokio::test]
async fn test_cold_start_customer() {
    let fixture = Fixture::grocery();
    let dataset = Dataset::load(&fixture.paths).unwrap();

    let rec = engine(3)
        .recommend(&dataset, "NEW-CUSTOMER", Some(evaluated_at()))
        .await
        .unwrap();

    assert_eq!(rec.scores.get(Component::CategoryAffinity), 0.0);
    assert_eq!(rec.scores.get(Component::ClickstreamIntent), 0.0);
    assert_eq!(rec.scores.get(Component::RepurchaseLikelihood), 0.0);
    // Only discount and stock rules apply
    assert_eq!(rec.total_candidates, 4);
}

#[tokio::test]
async fn test_successive_calls_vary_until_exhausted() {
    let fixture = Fixture::grocery();
    let dataset = Dataset::load(&fixture.paths).unwrap();
    let engine = engine(5);

    let mut seen = HashSet::new();
    for _ in 0..3 {
        let rec = engine
            .recommend(&dataset, "C001", Some(evaluated_at()))
            .await
            .unwrap();
        assert!(seen.insert(rec.recommended_product_id), "repeated within window");
    }

    // Everything eligible has now been shown, a repeat is allowed
    let rec = engine.recommend(&dataset, "C001", Some(evaluated_at())).await;
    assert!(rec.is_some());
}

#[tokio::test]
async fn test_single_eligible_product_is_always_selected() {
    let fixture = Fixture::new(
        &[
            "P001,Carrots,produce,false,true,0.99",
            "P002,Milk,dairy,true,true,1.49",
            "P003,Bread,bakery,false,false,2.10",
        ],
        &[],
        &[],
    );
    let dataset = Dataset::load(&fixture.paths).unwrap();
    let engine = engine(8);

    for _ in 0..5 {
        let rec = engine
            .recommend(&dataset, "C001", Some(evaluated_at()))
            .await
            .unwrap();
        assert_eq!(rec.recommended_product_id, "P001");
        assert_eq!(rec.rank, 1);
        assert_eq!(rec.total_candidates, 1);
    }
}

#[tokio::test]
async fn test_nothing_eligible_yields_none() {
    let fixture = Fixture::new(&["P001,Carrots,produce,true,true,0.99"], &[], &[]);
    let dataset = Dataset::load(&fixture.paths).unwrap();

    assert!(engine(1)
        .recommend(&dataset, "C001", Some(evaluated_at()))
        .await
        .is_none());
}

#[test]
fn test_weighted_sampling_follows_scores() {
    let rng = shared_rng(Some(99));
    let draws = 10_000;

    let hits = (0..draws)
        .filter(|_| weighted_choice(&rng, &[0.9, 0.05, 0.05]) == Some(0))
        .count();

    let share = hits as f64 / draws as f64;
    assert!((share - 0.9).abs() < 0.02, "top candidate share {share}");
}

#[tokio::test]
async fn test_shown_products_survive_a_store_reload() {
    let fixture = Fixture::new(
        &[
            "P001,Carrots,produce,false,true,0.99",
            "P002,Milk,dairy,false,true,1.49",
        ],
        &[],
        &[],
    );
    let dataset = Dataset::load(&fixture.paths).unwrap();
    let store_path = fixture.path("shown_products.json");

    let first = {
        let store = Arc::new(JsonFileShownStore::open(&store_path).await);
        engine_with(store, 21)
            .recommend(&dataset, "C001", Some(evaluated_at()))
            .await
            .unwrap()
    };
    assert!(store_path.exists());

    let reopened = Arc::new(JsonFileShownStore::open(&store_path).await);
    let entries = reopened.entries("C001").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].product_id, first.recommended_product_id);

    let second = engine_with(reopened, 22)
        .recommend(&dataset, "C001", Some(evaluated_at()))
        .await
        .unwrap();
    assert_ne!(second.recommended_product_id, first.recommended_product_id);
}

#[tokio::test]
async fn test_batch_covers_every_customer_in_order() {
    let fixture = Fixture::grocery();
    let dataset = Arc::new(Dataset::load(&fixture.paths).unwrap());
    let engine = Arc::new(engine(13));

    let customers: Vec<String> = dataset.customer_ids().to_vec();
    assert_eq!(customers, vec!["C001".to_string(), "C002".to_string()]);

    let results = engine
        .recommend_batch(dataset, customers.clone(), Some(evaluated_at()))
        .await;

    assert_eq!(
        results.iter().map(|r| r.customer_id.clone()).collect::<Vec<_>>(),
        customers
    );
    assert!(results.iter().all(|r| r.recommendation.is_some()));
}
