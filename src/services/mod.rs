pub mod constraints;
pub mod engine;
pub mod random;
pub mod scoring;
pub mod selector;

pub use constraints::ConstraintFilter;
pub use engine::RecommendationEngine;
pub use random::{shared_rng, SharedRng};
pub use scoring::{days_before, hours_before, ScoredProduct, Scorer, ScoringEngine};
pub use selector::{CustomerLocks, Selection, Selector};
