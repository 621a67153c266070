use rand::Rng;

use super::{ScoringContext, Scorer};
use crate::models::Component;
use crate::services::random::{with_rng, SharedRng};

/// Uniform random noise that lets lower-ranked products surface now and then
pub struct ExplorationScorer {
    rng: SharedRng,
}

impl ExplorationScorer {
    pub fn new(rng: SharedRng) -> Self {
        Self { rng }
    }
}

impl Scorer for ExplorationScorer {
    fn component(&self) -> Component {
        Component::Exploration
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> Vec<f64> {
        let count = ctx.products().len();
        with_rng(&self.rng, |rng| (0..count).map(|_| rng.gen::<f64>()).collect())
    }
}
