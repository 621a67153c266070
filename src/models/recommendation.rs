use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display};

use crate::config::ScoringWeights;

/// The named signals that make up a product's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    CategoryAffinity,
    RepurchaseLikelihood,
    ClickstreamIntent,
    ProductPopularity,
    Exploration,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::CategoryAffinity,
        Component::RepurchaseLikelihood,
        Component::ClickstreamIntent,
        Component::ProductPopularity,
        Component::Exploration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::CategoryAffinity => "category_affinity",
            Component::RepurchaseLikelihood => "repurchase_likelihood",
            Component::ClickstreamIntent => "clickstream_intent",
            Component::ProductPopularity => "product_popularity",
            Component::Exploration => "exploration",
        }
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-component scores of one candidate plus their weighted sum
///
/// Always carries all five components; a signal that produced nothing is
/// recorded as 0 rather than left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub final_score: f64,
    #[serde(rename = "score_components")]
    pub components: BTreeMap<Component, f64>,
}

impl ScoreBreakdown {
    /// Builds a breakdown from whatever components were computed
    ///
    /// Missing components are filled with 0 and every value is clamped to [0, 1]
    /// before the weighted sum is taken.
    pub fn new(
        scores: impl IntoIterator<Item = (Component, f64)>,
        weights: &ScoringWeights,
    ) -> Self {
        let mut components: BTreeMap<Component, f64> =
            Component::ALL.iter().map(|c| (*c, 0.0)).collect();

        for (component, score) in scores {
            let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
            components.insert(component, score);
        }

        let final_score = components
            .iter()
            .map(|(component, score)| weights.weight(*component) * score)
            .sum();

        Self {
            final_score,
            components,
        }
    }

    pub fn get(&self, component: Component) -> f64 {
        self.components.get(&component).copied().unwrap_or(0.0)
    }
}

/// The explainable output of one recommendation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub customer_id: String,
    pub recommended_product_id: String,
    pub product_name: String,
    pub product_category: String,
    #[serde(flatten)]
    pub scores: ScoreBreakdown,
    /// 1-based position of the product among the filtered candidates
    pub rank: usize,
    /// Filtered candidates before top-K truncation
    pub total_candidates: usize,
    #[serde(rename = "timestamp")]
    pub evaluated_at: DateTime<Utc>,
}

/// One entry of a batch run; `recommendation` is `None` when nothing was eligible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecommendation {
    pub customer_id: String,
    pub recommendation: Option<Recommendation>,
}
