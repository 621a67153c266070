use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::TablePaths;
use crate::error::{AppError, AppResult};
use crate::models::{Component, EventType};

/// Tolerance allowed on the sum of the scoring weights
pub const WEIGHT_SUM_EPSILON: f64 = 0.01;

/// Longest time window accepted anywhere in the engine document
pub const MAX_WINDOW_DAYS: u32 = 36_500;

const MAX_WINDOW_HOURS: f64 = MAX_WINDOW_DAYS as f64 * 24.0;

/// Process configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the YAML engine configuration document
    #[serde(default = "default_engine_config_path")]
    pub engine_config_path: PathBuf,

    /// Default product catalog CSV
    #[serde(default = "default_products_path")]
    pub products_path: PathBuf,

    /// Default transaction history CSV
    #[serde(default = "default_transactions_path")]
    pub transactions_path: PathBuf,

    /// Default interaction events CSV
    #[serde(default = "default_interactions_path")]
    pub interactions_path: PathBuf,

    /// JSON file backing the shown-product store
    #[serde(default = "default_shown_store_path")]
    pub shown_store_path: PathBuf,

    /// When set, shown products are kept in Redis instead of the JSON file
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_engine_config_path() -> PathBuf {
    PathBuf::from("config/engine.yaml")
}

fn default_products_path() -> PathBuf {
    PathBuf::from("data/products.csv")
}

fn default_transactions_path() -> PathBuf {
    PathBuf::from("data/transactions.csv")
}

fn default_interactions_path() -> PathBuf {
    PathBuf::from("data/interactions.csv")
}

fn default_shown_store_path() -> PathBuf {
    PathBuf::from("data/shown_products.json")
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Default locations of the three input tables
    pub fn table_paths(&self) -> TablePaths {
        TablePaths {
            products: self.products_path.clone(),
            transactions: self.transactions_path.clone(),
            interactions: self.interactions_path.clone(),
        }
    }
}

// ============================================================================
// Engine configuration document
// ============================================================================

/// Scoring weights and per-component parameters, loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring_weights: ScoringWeights,
    pub category_affinity: CategoryAffinityConfig,
    pub repurchase_likelihood: RepurchaseConfig,
    pub clickstream_intent: ClickstreamConfig,
    pub product_popularity: PopularityConfig,
    pub constraints: ConstraintConfig,
    pub selection: SelectionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub category_affinity: f64,
    pub repurchase_likelihood: f64,
    pub clickstream_intent: f64,
    pub product_popularity: f64,
    pub exploration: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            category_affinity: 0.30,
            repurchase_likelihood: 0.25,
            clickstream_intent: 0.20,
            product_popularity: 0.15,
            exploration: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, component: Component) -> f64 {
        match component {
            Component::CategoryAffinity => self.category_affinity,
            Component::RepurchaseLikelihood => self.repurchase_likelihood,
            Component::ClickstreamIntent => self.clickstream_intent,
            Component::ProductPopularity => self.product_popularity,
            Component::Exploration => self.exploration,
        }
    }

    pub fn sum(&self) -> f64 {
        Component::ALL.iter().map(|c| self.weight(*c)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryAffinityConfig {
    /// Days for a purchase's influence to fall to 1/e
    pub decay_days: f64,
}

impl Default for CategoryAffinityConfig {
    fn default() -> Self {
        Self { decay_days: 30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepurchaseConfig {
    /// Cycle assumed when only one purchase is known
    pub expected_cycle_days: f64,
    pub cycle_std_days: f64,
    pub min_purchases: usize,
}

impl Default for RepurchaseConfig {
    fn default() -> Self {
        Self {
            expected_cycle_days: 7.0,
            cycle_std_days: 3.0,
            min_purchases: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventWeights {
    pub view: f64,
    pub click: f64,
    pub add_to_cart: f64,
}

impl Default for EventWeights {
    fn default() -> Self {
        Self {
            view: 0.3,
            click: 0.5,
            add_to_cart: 1.0,
        }
    }
}

impl EventWeights {
    /// Stronger intent never weighs less: view <= click <= add_to_cart
    pub fn is_ordered(&self) -> bool {
        self.view <= self.click && self.click <= self.add_to_cart
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickstreamConfig {
    pub recency_weight: f64,
    pub decay_hours: f64,
    pub event_weights: EventWeights,
    /// Weight used for event types outside view/click/add_to_cart
    pub default_event_weight: f64,
}

impl Default for ClickstreamConfig {
    fn default() -> Self {
        Self {
            recency_weight: 0.6,
            decay_hours: 48.0,
            event_weights: EventWeights::default(),
            default_event_weight: 0.3,
        }
    }
}

impl ClickstreamConfig {
    pub fn event_weight(&self, event_type: &EventType) -> f64 {
        match event_type {
            EventType::View => self.event_weights.view,
            EventType::Click => self.event_weights.click,
            EventType::AddToCart => self.event_weights.add_to_cart,
            EventType::Unknown => self.default_event_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopularityConfig {
    pub customer_weight: f64,
    pub frequency_weight: f64,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self {
            customer_weight: 0.6,
            frequency_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// 0 disables the recent-purchase rule
    pub exclude_recent_purchases_days: u32,
    pub exclude_discounted: bool,
    pub exclude_out_of_stock: bool,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            exclude_recent_purchases_days: 7,
            exclude_discounted: true,
            exclude_out_of_stock: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub top_k: usize,
    /// Window during which a shown product is not offered again
    pub decay_hours: f64,
    pub random_seed: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            decay_hours: 24.0,
            random_seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log the top scored products of every recommendation at debug level
    pub verbose: bool,
}

impl EngineConfig {
    /// Parses and validates a YAML engine configuration document
    pub fn from_yaml_str(yaml: &str) -> AppResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the engine configuration at `path`
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        tracing::info!(path = %path.display(), "Engine configuration loaded");
        Ok(config)
    }

    /// Checks every parameter the scoring pipeline relies on
    pub fn validate(&self) -> AppResult<()> {
        for component in Component::ALL {
            let weight = self.scoring_weights.weight(component);
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::Config(format!(
                    "scoring weight for {} must be a non-negative number, got {}",
                    component, weight
                )));
            }
        }

        let sum = self.scoring_weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(AppError::Config(format!(
                "scoring weights must sum to 1.0, got {:.4}",
                sum
            )));
        }

        positive("category_affinity.decay_days", self.category_affinity.decay_days)?;
        positive(
            "repurchase_likelihood.cycle_std_days",
            self.repurchase_likelihood.cycle_std_days,
        )?;
        positive(
            "repurchase_likelihood.expected_cycle_days",
            self.repurchase_likelihood.expected_cycle_days,
        )?;
        positive("clickstream_intent.decay_hours", self.clickstream_intent.decay_hours)?;
        positive("selection.decay_hours", self.selection.decay_hours)?;
        at_most("selection.decay_hours", self.selection.decay_hours, MAX_WINDOW_HOURS)?;
        at_most(
            "clickstream_intent.decay_hours",
            self.clickstream_intent.decay_hours,
            MAX_WINDOW_HOURS,
        )?;
        if self.constraints.exclude_recent_purchases_days > MAX_WINDOW_DAYS {
            return Err(AppError::Config(format!(
                "constraints.exclude_recent_purchases_days must be at most {}, got {}",
                MAX_WINDOW_DAYS, self.constraints.exclude_recent_purchases_days
            )));
        }

        let recency = self.clickstream_intent.recency_weight;
        if !(0.0..=1.0).contains(&recency) {
            return Err(AppError::Config(format!(
                "clickstream_intent.recency_weight must be within [0, 1], got {}",
                recency
            )));
        }

        let events = &self.clickstream_intent.event_weights;
        for (name, value) in [
            ("view", events.view),
            ("click", events.click),
            ("add_to_cart", events.add_to_cart),
            ("default", self.clickstream_intent.default_event_weight),
        ] {
            unit_interval(&format!("clickstream_intent event weight {}", name), value)?;
        }
        if !events.is_ordered() {
            return Err(AppError::Config(format!(
                "clickstream_intent event weights must satisfy view <= click <= add_to_cart, got {} / {} / {}",
                events.view, events.click, events.add_to_cart
            )));
        }

        let popularity = &self.product_popularity;
        unit_interval("product_popularity.customer_weight", popularity.customer_weight)?;
        unit_interval("product_popularity.frequency_weight", popularity.frequency_weight)?;
        if popularity.customer_weight + popularity.frequency_weight > 1.0 + WEIGHT_SUM_EPSILON {
            return Err(AppError::Config(
                "product_popularity weights must not sum above 1.0".to_string(),
            ));
        }

        if self.selection.top_k == 0 {
            return Err(AppError::Config("selection.top_k must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn positive(name: &str, value: f64) -> AppResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AppError::Config(format!("{} must be positive, got {}", name, value)))
    }
}

fn at_most(name: &str, value: f64, max: f64) -> AppResult<()> {
    if value <= max {
        Ok(())
    } else {
        Err(AppError::Config(format!("{} must be at most {}, got {}", name, max, value)))
    }
}

fn unit_interval(name: &str, value: f64) -> AppResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}
