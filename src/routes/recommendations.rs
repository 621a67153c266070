use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    db::{Dataset, TablePaths},
    error::{AppError, AppResult},
    models::{BatchRecommendation, Recommendation},
    routes::AppState,
};

/// Optional overrides shared by the single and batch endpoints
#[derive(Debug, Default, Deserialize)]
pub struct EvaluationOptions {
    pub products_path: Option<PathBuf>,
    pub transactions_path: Option<PathBuf>,
    pub interactions_path: Option<PathBuf>,
    /// Evaluation instant, defaults to now
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl EvaluationOptions {
    fn table_paths(&self, defaults: &TablePaths) -> TablePaths {
        TablePaths {
            products: self.products_path.clone().unwrap_or_else(|| defaults.products.clone()),
            transactions: self
                .transactions_path
                .clone()
                .unwrap_or_else(|| defaults.transactions.clone()),
            interactions: self
                .interactions_path
                .clone()
                .unwrap_or_else(|| defaults.interactions.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub customer_id: String,
    #[serde(flatten)]
    pub options: EvaluationOptions,
}

#[derive(Debug, Deserialize)]
pub struct BatchRecommendationRequest {
    pub customer_ids: Vec<String>,
    #[serde(flatten)]
    pub options: EvaluationOptions,
}

/// Reads the tables off the async runtime
async fn load_dataset(paths: TablePaths) -> AppResult<Dataset> {
    tokio::task::spawn_blocking(move || Dataset::load(&paths))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}

/// Handler for the single-customer recommendation endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<Recommendation>> {
    let customer_id = request.customer_id.trim();
    if customer_id.is_empty() {
        return Err(AppError::InvalidInput("customer_id must not be empty".to_string()));
    }

    let dataset = load_dataset(request.options.table_paths(&state.tables)).await?;

    state
        .engine
        .recommend(&dataset, customer_id, request.options.evaluated_at)
        .await
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("No recommendation available for customer {}", customer_id))
        })
}

/// Handler for the batch recommendation endpoint
pub async fn recommend_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRecommendationRequest>,
) -> AppResult<Json<Vec<BatchRecommendation>>> {
    let customer_ids: Vec<String> = request
        .customer_ids
        .iter()
        .map(|id| id.trim().to_string())
        .collect();
    if customer_ids.iter().any(|id| id.is_empty()) {
        return Err(AppError::InvalidInput("customer_ids must not contain empty ids".to_string()));
    }

    let dataset = Arc::new(load_dataset(request.options.table_paths(&state.tables)).await?);
    let results = state
        .engine
        .recommend_batch(dataset, customer_ids, request.options.evaluated_at)
        .await;

    Ok(Json(results))
}
