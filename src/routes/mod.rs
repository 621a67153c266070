use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::TablePaths;
use crate::middleware::{make_span_with_request_id, request_id_middleware};
use crate::services::RecommendationEngine;

pub mod recommendations;
pub mod shown;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    /// Tables used when a request does not name its own
    pub tables: TablePaths,
}

impl AppState {
    pub fn new(engine: Arc<RecommendationEngine>, tables: TablePaths) -> Self {
        Self { engine, tables }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route("/recommendations/batch", post(recommendations::recommend_batch))
        .route("/shown", delete(shown::clear_all))
        .route(
            "/shown/:customer_id",
            get(shown::list).delete(shown::clear_customer),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
