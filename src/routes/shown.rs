use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{error::AppResult, models::ShownEntry, routes::AppState};

/// Every product recorded as shown to the customer, oldest first
pub async fn list(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Vec<ShownEntry>>> {
    let entries = state.engine.shown_store().entries(&customer_id).await?;
    Ok(Json(entries))
}

pub async fn clear_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> AppResult<StatusCode> {
    state.engine.shown_store().clear_customer(&customer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_all(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.engine.shown_store().clear_all().await?;
    Ok(StatusCode::NO_CONTENT)
}
