//! Telemetry pass-through handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::models::{ConnectionStatusQuery, DataUsageQuery};
use crate::state::AppState;

use super::ResultResponse;

/// GET /api/get_data_usage/:id - Hourly or daily traffic
pub async fn get_data_usage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DataUsageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let usage = state.pipeline.data_usage(&id, &query).await?;
    Ok(Json(ResultResponse::new(usage)))
}

/// GET /api/get_connection_status/:id - Online/offline transitions
pub async fn get_connection_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ConnectionStatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let events = state.pipeline.connection_status(&id, &query).await?;
    Ok(Json(ResultResponse::new(events)))
}
