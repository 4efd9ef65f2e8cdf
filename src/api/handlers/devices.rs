//! Device listing and detail handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::models::DeviceListRequest;
use crate::state::AppState;

/// POST /api/get_devices_list - Devices of every account linked to an email
pub async fn get_devices_list(
    State(state): State<AppState>,
    Json(payload): Json<DeviceListRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email parameter is required.".to_string()))?;

    let listing = state.pipeline.list_devices_by_email(email).await?;

    tracing::info!(
        "Listed {} accounts / {} devices for {}",
        listing.data.len(),
        listing.data.iter().map(|a| a.devices.len()).sum::<usize>(),
        email
    );

    Ok(Json(listing))
}

/// GET /api/get_device/:id - Device detail plus CRM plan and rate
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device = state.pipeline.get_device_with_extras(&id).await?;
    Ok(Json(device))
}
