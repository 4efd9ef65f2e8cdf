//! HTTP handlers module

mod devices;
mod telemetry;

pub use self::devices::*;
pub use self::telemetry::*;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub token_valid: bool,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "device-bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        token_valid: state.tokens.is_valid().await,
    })
}

/// Pass-through payload wrapper
#[derive(Serialize)]
pub struct ResultResponse<T> {
    pub result: T,
}

impl<T> ResultResponse<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}
