//! Error handling module

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

const GENERIC_FAILURE: &str = "Internal Server Error.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Token acquisition against the identity provider failed
    #[error("Auth error: {0}")]
    Auth(String),

    /// An IoT call was rejected with the current token
    #[error("Upstream auth error: {0}")]
    UpstreamAuth(String),

    #[error("CRM error: {0}")]
    Crm(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_)
            | AppError::UpstreamAuth(_)
            | AppError::Crm(_)
            | AppError::Upstream(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Upstream bodies stay in the log, never in the response
        let message = match &self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => msg.clone(),
            other => {
                tracing::error!("Request failed: {}", other);
                GENERIC_FAILURE.to_string()
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upstream_details_are_hidden() {
        let (status, body) =
            body_json(AppError::Crm("401 from 10.10.0.27: <html>secret</html>".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], GENERIC_FAILURE);
        assert_eq!(body["status"], 500);

        let (status, body) = body_json(AppError::UpstreamAuth("token expired".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_client_errors_keep_message() {
        let (status, body) =
            body_json(AppError::BadRequest("Email parameter is required.".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email parameter is required.");

        let (status, _) = body_json(AppError::NotFound("device".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
