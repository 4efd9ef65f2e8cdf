//! API module - HTTP handlers and routes

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Devices
        .route("/api/get_devices_list", post(handlers::get_devices_list))
        .route("/api/get_device/:id", get(handlers::get_device))
        // Telemetry
        .route("/api/get_data_usage/:id", get(handlers::get_data_usage))
        .route(
            "/api/get_connection_status/:id",
            get(handlers::get_connection_status),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::TokenStore;
    use crate::pipeline::tests::{accounts_grid, device_json, wireless_grid, FakeCrm, FakeIot};
    use crate::pipeline::AggregationPipeline;

    fn app(crm: FakeCrm, iot: FakeIot) -> Router {
        let pipeline = AggregationPipeline::new(Arc::new(crm), Arc::new(iot), 2, 2);
        routes().with_state(AppState::new(
            Arc::new(pipeline),
            Arc::new(TokenStore::new()),
        ))
    }

    fn populated() -> Router {
        let mut crm = FakeCrm {
            accounts_html: Some(accounts_grid(&["Acme"])),
            ..FakeCrm::default()
        };
        crm.wireless
            .insert("Acme".into(), wireless_grid(&[("SN1", "Active")], true));
        app(crm, FakeIot::default().with_device("SN1", "id-1"))
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_token_state() {
        let (status, body) = send(populated(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["token_valid"], false);
    }

    #[tokio::test]
    async fn test_devices_list_requires_email() {
        for payload in [json!({}), json!({ "email": "   " })] {
            let (status, body) =
                send(populated(), Method::POST, "/api/get_devices_list", Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Email parameter is required.");
        }
    }

    #[tokio::test]
    async fn test_devices_list() {
        let (status, body) = send(
            populated(),
            Method::POST,
            "/api/get_devices_list",
            Some(json!({ "email": "owner@example.com" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["accountName"], "Acme");
        assert_eq!(body["data"][0]["devices"][0]["_id"], "id-1");
        assert_eq!(body["data"][0]["devices"][0]["serialNumber"], "SN1");
        assert_eq!(body["data"][0]["devices"][0]["info"]["iccid"], "8901SN1");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_devices_list_crm_outage_is_generic_500() {
        let (status, body) = send(
            app(FakeCrm::default(), FakeIot::default()),
            Method::POST,
            "/api/get_devices_list",
            Some(json!({ "email": "owner@example.com" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error.");
    }

    #[tokio::test]
    async fn test_get_device() {
        let (status, body) = send(populated(), Method::GET, "/api/get_device/id-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], device_json("id-1", "SN1"));
        // No record page configured in the fake
        assert_eq!(body["extraData"]["wirelessPlan"], "");
        assert_eq!(body["extraData"]["monthlyRate"], "");
    }

    #[tokio::test]
    async fn test_data_usage() {
        let (status, body) = send(
            populated(),
            Method::GET,
            "/api/get_data_usage/id-1?unit=hour&after=100&before=200",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["kind"], "hour");
        assert_eq!(body["result"]["before"], "200");

        let (status, body) =
            send(populated(), Method::GET, "/api/get_data_usage/id-1?month=2024-05", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["kind"], "day");

        let (status, _) =
            send(populated(), Method::GET, "/api/get_data_usage/id-1?unit=week", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_connection_status() {
        let (status, body) = send(
            populated(),
            Method::GET,
            "/api/get_connection_status/id-1?start_time=1&end_time=2",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"][0], json!([1714550400, 1]));
    }
}
