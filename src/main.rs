//! device-bridge - CRM/IoT device dashboard backend
//!
//! Resolves an email address to CRM accounts, their active wireless
//! devices and the matching IoT platform records, and serves the
//! dashboard bundle alongside the JSON API.

mod api;
mod auth;
mod config;
mod crm;
mod error;
mod iot;
mod models;
mod pipeline;
mod state;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{OAuthClient, TokenRefresher, TokenStore};
use crate::crm::CrmClient;
use crate::iot::IotClient;
use crate::pipeline::AggregationPipeline;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "device_bridge=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting device-bridge...");

    // Load configuration
    let config = config::Config::load()?;
    for key in config.missing_required() {
        tracing::error!("Missing required setting: {}", key);
    }
    tracing::info!("Configuration loaded");

    // IoT authentication
    let tokens = Arc::new(TokenStore::new());
    let oauth = Arc::new(OAuthClient::new(config.oauth.clone(), tokens.clone())?);

    // Upstream clients
    let crm = Arc::new(CrmClient::new(&config.crm, &config.ntlm));
    let iot = Arc::new(IotClient::new(&config.iot, oauth.clone())?);
    tracing::info!(
        "Upstreams: CRM {}, IoT {}",
        config.crm.base_url,
        config.iot.base_url
    );

    let pipeline = Arc::new(AggregationPipeline::new(
        crm,
        iot,
        config.pipeline.account_concurrency,
        config.pipeline.device_concurrency,
    ));

    start_background_tasks(
        oauth,
        Duration::from_secs(config.oauth.refresh_interval_secs.max(1)),
    );

    // Build application router
    let app = api::routes()
        .fallback_service(static_files(&config.server.static_dir))
        .with_state(AppState::new(pipeline, tokens))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    serve(&config, app).await
}

/// Dashboard bundle with single-page fallback to `index.html`
fn static_files(dir: &str) -> ServeDir<ServeFile> {
    if !Path::new(dir).is_dir() {
        tracing::warn!("Static directory {} not found, UI will not be served", dir);
    }
    ServeDir::new(dir).fallback(ServeFile::new(Path::new(dir).join("index.html")))
}

/// Start background tasks (token refresher)
fn start_background_tasks(oauth: Arc<OAuthClient>, period: Duration) {
    let refresher = Arc::new(TokenRefresher::new(oauth, period));
    tokio::spawn(async move {
        refresher.start().await;
    });

    tracing::info!("Background tasks started");
}

async fn serve(config: &config::Config, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            tracing::info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::warn!("TLS not configured, serving plain HTTP");
            tracing::info!("Listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}
