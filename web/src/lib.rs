//! HTTP surface of the platform: routing, controllers and error mapping.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use domain::error::{config_error, Error as DomainError};
use domain::gateway::llm::LlmClient;
use domain::gateway::object_storage::Storage;
use domain::Transcriber;
use log::*;
use service::config::Config;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use self::error::{Error, Result};

mod controller;
mod error;
mod params;
mod response;
pub mod router;

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub transcriber: Arc<Transcriber>,
    pub storage: Arc<dyn Storage>,
    pub llm: Option<Arc<LlmClient>>,
}

impl AppState {
    pub fn new(
        config: Config,
        transcriber: Arc<Transcriber>,
        storage: Arc<dyn Storage>,
        llm: Option<Arc<LlmClient>>,
    ) -> Self {
        Self {
            config,
            transcriber,
            storage,
            llm,
        }
    }

    /// The chat client, or a configuration error when no LLM is configured.
    pub fn llm(&self) -> std::result::Result<&LlmClient, DomainError> {
        self.llm
            .as_deref()
            .ok_or_else(|| config_error("LLM_API_KEY is not configured"))
    }
}

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let server_url = format!("{}:{}", interface, app_state.config.port);
    let listener = TcpListener::bind(&server_url).await?;

    let allowed_origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    info!("Server starting... listening for connections on http://{server_url}");
    info!("CORS allowed origins: {allowed_origins:?}");

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_credentials(true)
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .allow_origin(allowed_origins);

    let router = router::define_routes(app_state).layer(cors_layer);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server");
}
