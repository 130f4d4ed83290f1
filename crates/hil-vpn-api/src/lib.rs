//! REST control plane for hil-vpnd

pub mod handlers;
pub mod models;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

use hil_vpn_control::VpnManager;

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<VpnManager>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "HIL VPN API",
        version = "0.1.0",
        description = "Create and delete OpenVPN endpoints bridged onto hardware-isolation VLANs"
    ),
    paths(handlers::create_vpn, handlers::delete_vpn, handlers::health_check),
    components(schemas(
        models::CreateVpnRequest,
        models::CreateVpnResponse,
        models::HealthResponse,
        models::ErrorResponse,
    )),
    tags(
        (name = "vpns", description = "Vpn lifecycle endpoints"),
        (name = "system", description = "System health endpoints")
    )
)]
pub struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, manager: Arc<VpnManager>) -> Self {
        let state = Arc::new(AppState { manager });
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_router = Router::new()
            .route("/vpns/new", post(handlers::create_vpn))
            .route("/vpns/{id}", delete(handlers::delete_vpn))
            .route("/health", get(handlers::health_check))
            .with_state(self.state.clone());

        Router::new()
            .route("/openapi.json", get(openapi_json))
            .merge(api_router)
            .layer(TraceLayer::new_for_http())
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
