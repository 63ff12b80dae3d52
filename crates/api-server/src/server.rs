//! API server: the ajax endpoint plus health endpoints, and the
//! Prometheus exporter on its own port.

use crate::ajax::AjaxOrchestrator;
use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use funnel_core::config::AppConfig;
use funnel_core::Catalog;
use funnel_journey::InMemoryFunnelStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        orchestrator: Arc<AjaxOrchestrator>,
        catalog: Arc<dyn Catalog>,
        funnels: Arc<InMemoryFunnelStore>,
    ) -> Self {
        let state = AppState::with_limits(
            orchestrator,
            catalog,
            funnels,
            config.node_id.clone(),
            &config.api,
        );
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the HTTP server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        self.spawn_session_sweeper();

        let addr = SocketAddr::new(
            self.config.api.host.parse()?,
            self.config.api.http_port,
        );

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Periodically drops idle session carts.
    fn spawn_session_sweeper(&self) {
        let sessions = self.state.sessions.clone();
        let period = Duration::from_secs(self.config.api.session_ttl_secs.clamp(1, 60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                sessions.sweep_expired();
            }
        });
    }

    /// Start the metrics server on a separate port.
    ///
    /// Installs the global recorder and spawns the scrape listener onto the
    /// current tokio runtime.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.metrics.port);
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        info!(addr = %addr, "Metrics exporter started");
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/ajax", post(rest::handle_ajax))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
