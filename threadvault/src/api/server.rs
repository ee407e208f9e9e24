use super::routes;
use crate::config::CorsConfig;
use crate::gateway::Gateway;
use crate::Result;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Renders the metrics exposition text served at `/metrics`
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Option<MetricsRender>,
}

pub struct ApiServer {
    gateway: Arc<Gateway>,
    cors_config: CorsConfig,
    metrics: Option<MetricsRender>,
}

impl ApiServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self::with_cors(gateway, CorsConfig::default())
    }

    pub fn with_cors(gateway: Arc<Gateway>, cors_config: CorsConfig) -> Self {
        Self {
            gateway,
            cors_config,
            metrics: None,
        }
    }

    /// Serve `/metrics` from the given renderer
    pub fn with_metrics(mut self, render: MetricsRender) -> Self {
        self.metrics = Some(render);
        self
    }

    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();
        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            metrics: self.metrics.clone(),
        };

        let api = Router::new()
            .route("/search/:content_type", get(routes::search))
            .route("/analyze/user/:username", get(routes::analyze_user))
            .route("/submission/comment_ids/:id", get(routes::comment_ids))
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics));

        // Paths of the original public API
        let legacy = Router::new()
            .route("/reddit/search", get(routes::search_comments))
            .route("/reddit/search/comment", get(routes::search_comments))
            .route("/reddit/comment/search", get(routes::search_comments))
            .route("/reddit/search/submission", get(routes::search_submissions))
            .route("/reddit/submission/search", get(routes::search_submissions))
            .route("/reddit/analyze/user/:username", get(routes::analyze_user))
            .route(
                "/reddit/submission/comment_ids/:id",
                get(routes::comment_ids),
            )
            .route("/get/comment_ids/:id", get(routes::comment_ids));

        Router::new()
            .merge(api)
            .merge(legacy)
            .with_state(state)
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
