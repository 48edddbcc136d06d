//! # HTTP Server
//!
//! Combines the diagnostic routers under `/api` and serves them.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::observability_routes::observability_routes;
use super::recovery_routes::recovery_routes;
use super::simulate_routes::simulate_routes;
use crate::cluster::Cluster;
use crate::config::ConfigError;
use crate::observability::{Event, Logger};

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(cluster: Arc<Cluster>) -> Result<Self, ConfigError> {
        let config = cluster.config().http.clone();
        Self::with_config(cluster, config)
    }

    pub fn with_config(cluster: Arc<Cluster>, config: HttpServerConfig) -> Result<Self, ConfigError> {
        let router = Self::build_router(cluster, config.cors_layer()?);
        Ok(Self { config, router })
    }

    fn build_router(cluster: Arc<Cluster>, cors: CorsLayer) -> Router {
        let api = Router::new()
            .merge(observability_routes(Arc::clone(&cluster)))
            .merge(simulate_routes(Arc::clone(&cluster)))
            .merge(recovery_routes(cluster));

        Router::new()
            .nest("/api", api)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.config.socket_addr()
    }

    /// The assembled router, for in-process tests.
    pub fn router(self) -> Router {
        self.router
    }

    /// Serves until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self
            .socket_addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

        let listener = TcpListener::bind(addr).await?;
        Logger::event(Event::Serving, &[("addr", &addr.to_string())]);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
