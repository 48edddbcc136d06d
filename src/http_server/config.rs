//! Listener settings for the `/api` diagnostic surface.
//!
//! The dashboard dev server runs on port 3000, so its origins are allowed by
//! default. An empty origin list opens the API to any origin.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ConfigError;

pub const DEFAULT_API_PORT: u16 = 3001;

const DASHBOARD_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// The `http` section of the cluster config file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// IP literal; host names are not resolved
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_API_PORT,
            cors_origins: DASHBOARD_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl HttpServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::invalid(format!("http.host {:?} is not an IP address", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    fn origins(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| ConfigError::invalid(format!("http.cors_origins: bad origin {:?}", origin)))
            })
            .collect()
    }

    pub fn cors_layer(&self) -> Result<CorsLayer, ConfigError> {
        let allow = if self.cors_origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(self.origins()?)
        };
        Ok(CorsLayer::new()
            .allow_origin(allow)
            .allow_methods(Any)
            .allow_headers(Any))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        self.origins()?;
        Ok(())
    }
}
