//! # HTTP Server Module
//!
//! Diagnostic API over a running cluster.
//!
//! # Endpoints
//!
//! - `/api/health` - Health check with per-node access state
//! - `/api/metrics` - Counters, checkpoints and pending counts
//! - `/api/simulate` - Concurrency scenarios
//! - `/api/simulate/recovery` - Outage and recovery scenarios
//! - `/api/recovery/:pool/*` - Inspect and resolve a recovery log

pub mod config;
pub mod errors;
pub mod observability_routes;
pub mod recovery_routes;
pub mod server;
pub mod simulate_routes;

pub use config::HttpServerConfig;
pub use errors::ErrorResponse;
pub use server::HttpServer;
