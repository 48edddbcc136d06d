//! Observability HTTP Routes
//!
//! Health check and counters.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cluster::Cluster;
use crate::node::NodeId;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub nodes: Vec<NodeHealth>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub accessible: bool,
    pub available_connections: usize,
}

pub fn observability_routes(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(cluster)
}

/// Reports `degraded` while any node is cut off.
async fn health_handler(State(cluster): State<Arc<Cluster>>) -> impl IntoResponse {
    let nodes: Vec<NodeHealth> = cluster
        .registry()
        .pools()
        .map(|pool| NodeHealth {
            node_id: pool.node(),
            accessible: pool.is_accessible() && !pool.is_closed(),
            available_connections: pool.available_connections(),
        })
        .collect();
    let status = if nodes.iter().all(|n| n.accessible) {
        "ok"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        nodes,
    };
    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(cluster): State<Arc<Cluster>>) -> impl IntoResponse {
    let recovery: Value = NodeId::ALL
        .iter()
        .map(|pool| {
            (
                pool.to_string(),
                json!({
                    "checkpoint": cluster.log().checkpoint(*pool),
                    "pending": cluster.pending(*pool).len(),
                }),
            )
        })
        .collect::<serde_json::Map<_, _>>()
        .into();

    let body = json!({
        "counters": cluster.metrics().to_json(),
        "recovery": recovery,
        "lockedResources": cluster.locks().locked_resources(),
    });
    (StatusCode::OK, Json(body))
}
