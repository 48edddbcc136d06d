//! Recovery log HTTP Routes
//!
//! - `GET /recovery/:pool/pending` - pending entries above the checkpoint
//! - `POST /recovery/:pool/resolve` - replay them now

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::errors::parse_pool;
use crate::cluster::Cluster;
use crate::errors::FragResult;
use crate::node::NodeId;
use crate::recovery_log::{RecoveryLogEntry, ResolveReport};

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pool: NodeId,
    pub checkpoint: u64,
    pub pending: Vec<RecoveryLogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub success: bool,
    pub report: ResolveReport,
}

pub fn recovery_routes(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route("/recovery/:pool/pending", get(pending_handler))
        .route("/recovery/:pool/resolve", post(resolve_handler))
        .with_state(cluster)
}

async fn pending_handler(
    State(cluster): State<Arc<Cluster>>,
    Path(pool): Path<String>,
) -> FragResult<Json<PendingResponse>> {
    let pool = parse_pool(&pool)?;
    Ok(Json(PendingResponse {
        pool,
        checkpoint: cluster.log().checkpoint(pool),
        pending: cluster.pending(pool),
    }))
}

/// `success` is false when any entry failed; the report says which.
async fn resolve_handler(
    State(cluster): State<Arc<Cluster>>,
    Path(pool): Path<String>,
) -> FragResult<Json<ResolveResponse>> {
    let pool = parse_pool(&pool)?;
    let report = cluster.resolve_pending(pool).await;
    Ok(Json(ResolveResponse {
        success: report.all_succeeded(),
        report,
    }))
}
