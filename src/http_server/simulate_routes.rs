//! Simulation HTTP Routes
//!
//! - `GET /simulate?isolation=<LEVEL>&case=<1..3>&locks=<bool>`
//! - `GET /simulate/recovery?case=<1..4>`

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::errors::{FragError, FragResult};
use crate::simulation::{run_concurrency_case, run_recovery_case, LockPolicy, SimulationReport};
use crate::transaction::IsolationLevel;

#[derive(Debug, Default, Deserialize)]
pub struct SimulateParams {
    pub isolation: Option<String>,
    pub case: Option<String>,
    pub locks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulationResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: SimulationReport,
}

impl From<SimulationReport> for SimulationResponse {
    fn from(report: SimulationReport) -> Self {
        Self {
            success: true,
            report,
        }
    }
}

pub fn simulate_routes(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route("/simulate", get(simulate_handler))
        .route("/simulate/recovery", get(simulate_recovery_handler))
        .with_state(cluster)
}

fn parse_case(raw: Option<&str>, max: u8) -> FragResult<u8> {
    raw.and_then(|s| s.trim().parse::<u8>().ok())
        .filter(|case| (1..=max).contains(case))
        .ok_or_else(|| {
            FragError::invalid_request(format!("missing or invalid case param (1..{})", max))
        })
}

fn parse_locks(raw: Option<&str>) -> FragResult<LockPolicy> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("true") | Some("1") | Some("on") => Ok(LockPolicy::Enforced),
        Some("false") | Some("0") | Some("off") => Ok(LockPolicy::Bypassed),
        Some(other) => Err(FragError::invalid_request(format!(
            "invalid locks param: {}",
            other
        ))),
    }
}

async fn simulate_handler(
    State(cluster): State<Arc<Cluster>>,
    Query(params): Query<SimulateParams>,
) -> FragResult<Json<SimulationResponse>> {
    let isolation = match params.isolation.as_deref() {
        None => cluster.config().default_isolation,
        raw => IsolationLevel::from_request_param(raw)?,
    };
    let case = parse_case(params.case.as_deref(), 3)?;
    let policy = parse_locks(params.locks.as_deref())?;

    let report = run_concurrency_case(&cluster, case, isolation, policy).await?;
    Ok(Json(report.into()))
}

async fn simulate_recovery_handler(
    State(cluster): State<Arc<Cluster>>,
    Query(params): Query<SimulateParams>,
) -> FragResult<Json<SimulationResponse>> {
    let case = parse_case(params.case.as_deref(), 4)?;
    let report = run_recovery_case(&cluster, case).await?;
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_bounds() {
        assert_eq!(parse_case(Some("2"), 3).unwrap(), 2);
        assert!(parse_case(Some("0"), 3).is_err());
        assert!(parse_case(Some("4"), 3).is_err());
        assert!(parse_case(Some("x"), 4).is_err());
        assert!(parse_case(None, 4).is_err());
    }

    #[test]
    fn test_parse_locks() {
        assert_eq!(parse_locks(None).unwrap(), LockPolicy::Enforced);
        assert_eq!(parse_locks(Some("false")).unwrap(), LockPolicy::Bypassed);
        assert!(parse_locks(Some("maybe")).is_err());
    }
}
