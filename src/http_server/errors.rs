//! Error responses
//!
//! Every handler error is a `FragError`, rendered with its taxonomy status
//! as `{ "success": false, "error": ..., "code": ... }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::FragError;
use crate::node::NodeId;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

impl From<&FragError> for ErrorResponse {
    fn from(err: &FragError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.code(),
        }
    }
}

impl IntoResponse for FragError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Parses a `:pool` path segment.
pub fn parse_pool(raw: &str) -> Result<NodeId, FragError> {
    raw.parse()
        .map_err(|e: crate::node::UnknownNode| FragError::invalid_request(e.to_string()))
}
