// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP-facing errors. Distinct from `egret_core::BrowserError`: a
//! `GatewayError` describes why a *request* failed (bad auth, bad body,
//! unknown session) and carries its own HTTP status; a `BrowserError`
//! describes why an *action* failed once dispatched. `dispatch_http`
//! converts the latter into the former's 422 variant.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("too many sessions (max {0})")]
    TooManySessions(usize),
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error("action failed: {0}")]
    ActionFailed(egret_core::BrowserError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<egret_core::BrowserError> for GatewayError {
    fn from(err: egret_core::BrowserError) -> Self {
        GatewayError::ActionFailed(err)
    }
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::TooManySessions(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ActionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::ActionFailed(err) => json!({
                "success": false,
                "error_code": err.code.as_str(),
                "error_message": err.message,
            }),
            other => json!({
                "success": false,
                "error_code": "GATEWAY_ERROR",
                "error_message": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(GatewayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn session_not_found_maps_to_404() {
        assert_eq!(GatewayError::SessionNotFound("abc".to_string()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn too_many_sessions_maps_to_503() {
        assert_eq!(GatewayError::TooManySessions(10).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn action_failed_maps_to_422() {
        let err = egret_core::classify_error("unknown failure", None);
        assert_eq!(GatewayError::ActionFailed(err).status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
