// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Unauthenticated liveness probe.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::gateway::AppState;

pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use egret_config::Config;
    use egret_core::{MockBackend, SessionRegistry};
    use std::sync::Arc;

    #[tokio::test]
    async fn health_reports_session_count() {
        let state = AppState {
            registry: SessionRegistry::new(),
            backend: Arc::new(MockBackend::empty()),
            config: Arc::new(Config::default()),
            auth: crate::http::auth::AuthState::with_defaults(
                crate::token::RawToken::generate().into_stored(),
            ),
            profiles: Arc::new(
                egret_core::ProfileStore::new(tempfile::tempdir().unwrap().into_path()).unwrap(),
            ),
        };
        let Json(body) = handle_health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }
}
