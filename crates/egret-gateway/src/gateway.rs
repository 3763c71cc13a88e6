// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Gateway startup — assembles the session core and starts the HTTP server.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order, then blocks on the Axum server:
//!
//! 1. Load or generate the HTTP bearer token; print it **once** if new.
//! 2. Build the shared [`SessionRegistry`] and spawn the idle-session reaper.
//! 3. Build the Axum router (bearer auth, security headers, CSRF guard).
//! 4. Serve on `http.host:http.port` (blocks until shutdown).
//!
//! # Token management
//!
//! ```text
//! First start:  token generated → SHA-256 hash stored in token.yaml
//!               raw token printed once (save it!)
//! Client:       Authorization: Bearer <token>
//! Rotate:       egret gateway regenerate-token
//!               old token immediately invalid
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use egret_config::Config;
use egret_core::{BrowserBackend, MockBackend, ProfileStore, SessionReaper, SessionRegistry};

use crate::http::auth::{bearer_auth_mw, AuthState};
use crate::http::security::{csrf_guard, security_headers};
use crate::http::{action, health};
use crate::token::StoredTokenFile;

/// Shared state threaded through every route handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub backend: Arc<dyn BrowserBackend>,
    pub config: Arc<Config>,
    pub auth: AuthState,
    pub profiles: Arc<ProfileStore>,
}

/// Expands a leading `~` to the user's home directory; passes other paths through.
fn expand_tilde(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}

impl crate::http::auth::AsAuthState for AppState {
    fn auth_state(&self) -> &AuthState {
        &self.auth
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(action::handle_action))
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth_mw::<AppState>))
        .route("/health", get(health::handle_health))
        .layer(middleware::from_fn(csrf_guard))
        .layer(middleware::from_fn(security_headers))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Assembles subsystems and blocks on the HTTP server. The backend is
/// injected so tests can substitute [`MockBackend`] — the shipped binary
/// passes [`MockBackend`] too, since no concrete browser engine is wired
/// up in this tree (see SPEC_FULL.md §1).
pub async fn run(config: Config, token_path: std::path::PathBuf) -> anyhow::Result<()> {
    let (stored_token, raw) = StoredTokenFile::load_or_generate(&token_path)?;
    if let Some(raw) = raw {
        tracing::warn!("generated new bearer token, save it now — it will not be shown again");
        println!("Bearer token: {raw}");
    }

    let registry = SessionRegistry::new();
    let reaper = SessionReaper::spawn(
        registry.clone(),
        Duration::from_secs(config.session.sweep_interval_secs),
        Duration::from_secs(config.session.idle_ttl_secs),
    );

    let profiles = Arc::new(
        ProfileStore::new(expand_tilde(&config.profile.dir))
            .map_err(|e| anyhow::anyhow!("{}", e.message))?,
    );

    let state = AppState {
        registry,
        backend: Arc::new(MockBackend::empty()),
        config: Arc::new(config.clone()),
        auth: AuthState::with_defaults(stored_token),
        profiles,
    };

    let app = router(state);
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    tracing::info!(%addr, "egret gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            registry: SessionRegistry::new(),
            backend: Arc::new(MockBackend::empty()),
            config: Arc::new(Config::default()),
            auth: AuthState::with_defaults(crate::token::RawToken::generate().into_stored()),
            profiles: Arc::new(egret_core::ProfileStore::new(tempfile::tempdir().unwrap().into_path()).unwrap()),
        }
    }

    #[tokio::test]
    async fn health_endpoint_does_not_require_auth() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn action_endpoint_rejects_missing_bearer_token() {
        let app = router(test_state());
        let mut request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        request.extensions_mut().insert(axum::extract::ConnectInfo(
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap(),
        ));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
