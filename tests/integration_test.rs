// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios against the full gateway router, driven in-process
//! via `tower::ServiceExt::oneshot` (the same pattern `egret-gateway`'s own
//! unit tests use) rather than a bound TCP listener. The backend is a
//! [`MockBackend`] scripted per scenario — `launch`/`close` never draw from
//! the scripted queue, every other `BrowserBackend` call draws from one
//! shared queue in call order, so each script below is ordered to match
//! exactly the navigate/page_state/click calls the scenario will make.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use egret_config::Config;
use egret_core::{CursorInteractiveElement, MockBackend, PageState, ProfileStore, ScriptedResponse, SessionRegistry};
use egret_gateway::http::auth::AuthState;
use egret_gateway::token::RawToken;
use egret_gateway::{router, AppState};

fn example_page(title: &str, aria: &str) -> PageState {
    PageState {
        url: "https://example.com".to_string(),
        title: title.to_string(),
        tab_count: 1,
        tab_index: 1,
        raw_aria: aria.to_string(),
        cursor_interactive: Vec::<CursorInteractiveElement>::new(),
    }
}

/// Builds an `AppState` around `backend` and returns it alongside the raw
/// bearer token clients must send — the raw value only ever exists for this
/// one moment, mirroring how `StoredTokenFile::load_or_generate` hands it
/// to the operator exactly once.
fn state_with(backend: MockBackend) -> (AppState, String) {
    let raw = RawToken::generate();
    let token = raw.as_str().to_string();
    let state = AppState {
        registry: SessionRegistry::new(),
        backend: Arc::new(backend),
        config: Arc::new(Config::default()),
        auth: AuthState::with_defaults(raw.into_stored()),
        profiles: Arc::new(ProfileStore::new(tempfile::tempdir().unwrap().into_path()).unwrap()),
    };
    (state, token)
}

fn authed_request(token: &str, body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo("127.0.0.1:9999".parse::<SocketAddr>().unwrap()));
    request
}

/// Sends an authenticated request and returns `(status, body)` without
/// asserting — used by scenarios that expect a non-200 response.
async fn send(app: &axum::Router, token: &str, body: Value) -> (StatusCode, Value) {
    let response = app.clone().oneshot(authed_request(token, body)).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Sends an authenticated request and asserts a 200 OK, returning the body.
async fn post(app: &axum::Router, token: &str, body: Value) -> Value {
    let (status, parsed) = send(app, token, body).await;
    assert_eq!(status, StatusCode::OK, "unexpected status, body was {parsed}");
    parsed
}

/// S1: launch against example.com, then snapshot, then verify the ref map.
#[tokio::test]
async fn s1_launch_and_snapshot_produce_a_ref_map() {
    let backend = MockBackend::new(vec![
        ScriptedResponse::Page(example_page("Example Domain", "")),
        ScriptedResponse::Page(example_page("Example Domain", "- link \"More information...\"")),
    ]);
    let (state, token) = state_with(backend);
    let app = router(state);

    let launch = post(&app, &token, json!({"op": "launch", "tier": 1, "url": "https://example.com"})).await;
    assert_eq!(launch["success"], true);
    assert_eq!(launch["page"]["data"]["title"], "Example Domain");
    let session_id = launch["session_id"].as_str().unwrap().to_string();

    let snap = post(&app, &token, json!({"op": "snapshot", "session_id": session_id, "compact": true})).await;
    assert_eq!(snap["success"], true);
    let refs = snap["data"]["refs"].as_object().unwrap();
    assert!(!refs.is_empty());
    assert_eq!(refs["@e1"]["role"], "link");
    assert_eq!(refs["@e1"]["name"], "More information...");
}

/// S2: after S1, clicking the first ref navigates and the session's status
/// still resolves afterward.
#[tokio::test]
async fn s2_click_by_ref_navigates_to_a_new_page() {
    let backend = MockBackend::new(vec![
        ScriptedResponse::Page(example_page("Example Domain", "")),
        ScriptedResponse::Page(example_page("Example Domain", "- link \"More information...\"")),
        ScriptedResponse::Page(PageState {
            url: "https://www.iana.org/help/example-domains".to_string(),
            title: "Example Domains".to_string(),
            ..Default::default()
        }),
    ]);
    let (state, token) = state_with(backend);
    let app = router(state);

    let launch = post(&app, &token, json!({"op": "launch", "tier": 1, "url": "https://example.com"})).await;
    let session_id = launch["session_id"].as_str().unwrap().to_string();
    post(&app, &token, json!({"op": "snapshot", "session_id": session_id, "compact": true})).await;

    let click = post(
        &app,
        &token,
        json!({"op": "action", "session_id": session_id, "verb": "click", "params": {"ref": "@e1"}}),
    )
    .await;
    assert_eq!(click["success"], true);
    assert_eq!(click["data"]["url"], "https://www.iana.org/help/example-domains");
    assert_ne!(click["data"]["url"], "https://example.com");

    let status = post(&app, &token, json!({"op": "status", "session_id": session_id})).await;
    assert_eq!(status["success"], true);
}

/// S3: repeating the exact same click against an unchanging page escalates
/// a loop warning from WARNING (3rd repeat) to STUCK (5th) to CRITICAL (7th),
/// per `ActionLoopDetector::record`'s `threshold+2`/`threshold+4` bands with
/// the default `threshold` of 3.
#[tokio::test]
async fn s3_repeated_click_on_unchanging_page_escalates_loop_warning() {
    const REPEATS: usize = 7;
    let mut scripts = vec![
        ScriptedResponse::Page(example_page("Example Domain", "")),
        ScriptedResponse::Page(example_page("Example Domain", "- link \"More information...\"")),
    ];
    for _ in 0..REPEATS {
        scripts.push(ScriptedResponse::Page(example_page("Example Domain", "- link \"More information...\"")));
    }
    let (state, token) = state_with(MockBackend::new(scripts));
    let app = router(state);

    let launch = post(&app, &token, json!({"op": "launch", "tier": 1, "url": "https://example.com"})).await;
    let session_id = launch["session_id"].as_str().unwrap().to_string();
    post(&app, &token, json!({"op": "snapshot", "session_id": session_id, "compact": true})).await;

    let mut warnings = Vec::new();
    for _ in 0..REPEATS {
        let click = post(
            &app,
            &token,
            json!({"op": "action", "session_id": session_id, "verb": "click", "params": {"ref": "@e1"}}),
        )
        .await;
        assert_eq!(click["success"], true);
        warnings.push(click["warnings"].as_array().cloned().unwrap_or_default());
    }
    let joined = |i: usize| warnings[i].iter().map(|w| w.as_str().unwrap_or("")).collect::<Vec<_>>().join(" ");

    assert!(warnings[0].is_empty(), "first click should not warn yet");
    assert!(warnings[1].is_empty(), "second click should not warn yet");
    assert!(joined(2).contains("WARNING"), "third click (count=3) should warn, got: {}", joined(2));
    assert!(joined(4).contains("STUCK"), "fifth click (count=5) should escalate to stuck, got: {}", joined(4));
    assert!(joined(6).contains("CRITICAL"), "seventh click (count=7) should escalate to critical, got: {}", joined(6));
}

/// S4: two concurrent launches get distinct session ids, both visible in status.
#[tokio::test]
async fn s4_concurrent_launches_get_distinct_sessions() {
    let (state, token) = state_with(MockBackend::empty());
    let app = router(state);

    let (a, b) = tokio::join!(
        post(&app, &token, json!({"op": "launch", "tier": 1})),
        post(&app, &token, json!({"op": "launch", "tier": 1})),
    );
    assert_eq!(a["success"], true);
    assert_eq!(b["success"], true);
    let id_a = a["session_id"].as_str().unwrap();
    let id_b = b["session_id"].as_str().unwrap();
    assert_ne!(id_a, id_b);

    let status = post(&app, &token, json!({"op": "status"})).await;
    let ids: Vec<&str> = status["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["session_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&id_a));
    assert!(ids.contains(&id_b));
}

/// S5: a tight per-domain rate limit trips on the third action to the same
/// host. A rate-limited action surfaces as a 422 `ActionFailed` gateway
/// response, not a 200 with `success: false`.
#[tokio::test]
async fn s5_rate_limit_trips_on_third_action_to_same_domain() {
    let backend = MockBackend::new(vec![
        ScriptedResponse::Page(example_page("Example Domain", "")),
        ScriptedResponse::Page(example_page("Example Domain", "")),
    ]);
    let (mut state, token) = state_with(backend);
    let mut config = Config::default();
    config.rate_limit.sensitive_limits.clear();
    config.rate_limit.sensitive_limits.insert("example.com".to_string(), 2);
    config.rate_limit.sensitive_limits.insert("default".to_string(), 8);
    state.config = Arc::new(config);
    let app = router(state);

    let launch = post(&app, &token, json!({"op": "launch", "tier": 1, "url": "https://example.com"})).await;
    let session_id = launch["session_id"].as_str().unwrap().to_string();

    let c1 = post(
        &app,
        &token,
        json!({"op": "action", "session_id": session_id, "verb": "click", "params": {"selector": "#a"}}),
    )
    .await;
    assert_eq!(c1["success"], true);

    let c2 = post(
        &app,
        &token,
        json!({"op": "action", "session_id": session_id, "verb": "click", "params": {"selector": "#b"}}),
    )
    .await;
    assert_eq!(c2["success"], true);

    let (status, c3) = send(
        &app,
        &token,
        json!({"op": "action", "session_id": session_id, "verb": "click", "params": {"selector": "#c"}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(c3["success"], false);
    assert_eq!(c3["error_code"], "RATE_LIMITED");
    assert!(c3["error_message"].as_str().unwrap().contains("retry in"));
}

/// S6: a batch over 20 steps is rejected before any step runs.
#[tokio::test]
async fn s6_batch_over_twenty_steps_is_rejected() {
    let (state, token) = state_with(MockBackend::empty());
    let app = router(state);

    let launch = post(&app, &token, json!({"op": "launch", "tier": 1})).await;
    let session_id = launch["session_id"].as_str().unwrap().to_string();

    let steps: Vec<Value> = (0..21).map(|_| json!({"verb": "wait", "params": {"ms": 1}})).collect();
    let (status, body) = send(&app, &token, json!({"op": "actions", "session_id": session_id, "steps": steps})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error_message"].as_str().unwrap_or_default().contains("limited to 20"));
}

/// A request without a bearer token never reaches the dispatcher.
#[tokio::test]
async fn unauthenticated_request_is_rejected_before_dispatch() {
    let (state, _token) = state_with(MockBackend::empty());
    let app = router(state);

    let mut request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"op": "ping"})).unwrap()))
        .unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo("127.0.0.1:9999".parse::<SocketAddr>().unwrap()));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
