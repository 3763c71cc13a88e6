// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Action dispatch. One verb table built once at construction, per
//! SPEC_FULL.md §9's design note — never a cascade of `if verb ==`. Each
//! verb handler receives the locked [`Session`] and the shared
//! [`BrowserBackend`] and returns a JSON result payload or a
//! [`BrowserError`].
//!
//! `dispatch()` is the unified 10-step algorithm from SPEC_FULL.md §4.4:
//! rate-limit check, FSM transition to ACTING, verb lookup, backend call,
//! fingerprint/loop-detector update, block detection, FSM transition back
//! to OBSERVING, envelope assembly.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::backend::BrowserBackend;
use crate::detector::is_blocked;
use crate::envelope::Envelope;
use crate::error::{create_error, BrowserError, ErrorCode};
use crate::fingerprint::PageFingerprint;
use crate::rate_limiter::is_exempt;
use crate::session::Session;
use crate::snapshot::take_snapshot;

/// One requested action: verb + verb-specific JSON params.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub verb: String,
    pub params: Value,
}

pub type ActionResult = Result<Envelope, BrowserError>;

type HandlerFut<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, BrowserError>> + Send + 'a>>;
type ActionHandler = for<'a> fn(&'a Arc<dyn BrowserBackend>, &'a mut Session, &'a Value) -> HandlerFut<'a>;

pub const VERBS: &[&str] = &[
    "navigate", "click", "fill", "type", "scroll", "snapshot", "screenshot", "wait", "evaluate",
    "done", "press", "select", "go_back", "cookies_get", "cookies_set", "tab_new", "tab_switch",
    "tab_close", "webmcp_discover", "webmcp_call", "search_page", "find_elements", "extract",
    "upload_file", "get_downloads", "click_coordinate",
];

fn verb_table() -> HashMap<&'static str, ActionHandler> {
    let mut m: HashMap<&'static str, ActionHandler> = HashMap::new();
    m.insert("navigate", |b, s, p| Box::pin(h_navigate(b, s, p)));
    m.insert("click", |b, s, p| Box::pin(h_click(b, s, p)));
    m.insert("fill", |b, s, p| Box::pin(h_fill(b, s, p)));
    m.insert("type", |b, s, p| Box::pin(h_type(b, s, p)));
    m.insert("scroll", |b, s, p| Box::pin(h_scroll(b, s, p)));
    m.insert("snapshot", |b, s, p| Box::pin(h_snapshot(b, s, p)));
    m.insert("screenshot", |b, s, p| Box::pin(h_screenshot(b, s, p)));
    m.insert("wait", |b, s, p| Box::pin(h_wait(b, s, p)));
    m.insert("evaluate", |b, s, p| Box::pin(h_evaluate(b, s, p)));
    m.insert("done", |b, s, p| Box::pin(h_done(b, s, p)));
    m.insert("press", |b, s, p| Box::pin(h_press(b, s, p)));
    m.insert("select", |b, s, p| Box::pin(h_select(b, s, p)));
    m.insert("go_back", |b, s, p| Box::pin(h_go_back(b, s, p)));
    m.insert("cookies_get", |b, s, p| Box::pin(h_cookies_get(b, s, p)));
    m.insert("cookies_set", |b, s, p| Box::pin(h_cookies_set(b, s, p)));
    m.insert("tab_new", |b, s, p| Box::pin(h_tab_new(b, s, p)));
    m.insert("tab_switch", |b, s, p| Box::pin(h_tab_switch(b, s, p)));
    m.insert("tab_close", |b, s, p| Box::pin(h_tab_close(b, s, p)));
    m.insert("webmcp_discover", |b, s, p| Box::pin(h_webmcp_discover(b, s, p)));
    m.insert("webmcp_call", |b, s, p| Box::pin(h_webmcp_call(b, s, p)));
    m.insert("search_page", |b, s, p| Box::pin(h_search_page(b, s, p)));
    m.insert("find_elements", |b, s, p| Box::pin(h_find_elements(b, s, p)));
    m.insert("extract", |b, s, p| Box::pin(h_extract(b, s, p)));
    m.insert("upload_file", |b, s, p| Box::pin(h_upload_file(b, s, p)));
    m.insert("get_downloads", |b, s, p| Box::pin(h_get_downloads(b, s, p)));
    m.insert("click_coordinate", |b, s, p| Box::pin(h_click_coordinate(b, s, p)));
    m
}

fn handle_of(handle: Option<crate::backend::BrowserHandle>) -> Result<crate::backend::BrowserHandle, BrowserError> {
    handle.ok_or_else(|| create_error(ErrorCode::SessionNotFound, "no browser launched for this session", None))
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, BrowserError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| create_error(ErrorCode::InvalidParams, &format!("missing required param '{key}'"), None))
}

/// Accepts `@eN`, `ref=eN`, or bare `eN` and normalizes to the `@eN` key the
/// ref map is stored under.
fn normalize_ref(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix("ref=").unwrap_or(raw);
    match raw.strip_prefix('@') {
        Some(rest) => format!("@{rest}"),
        None => format!("@{raw}"),
    }
}

/// If `params` carries a `ref` field, resolves it against the session's
/// current ref map and injects the resolved locator as `selector`. Leaves
/// `params` untouched when there is no `ref` field — most verbs don't
/// take one. Missing ref yields `REF_NOT_FOUND` so the caller re-snapshots.
fn resolve_ref(session: &Session, params: &Value) -> Result<Value, BrowserError> {
    let Some(raw) = params.get("ref").and_then(Value::as_str) else {
        return Ok(params.clone());
    };
    let key = normalize_ref(raw);
    let entry = session.ref_map.get(&key).ok_or_else(|| {
        create_error(
            ErrorCode::RefNotFound,
            &format!("ref {key} not found in the current ref map — take a new snapshot"),
            None,
        )
    })?;
    let mut resolved = params.clone();
    resolved["selector"] = json!(entry.selector);
    Ok(resolved)
}

fn page_value(p: &crate::backend::PageState) -> Value {
    json!({ "url": p.url, "title": p.title, "tab_count": p.tab_count, "tab_index": p.tab_index })
}

async fn h_navigate(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let url = str_param(params, "url")?;
    let handle = match session.handle {
        Some(h) => h,
        None => {
            let h = backend.launch(session.tier.as_u8()).await?;
            session.handle = Some(h);
            h
        }
    };
    let page = backend.navigate(handle, url).await?;
    session.last_url = Some(page.url.clone());
    Ok(page_value(&page))
}

async fn h_click(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let selector = str_param(params, "selector")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.click(handle, selector).await?))
}

async fn h_fill(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let selector = str_param(params, "selector")?;
    let value = str_param(params, "value")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.fill(handle, selector, value).await?))
}

async fn h_type(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let selector = str_param(params, "selector")?;
    let text = str_param(params, "text")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.type_text(handle, selector, text).await?))
}

async fn h_scroll(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let dx = params.get("dx").and_then(Value::as_i64).unwrap_or(0);
    let dy = params.get("dy").and_then(Value::as_i64).unwrap_or(0);
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.scroll(handle, dx, dy).await?))
}

async fn h_snapshot(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    let page = backend.page_state(handle).await?;
    let compact = params.get("compact").and_then(Value::as_bool).unwrap_or(false);
    let max_depth = params.get("max_depth").and_then(Value::as_u64).unwrap_or(10) as usize;
    let mut result = take_snapshot(
        &page.raw_aria,
        &page.url,
        &page.title,
        page.tab_count,
        page.tab_index,
        compact,
        max_depth,
        &page.cursor_interactive,
    );
    if result.success {
        if let Some(previous) = &session.last_snapshot {
            crate::snapshot::mark_diff(&mut result, previous);
        }
        session.ref_map = result.refs.clone();
        session.last_snapshot = Some(result.clone());
    }
    Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
}

async fn h_screenshot(backend: &Arc<dyn BrowserBackend>, session: &mut Session, _params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    let bytes = backend.screenshot(handle).await?;
    Ok(json!({ "bytes_b64": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes) }))
}

async fn h_wait(_backend: &Arc<dyn BrowserBackend>, _session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(1000).min(60_000);
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    Ok(json!({ "waited_ms": ms }))
}

async fn h_evaluate(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let script = str_param(params, "script")?;
    let handle = handle_of(session.handle)?;
    backend.evaluate(handle, script).await
}

async fn h_done(_backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    session.fsm.to_tearing_down();
    Ok(json!({ "result": params.get("result").cloned().unwrap_or(Value::Null) }))
}

async fn h_press(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let key = str_param(params, "key")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.press(handle, key).await?))
}

async fn h_select(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let selector = str_param(params, "selector")?;
    let value = str_param(params, "value")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.select(handle, selector, value).await?))
}

async fn h_go_back(backend: &Arc<dyn BrowserBackend>, session: &mut Session, _params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.go_back(handle).await?))
}

async fn h_cookies_get(backend: &Arc<dyn BrowserBackend>, session: &mut Session, _params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    backend.cookies_get(handle).await
}

async fn h_cookies_set(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let cookies = params.get("cookies").cloned().unwrap_or(Value::Null);
    let handle = handle_of(session.handle)?;
    backend.cookies_set(handle, &cookies).await?;
    Ok(json!({ "ok": true }))
}

async fn h_tab_new(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let url = params.get("url").and_then(Value::as_str);
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.tab_new(handle, url).await?))
}

async fn h_tab_switch(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let index = params.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.tab_switch(handle, index).await?))
}

async fn h_tab_close(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let index = params.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.tab_close(handle, index).await?))
}

async fn h_webmcp_discover(backend: &Arc<dyn BrowserBackend>, session: &mut Session, _params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    backend.webmcp_discover(handle).await
}

async fn h_webmcp_call(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let tool = str_param(params, "tool")?;
    let args = params.get("args").cloned().unwrap_or(json!({}));
    let handle = handle_of(session.handle)?;
    backend.webmcp_call(handle, tool, &args).await
}

async fn h_search_page(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let query = str_param(params, "query")?;
    let handle = handle_of(session.handle)?;
    backend.search_page(handle, query).await
}

async fn h_find_elements(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let query = str_param(params, "query")?;
    let handle = handle_of(session.handle)?;
    backend.find_elements(handle, query).await
}

async fn h_extract(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let script = params.get("script").and_then(Value::as_str).unwrap_or("document.body.innerText");
    let handle = handle_of(session.handle)?;
    backend.evaluate(handle, script).await
}

async fn h_upload_file(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let selector = str_param(params, "selector")?;
    let path = str_param(params, "path")?;
    let handle = handle_of(session.handle)?;
    Ok(page_value(&backend.upload_file(handle, selector, path).await?))
}

async fn h_get_downloads(backend: &Arc<dyn BrowserBackend>, session: &mut Session, _params: &Value) -> Result<Value, BrowserError> {
    let handle = handle_of(session.handle)?;
    backend.get_downloads(handle).await
}

async fn h_click_coordinate(backend: &Arc<dyn BrowserBackend>, session: &mut Session, params: &Value) -> Result<Value, BrowserError> {
    let x = params.get("x").and_then(Value::as_i64).unwrap_or(0);
    let y = params.get("y").and_then(Value::as_i64).unwrap_or(0);
    let selector = format!("__coordinate__:{x},{y}");
    let handle = handle_of(session.handle)?;
    let page = backend.click(handle, &selector).await?;
    let mut value = page_value(&page);
    value["clicked_at"] = json!([x, y]);
    Ok(value)
}

fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Runs the unified per-action algorithm: rate limit, FSM transition,
/// dispatch, fingerprint/loop update, envelope assembly.
pub async fn dispatch(
    backend: &Arc<dyn BrowserBackend>,
    session_lock: &Mutex<Session>,
    request: &ActionRequest,
) -> ActionResult {
    let table = verb_table();
    let handler = *table
        .get(request.verb.as_str())
        .ok_or_else(|| create_error(ErrorCode::InvalidParams, &format!("unknown verb '{}'", request.verb), None))?;

    let mut session = session_lock.lock().await;
    session.touch();

    if !is_exempt(&request.verb) {
        if let Some(url) = session.last_url.clone() {
            let domain = extract_domain(&url);
            if !session.rate_limiter.check(&domain) {
                let wait = session.rate_limiter.wait_time(&domain);
                return Err(create_error(
                    ErrorCode::RateLimited,
                    &format!("rate limit exceeded for {domain}, retry in {wait:.1}s"),
                    None,
                ));
            }
            session.rate_limiter.record(&domain);
        }
    }

    session.fsm.ready_for_action()?;

    let outcome = match resolve_ref(&session, &request.params) {
        Ok(resolved_params) => handler(backend, &mut session, &resolved_params).await,
        Err(err) => Err(err),
    };

    let result = match outcome {
        Ok(value) => {
            let loop_params = request.params.clone();
            let ref_fp_map: std::collections::BTreeMap<String, (String, Option<String>, Option<usize>)> = session
                .ref_map
                .iter()
                .map(|(id, entry)| (id.clone(), (entry.role.clone(), entry.name.clone(), entry.nth)))
                .collect();
            let fingerprint = value.get("url").and_then(Value::as_str).map(|url| {
                PageFingerprint::from_snapshot(
                    url,
                    &ref_fp_map,
                    value.get("tab_count").and_then(Value::as_u64).unwrap_or(1) as usize,
                )
            });
            let verdict = session.loop_detector.record(&request.verb, &loop_params, fingerprint.clone());
            session.last_fingerprint = fingerprint;

            session.fsm.finish_action()?;

            let mut envelope = Envelope::success(&request.verb, value);
            if let Some(v) = verdict {
                envelope = envelope.with_warning(v.message().to_string());
            }
            if let (Some(title), Some(url)) = (
                envelope.data.get("title").and_then(Value::as_str).map(str::to_string),
                envelope.data.get("url").and_then(Value::as_str).map(str::to_string),
            ) {
                if let Some(vendor) = is_blocked(&title, &url, "") {
                    envelope = envelope.with_warning(format!("possible block/challenge detected ({vendor})"));
                }
            }
            Ok(envelope)
        }
        Err(err) => {
            session.fsm.to_error();
            Err(err)
        }
    };

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, ScriptedResponse};
    use crate::session::{BrowsingMode, Session};
    use crate::tier::Tier;
    use std::collections::HashMap;

    fn default_limits() -> HashMap<String, u32> {
        let mut m = HashMap::new();
        m.insert("default".to_string(), 100);
        m
    }

    #[tokio::test]
    async fn navigate_then_click_round_trip() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::new(vec![
            ScriptedResponse::Page(crate::backend::PageState { url: "https://a.test".to_string(), ..Default::default() }),
            ScriptedResponse::Page(crate::backend::PageState { url: "https://a.test".to_string(), ..Default::default() }),
        ]));
        let session = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));

        let nav = dispatch(&backend, &session, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();
        assert!(nav.success);

        let click = dispatch(&backend, &session, &ActionRequest { verb: "click".to_string(), params: json!({"selector": "#go"}) }).await.unwrap();
        assert!(click.success);
    }

    #[tokio::test]
    async fn unknown_verb_errors() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::empty());
        let session = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));
        let err = dispatch(&backend, &session, &ActionRequest { verb: "teleport".to_string(), params: json!({}) }).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn click_without_launch_errors() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::empty());
        let session = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));
        let err = dispatch(&backend, &session, &ActionRequest { verb: "click".to_string(), params: json!({"selector": "#go"}) }).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn rate_limit_blocks_excess_actions() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::empty());
        let mut limits = HashMap::new();
        limits.insert("default".to_string(), 1);
        let session = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, limits));

        dispatch(&backend, &session, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();
        dispatch(&backend, &session, &ActionRequest { verb: "click".to_string(), params: json!({"selector": "#a"}) }).await.unwrap();
        let err = dispatch(&backend, &session, &ActionRequest { verb: "click".to_string(), params: json!({"selector": "#b"}) }).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn snapshot_populates_session_ref_map() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::new(vec![
            ScriptedResponse::Page(crate::backend::PageState { url: "https://a.test".to_string(), ..Default::default() }),
            ScriptedResponse::Page(crate::backend::PageState {
                url: "https://a.test".to_string(),
                title: "A".to_string(),
                tab_count: 1,
                tab_index: 1,
                raw_aria: "- link \"More information...\"".to_string(),
                cursor_interactive: Vec::new(),
            }),
        ]));
        let session_lock = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));

        dispatch(&backend, &session_lock, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();
        let snap = dispatch(&backend, &session_lock, &ActionRequest { verb: "snapshot".to_string(), params: json!({"compact": true}) }).await.unwrap();
        assert!(snap.success);

        let session = session_lock.lock().await;
        assert!(session.ref_map.contains_key("@e1"));
        assert_eq!(session.ref_map["@e1"].role, "link");
    }

    #[tokio::test]
    async fn click_by_ref_resolves_against_session_ref_map() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::new(vec![
            ScriptedResponse::Page(crate::backend::PageState { url: "https://a.test".to_string(), ..Default::default() }),
            ScriptedResponse::Page(crate::backend::PageState {
                url: "https://a.test".to_string(),
                raw_aria: "- link \"More information...\"".to_string(),
                tab_count: 1,
                tab_index: 1,
                ..Default::default()
            }),
            ScriptedResponse::Page(crate::backend::PageState { url: "https://a.test/more".to_string(), ..Default::default() }),
        ]));
        let session_lock = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));

        dispatch(&backend, &session_lock, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();
        dispatch(&backend, &session_lock, &ActionRequest { verb: "snapshot".to_string(), params: json!({"compact": true}) }).await.unwrap();

        let click = dispatch(&backend, &session_lock, &ActionRequest { verb: "click".to_string(), params: json!({"ref": "@e1"}) }).await.unwrap();
        assert!(click.success);
        assert_eq!(click.data["url"], "https://a.test/more");
    }

    #[tokio::test]
    async fn click_by_unknown_ref_reports_ref_not_found() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::empty());
        let session_lock = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, default_limits()));
        dispatch(&backend, &session_lock, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();

        let err = dispatch(&backend, &session_lock, &ActionRequest { verb: "click".to_string(), params: json!({"ref": "e99"}) }).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RefNotFound);
    }

    #[tokio::test]
    async fn wait_is_exempt_from_rate_limit() {
        let backend: Arc<dyn BrowserBackend> = Arc::new(MockBackend::empty());
        let mut limits = HashMap::new();
        limits.insert("default".to_string(), 1);
        let session = Mutex::new(Session::new("abc123".to_string(), Tier::Basic, BrowsingMode::Extract, limits));

        dispatch(&backend, &session, &ActionRequest { verb: "navigate".to_string(), params: json!({"url": "https://a.test"}) }).await.unwrap();
        for _ in 0..5 {
            dispatch(&backend, &session, &ActionRequest { verb: "wait".to_string(), params: json!({"ms": 1}) }).await.unwrap();
        }
    }
}
