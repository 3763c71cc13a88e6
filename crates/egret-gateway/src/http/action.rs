// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The single request endpoint: `POST /`. Every request carries an `op`
//! field that selects one of the ten operations named in SPEC_FULL.md §6
//! (`launch`, `action`, `actions`, `snapshot`, `screenshot`, `close`,
//! `save`, `status`, `profile`, `ping`) — there is no per-operation route.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use egret_core::{dispatch, ActionRequest, BrowsingMode, Tier};

use crate::error::GatewayError;
use crate::gateway::AppState;

const MAX_BATCH_STEPS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct StepSpec {
    pub verb: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpRequest {
    Launch {
        #[serde(default)]
        tier: Option<u8>,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
    Action {
        session_id: String,
        verb: String,
        #[serde(default)]
        params: Value,
    },
    Actions {
        session_id: String,
        steps: Vec<StepSpec>,
        #[serde(default = "default_true")]
        stop_on_error: bool,
    },
    Snapshot {
        session_id: String,
        #[serde(default)]
        compact: bool,
        #[serde(default)]
        max_depth: Option<usize>,
    },
    Screenshot {
        session_id: String,
        #[serde(default)]
        full_page: bool,
    },
    Close {
        session_id: String,
    },
    Save {
        session_id: String,
        profile: String,
    },
    Status {
        #[serde(default)]
        session_id: Option<String>,
    },
    Profile {
        action: String,
        name: String,
        #[serde(default)]
        domain: Option<String>,
        #[serde(default)]
        tier: Option<u8>,
    },
    Ping {},
}

fn default_true() -> bool {
    true
}

fn parse_mode(raw: Option<&str>) -> BrowsingMode {
    match raw {
        Some("sensitive") => BrowsingMode::Sensitive,
        _ => BrowsingMode::Extract,
    }
}

#[derive(Debug, Serialize)]
struct SessionStatus {
    session_id: String,
    tier: u8,
    idle_secs: u64,
}

pub async fn handle_action(
    State(state): State<AppState>,
    Json(request): Json<OpRequest>,
) -> Result<Json<Value>, GatewayError> {
    match request {
        OpRequest::Launch { tier, mode, url } => {
            if state.registry.len() >= state.config.session.max_sessions {
                return Err(GatewayError::TooManySessions(state.config.session.max_sessions));
            }
            let tier = tier.and_then(Tier::from_u8).unwrap_or_default();
            let mode = parse_mode(mode.as_deref());
            let (session_id, session) =
                state.registry.create(tier, mode, state.config.rate_limit.sensitive_limits.clone());

            let mut data = json!({ "success": true, "session_id": session_id });
            if let Some(url) = url {
                let request = ActionRequest { verb: "navigate".to_string(), params: json!({ "url": url }) };
                let envelope = dispatch(&state.backend, &session, &request).await?;
                data["page"] = serde_json::to_value(&envelope).unwrap_or(Value::Null);
            }
            Ok(Json(data))
        }

        OpRequest::Action { session_id, verb, params } => {
            let session = session_or_404(&state, &session_id)?;
            let request = ActionRequest { verb, params };
            let envelope = dispatch(&state.backend, &session, &request).await?;
            Ok(Json(with_session_id(&session_id, &envelope)))
        }

        OpRequest::Actions { session_id, steps, stop_on_error } => {
            if steps.len() > MAX_BATCH_STEPS {
                return Err(GatewayError::BadRequest(format!(
                    "batch is limited to {MAX_BATCH_STEPS} steps, got {}",
                    steps.len()
                )));
            }
            let session = session_or_404(&state, &session_id)?;
            let mut results = Vec::with_capacity(steps.len());
            let mut stopped_at = None;
            for (i, step) in steps.into_iter().enumerate() {
                let request = ActionRequest { verb: step.verb, params: step.params };
                match dispatch(&state.backend, &session, &request).await {
                    Ok(envelope) => results.push(serde_json::to_value(&envelope).unwrap_or(Value::Null)),
                    Err(err) => {
                        results.push(json!({
                            "success": false,
                            "error_code": err.code.as_str(),
                            "error_message": err.message,
                        }));
                        if stop_on_error {
                            stopped_at = Some(i);
                            break;
                        }
                    }
                }
            }
            let mut body = json!({ "success": stopped_at.is_none(), "session_id": session_id, "results": results });
            if let Some(i) = stopped_at {
                body["stopped_at"] = json!(i);
            }
            Ok(Json(body))
        }

        OpRequest::Snapshot { session_id, compact, max_depth } => {
            let session = session_or_404(&state, &session_id)?;
            let mut params = json!({ "compact": compact });
            if let Some(d) = max_depth {
                params["max_depth"] = json!(d);
            }
            let request = ActionRequest { verb: "snapshot".to_string(), params };
            let envelope = dispatch(&state.backend, &session, &request).await?;
            Ok(Json(with_session_id(&session_id, &envelope)))
        }

        OpRequest::Screenshot { session_id, full_page } => {
            let session = session_or_404(&state, &session_id)?;
            let request = ActionRequest { verb: "screenshot".to_string(), params: json!({ "full_page": full_page }) };
            let envelope = dispatch(&state.backend, &session, &request).await?;
            Ok(Json(with_session_id(&session_id, &envelope)))
        }

        OpRequest::Close { session_id } => {
            let removed = state.registry.remove(&session_id);
            let still_present = state.registry.get(&session_id).is_some();
            Ok(Json(json!({
                "success": removed.is_some() && !still_present,
                "session_id": session_id,
                "closing": false,
            })))
        }

        OpRequest::Save { session_id, profile } => {
            let session = session_or_404(&state, &session_id)?;
            let cookies = {
                let locked = session.lock().await;
                let handle = locked.handle.ok_or_else(|| {
                    GatewayError::BadRequest("session has no launched browser to save".to_string())
                })?;
                state.backend.cookies_get(handle).await?
            };
            state.profiles.save_cookies(&profile, &cookies)?;
            Ok(Json(json!({ "success": true, "session_id": session_id, "profile": profile })))
        }

        OpRequest::Status { session_id } => match session_id {
            Some(id) => {
                let session = session_or_404(&state, &id)?;
                let locked = session.lock().await;
                Ok(Json(json!({
                    "success": true,
                    "session_id": id,
                    "tier": locked.tier.as_u8(),
                    "idle_secs": locked.idle_for().as_secs(),
                    "state": locked.fsm.state_name().as_str(),
                })))
            }
            None => {
                let mut sessions = Vec::new();
                for id in state.registry.ids() {
                    if let Some(session) = state.registry.get(&id) {
                        let locked = session.lock().await;
                        sessions.push(SessionStatus {
                            session_id: id,
                            tier: locked.tier.as_u8(),
                            idle_secs: locked.idle_for().as_secs(),
                        });
                    }
                }
                Ok(Json(json!({ "success": true, "sessions": sessions })))
            }
        },

        OpRequest::Profile { action, name, domain, tier } => {
            let result = match action.as_str() {
                "create" => serde_json::to_value(state.profiles.create(
                    &name,
                    domain.as_deref().unwrap_or(""),
                    tier.unwrap_or(1),
                )?),
                "load" => serde_json::to_value(state.profiles.load(&name)?),
                "list" => serde_json::to_value(state.profiles.list()?),
                "delete" => {
                    state.profiles.delete(&name)?;
                    Ok(Value::Null)
                }
                other => return Err(GatewayError::BadRequest(format!("unknown profile action '{other}'"))),
            };
            Ok(Json(json!({ "success": true, "result": result.unwrap_or(Value::Null) })))
        }

        OpRequest::Ping {} => Ok(Json(json!({ "success": true, "pong": true }))),
    }
}

fn session_or_404(
    state: &AppState,
    session_id: &str,
) -> Result<std::sync::Arc<tokio::sync::Mutex<egret_core::Session>>, GatewayError> {
    state.registry.get(session_id).ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
}

fn with_session_id(session_id: &str, envelope: &egret_core::Envelope) -> Value {
    let mut v = serde_json::to_value(envelope).unwrap_or(Value::Null);
    v["session_id"] = json!(session_id);
    v
}
