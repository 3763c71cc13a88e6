// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Error taxonomy for browser actions — the catalog and pattern map are a
//! direct port of `errors.py`'s `_CATALOG`/`_PATTERN_MAP`.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::fsm::AgentStateName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recoverability {
    Recoverable,
    Escalatable,
    NonRecoverable,
}

/// Stable, catalog-backed error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TimeoutAction,
    TimeoutNavigation,
    ElementNotVisible,
    ElementDetached,
    ElementNotFound,
    FrameDetached,
    ContextDestroyed,
    TargetClosed,
    NetworkError,
    ChallengeDetected,
    CaptchaDetected,
    RateLimited,
    BrowserCrashed,
    InvalidTransition,
    DeadlineExceeded,
    StepBudgetExceeded,
    /// Request referenced a session/handle that doesn't exist or hasn't
    /// launched a browser yet. Not part of the original catalog — an
    /// ambient dispatch-layer addition.
    SessionNotFound,
    /// Malformed or missing verb parameters. Ambient dispatch-layer addition.
    InvalidParams,
    /// Local I/O or serialization failure unrelated to the browser itself.
    /// Ambient addition for the profile store and gateway layers.
    InternalError,
    /// A `ref` argument did not resolve against the session's stored ref
    /// map — either it was never in the map or a newer snapshot replaced it.
    RefNotFound,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TimeoutAction => "TIMEOUT_ACTION",
            ErrorCode::TimeoutNavigation => "TIMEOUT_NAVIGATION",
            ErrorCode::ElementNotVisible => "ELEMENT_NOT_VISIBLE",
            ErrorCode::ElementDetached => "ELEMENT_DETACHED",
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::FrameDetached => "FRAME_DETACHED",
            ErrorCode::ContextDestroyed => "CONTEXT_DESTROYED",
            ErrorCode::TargetClosed => "TARGET_CLOSED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ChallengeDetected => "CHALLENGE_DETECTED",
            ErrorCode::CaptchaDetected => "CAPTCHA_DETECTED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::BrowserCrashed => "BROWSER_CRASHED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::StepBudgetExceeded => "STEP_BUDGET_EXCEEDED",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::RefNotFound => "REF_NOT_FOUND",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

struct CatalogEntry {
    recoverability: Recoverability,
    agent_action: &'static str,
    user_action: &'static str,
}

static CATALOG: LazyLock<HashMap<ErrorCode, CatalogEntry>> = LazyLock::new(|| {
    use ErrorCode::*;
    use Recoverability::*;
    HashMap::from([
        (
            TimeoutAction,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Take a new snapshot to verify element exists, then retry.",
                user_action: "Page may be slow — the agent will retry.",
            },
        ),
        (
            TimeoutNavigation,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Check URL, wait for load, retry navigation.",
                user_action: "Site may be slow to respond.",
            },
        ),
        (
            ElementNotVisible,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Scroll element into view or dismiss overlays, then retry.",
                user_action: "",
            },
        ),
        (
            ElementDetached,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Take a new snapshot — page content changed.",
                user_action: "",
            },
        ),
        (
            ElementNotFound,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Take a new snapshot. Ref may be stale.",
                user_action: "",
            },
        ),
        (
            FrameDetached,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Take a new snapshot — iframe navigated away.",
                user_action: "",
            },
        ),
        (
            ContextDestroyed,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Page navigated during action. Snapshot the new page.",
                user_action: "",
            },
        ),
        (
            TargetClosed,
            CatalogEntry {
                recoverability: Escalatable,
                agent_action: "Tab/context closed. Relaunch session or switch tab.",
                user_action: "Browser tab was closed unexpectedly.",
            },
        ),
        (
            NetworkError,
            CatalogEntry {
                recoverability: Escalatable,
                agent_action: "Check URL. If blocked, escalate stealth tier.",
                user_action: "Site may be blocking access.",
            },
        ),
        (
            ChallengeDetected,
            CatalogEntry {
                recoverability: Escalatable,
                agent_action: "Escalate to higher stealth tier.",
                user_action: "Site has anti-bot protection — escalating stealth.",
            },
        ),
        (
            CaptchaDetected,
            CatalogEntry {
                recoverability: Escalatable,
                agent_action: "CAPTCHA detected. Escalate tier or wait and retry.",
                user_action: "Site is showing a CAPTCHA challenge.",
            },
        ),
        (
            RateLimited,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Wait before retrying. Reduce action frequency on this domain.",
                user_action: "Pausing to avoid rate limiting on this site.",
            },
        ),
        (
            BrowserCrashed,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Relaunch browser session from scratch.",
                user_action: "Browser process crashed. Restarting.",
            },
        ),
        (
            InvalidTransition,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Internal error — invalid state transition.",
                user_action: "",
            },
        ),
        (
            DeadlineExceeded,
            CatalogEntry {
                recoverability: Escalatable,
                agent_action: "State timed out. Evaluate and recover.",
                user_action: "",
            },
        ),
        (
            StepBudgetExceeded,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Maximum steps reached. Report progress and stop.",
                user_action: "Task hit step limit. Review partial results.",
            },
        ),
        (
            SessionNotFound,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Launch a browser for this session before acting on it.",
                user_action: "",
            },
        ),
        (
            InvalidParams,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Fix the request parameters and retry.",
                user_action: "",
            },
        ),
        (
            InternalError,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Retry; if it persists, report the failure.",
                user_action: "",
            },
        ),
        (
            RefNotFound,
            CatalogEntry {
                recoverability: Recoverable,
                agent_action: "Take a new snapshot and use a ref from it.",
                user_action: "",
            },
        ),
        (
            Unknown,
            CatalogEntry {
                recoverability: NonRecoverable,
                agent_action: "Take a snapshot to assess state.",
                user_action: "",
            },
        ),
    ])
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverability: Recoverability,
    pub agent_action: String,
    pub user_action: String,
    pub at_state: Option<AgentStateName>,
    pub timestamp_ms: i64,
}

impl BrowserError {
    pub fn is_recoverable(&self) -> bool {
        self.recoverability == Recoverability::Recoverable
    }

    pub fn is_escalatable(&self) -> bool {
        self.recoverability == Recoverability::Escalatable
    }

    pub fn to_agent_message(&self) -> String {
        if self.agent_action.is_empty() {
            self.message.clone()
        } else {
            format!("{} Suggested: {}", self.message, self.agent_action)
        }
    }
}

pub fn create_error(code: ErrorCode, message: impl Into<String>, at_state: Option<AgentStateName>) -> BrowserError {
    let defaults = CATALOG.get(&code).unwrap_or_else(|| CATALOG.get(&ErrorCode::Unknown).unwrap());
    BrowserError {
        code,
        message: message.into(),
        recoverability: defaults.recoverability,
        agent_action: defaults.agent_action.to_string(),
        user_action: defaults.user_action.to_string(),
        at_state,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    }
}

fn extract_timeout(msg: &str) -> &str {
    static RE: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"(\d+)ms").unwrap());
    RE.captures(msg)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("30000")
}

fn extract_net_error(msg: &str) -> &str {
    static RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"net::(ERR_\w+)").unwrap());
    RE.captures(msg)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("unknown network error")
}

/// Ordered substring → code/message-builder table, checked top to bottom.
/// First match wins — matches `errors.py::_PATTERN_MAP`'s ordering exactly.
fn pattern_map(msg: &str) -> Option<(ErrorCode, String)> {
    let lower = msg.to_lowercase();
    let table: &[(&str, ErrorCode)] = &[
        ("timeouterror", ErrorCode::TimeoutAction),
        ("not visible", ErrorCode::ElementNotVisible),
        ("detached", ErrorCode::ElementDetached),
        ("target closed", ErrorCode::TargetClosed),
        ("net::err_", ErrorCode::NetworkError),
        ("frame was detached", ErrorCode::FrameDetached),
        ("execution context was destroyed", ErrorCode::ContextDestroyed),
        ("429", ErrorCode::RateLimited),
        ("captcha", ErrorCode::CaptchaDetected),
    ];
    for (pattern, code) in table {
        if lower.contains(pattern) {
            let text = match code {
                ErrorCode::TimeoutAction => {
                    format!("Action timed out after {}ms.", extract_timeout(msg))
                }
                ErrorCode::ElementNotVisible => "Element is present but not visible (hidden by CSS, behind overlay, or off-screen).".to_string(),
                ErrorCode::ElementDetached => "Element was removed from the DOM (page content changed).".to_string(),
                ErrorCode::TargetClosed => "Browser tab or context was closed.".to_string(),
                ErrorCode::NetworkError => format!("Network error: {}.", extract_net_error(msg)),
                ErrorCode::FrameDetached => "The iframe navigated away during the action.".to_string(),
                ErrorCode::ContextDestroyed => "Page navigated during the action.".to_string(),
                ErrorCode::RateLimited => "Site returned HTTP 429 (Too Many Requests). Slow down.".to_string(),
                ErrorCode::CaptchaDetected => "CAPTCHA detected on the page.".to_string(),
                _ => unreachable!(),
            };
            return Some((*code, text));
        }
    }
    None
}

/// Classify a raw backend error message into a structured [`BrowserError`].
pub fn classify_error(raw_message: &str, at_state: Option<AgentStateName>) -> BrowserError {
    if let Some((code, text)) = pattern_map(raw_message) {
        return create_error(code, text, at_state);
    }
    create_error(
        ErrorCode::Unknown,
        format!("Browser error: {}", raw_message),
        at_state,
    )
}

impl std::fmt::Display for BrowserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct ClassifiedError(pub BrowserError);
