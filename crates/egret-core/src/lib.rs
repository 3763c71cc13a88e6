// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod backend;
mod detector;
mod dispatcher;
mod envelope;
mod error;
mod fingerprint;
mod fsm;
mod gc;
mod loop_detector;
mod profile;
mod rate_limiter;
mod session;
mod snapshot;
mod tier;

pub use backend::{
    BrowserBackend, BrowserHandle, CursorInteractiveElement, MockBackend, PageState,
    ScriptedResponse,
};
pub use detector::{detect_protection, is_blocked, Protection};
pub use dispatcher::{dispatch, ActionRequest, ActionResult};
pub use envelope::Envelope;
pub use error::{classify_error, BrowserError, ErrorCode, Recoverability};
pub use fingerprint::{compute_action_hash, PageFingerprint};
pub use fsm::{AgentFsm, AgentStateName};
pub use gc::SessionReaper;
pub use loop_detector::{ActionLoopDetector, LoopVerdict};
pub use profile::{safe_profile_path, validate_profile_name, Credential, Profile, ProfileStore};
pub use rate_limiter::RateLimiter;
pub use session::{BrowsingMode, Session, SessionRegistry};
pub use snapshot::{take_snapshot, RefEntry, SnapshotResult};
pub use tier::{Tier, TierProfile};
