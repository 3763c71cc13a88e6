// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session records and the session registry. A session owns one browser
//! handle, its agent FSM, and its per-domain rate limiter / loop detector.
//! The registry indexes sessions by opaque id behind a [`dashmap::DashMap`];
//! each session's mutable state is additionally behind a `tokio::sync::Mutex`
//! so the dispatcher can hold it across `.await` points on browser I/O
//! without blocking unrelated sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::Mutex;

use crate::backend::BrowserHandle;
use crate::fingerprint::PageFingerprint;
use crate::fsm::AgentFsm;
use crate::loop_detector::ActionLoopDetector;
use crate::rate_limiter::RateLimiter;
use crate::snapshot::{RefEntry, SnapshotResult};
use crate::tier::Tier;

pub type SessionId = String;

/// How aggressively the session should behave. `Sensitive` sessions get
/// tighter per-domain rate limits and a higher humanize floor, per
/// `original_source/config.py`'s `SENSITIVE_RATE_LIMITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowsingMode {
    Extract,
    Sensitive,
}

impl Default for BrowsingMode {
    fn default() -> Self {
        BrowsingMode::Extract
    }
}

/// Mutable per-session state. Lives behind `Arc<Mutex<_>>` in the registry.
pub struct Session {
    pub id: SessionId,
    pub handle: Option<BrowserHandle>,
    pub tier: Tier,
    pub mode: BrowsingMode,
    pub fsm: AgentFsm,
    pub rate_limiter: RateLimiter,
    pub loop_detector: ActionLoopDetector,
    pub last_fingerprint: Option<PageFingerprint>,
    pub last_url: Option<String>,
    pub created_at: Instant,
    pub last_active: Instant,
    /// Most recent snapshot's ref map, overwritten atomically whenever a
    /// `snapshot` action completes. Authoritative for ref resolution —
    /// see `dispatcher::resolve_ref`.
    pub ref_map: BTreeMap<String, RefEntry>,
    /// Full previous snapshot, kept for diffing the next one.
    pub last_snapshot: Option<SnapshotResult>,
}

impl Session {
    pub fn new(id: SessionId, tier: Tier, mode: BrowsingMode, rate_limits: HashMap<String, u32>) -> Self {
        let now = Instant::now();
        Self {
            id,
            handle: None,
            tier,
            mode,
            fsm: AgentFsm::new(),
            rate_limiter: RateLimiter::new(rate_limits),
            loop_detector: ActionLoopDetector::default(),
            last_fingerprint: None,
            last_url: None,
            created_at: now,
            last_active: now,
            ref_map: BTreeMap::new(),
            last_snapshot: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

/// Generates an opaque 12-hex-character session id, per SPEC_FULL.md §3.
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Registry of live sessions, keyed by opaque id.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    inner: Arc<DashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, tier: Tier, mode: BrowsingMode, rate_limits: HashMap<String, u32>) -> (SessionId, Arc<Mutex<Session>>) {
        let id = generate_session_id();
        let session = Arc::new(Mutex::new(Session::new(id.clone(), tier, mode, rate_limits)));
        self.inner.insert(id.clone(), session.clone());
        (id, session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.inner.remove(id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove and return ids of sessions idle longer than `ttl`. Used by
    /// `gc::SessionReaper`.
    pub async fn sweep_idle(&self, ttl: Duration) -> Vec<SessionId> {
        let mut expired = Vec::new();
        for id in self.ids() {
            if let Some(session) = self.get(&id) {
                let idle = session.lock().await.idle_for();
                if idle >= ttl {
                    expired.push(id);
                }
            }
        }
        for id in &expired {
            self.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> HashMap<String, u32> {
        let mut m = HashMap::new();
        m.insert("default".to_string(), 8);
        m
    }

    #[test]
    fn generated_ids_are_twelve_hex_chars_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let registry = SessionRegistry::new();
        let (id, _) = registry.create(Tier::Basic, BrowsingMode::Extract, limits());
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_session() {
        let registry = SessionRegistry::new();
        let (id, _) = registry.create(Tier::Basic, BrowsingMode::Extract, limits());
        registry.remove(&id);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn sweep_idle_evicts_only_expired_sessions() {
        let registry = SessionRegistry::new();
        let (old_id, old_session) = registry.create(Tier::Basic, BrowsingMode::Extract, limits());
        let (fresh_id, _) = registry.create(Tier::Basic, BrowsingMode::Extract, limits());

        {
            let mut s = old_session.lock().await;
            s.last_active = Instant::now() - Duration::from_secs(3600);
        }

        let expired = registry.sweep_idle(Duration::from_secs(60)).await;
        assert_eq!(expired, vec![old_id.clone()]);
        assert!(registry.get(&old_id).is_none());
        assert!(registry.get(&fresh_id).is_some());
    }

    #[test]
    fn default_mode_is_extract() {
        assert_eq!(BrowsingMode::default(), BrowsingMode::Extract);
    }
}
