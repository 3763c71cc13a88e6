// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Lightweight page identity for stagnation detection. Direct port of
//! `models.py::PageFingerprint`/`compute_action_hash`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFingerprint {
    pub url_hash: String,
    pub interactive_count: usize,
    pub tab_count: usize,
    pub top_ref_keys: Vec<String>,
}

impl PageFingerprint {
    /// `refs` maps a ref id (e.g. `"e3"`) to `(role, name, nth)`.
    pub fn from_snapshot(
        url: &str,
        refs: &BTreeMap<String, (String, Option<String>, Option<usize>)>,
        tab_count: usize,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let url_hash = hex::encode(hasher.finalize())[..16].to_string();

        let top_ref_keys = refs
            .keys()
            .take(10)
            .map(|k| {
                let (role, name, nth) = &refs[k];
                format!(
                    "{}:{}:{}",
                    role,
                    name.clone().unwrap_or_default(),
                    nth.map(|n| n.to_string()).unwrap_or_default()
                )
            })
            .collect();

        Self {
            url_hash,
            interactive_count: refs.len(),
            tab_count,
            top_ref_keys,
        }
    }

    /// 0.0 = completely different, 1.0 = identical.
    pub fn similarity(&self, other: &PageFingerprint) -> f64 {
        if self.url_hash != other.url_hash {
            return 0.0;
        }
        let mut score = 0.5;
        if self.tab_count == other.tab_count {
            score += 0.1;
        }
        if self.interactive_count == other.interactive_count {
            score += 0.1;
        }
        if !self.top_ref_keys.is_empty() && !other.top_ref_keys.is_empty() {
            let a: std::collections::HashSet<_> = self.top_ref_keys.iter().collect();
            let b: std::collections::HashSet<_> = other.top_ref_keys.iter().collect();
            let overlap = a.intersection(&b).count();
            let max_len = self.top_ref_keys.len().max(other.top_ref_keys.len());
            if max_len > 0 {
                score += 0.3 * (overlap as f64 / max_len as f64);
            }
        }
        score.min(1.0)
    }
}

/// Deterministic hash of action name + normalized parameters, excluding
/// `session_id`/`timestamp` so retries of the same action hash identically.
pub fn compute_action_hash(action_name: &str, params: &serde_json::Value) -> String {
    let stable: BTreeMap<&str, &serde_json::Value> = params
        .as_object()
        .map(|m| {
            m.iter()
                .filter(|(k, _)| k.as_str() != "session_id" && k.as_str() != "timestamp")
                .map(|(k, v)| (k.as_str(), v))
                .collect()
        })
        .unwrap_or_default();
    let raw = format!("{}:{}", action_name, serde_json::to_string(&stable).unwrap_or_default());
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
