// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Detects repetitive action patterns and stuck agents. Direct port of
//! `models.py::ActionLoopDetector`.

use std::collections::VecDeque;

use crate::fingerprint::{compute_action_hash, PageFingerprint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    Warning(String),
    Stuck(String),
    Critical(String),
}

impl LoopVerdict {
    pub fn message(&self) -> &str {
        match self {
            LoopVerdict::Warning(m) | LoopVerdict::Stuck(m) | LoopVerdict::Critical(m) => m,
        }
    }
}

pub struct ActionLoopDetector {
    window: VecDeque<(String, Option<PageFingerprint>)>,
    window_size: usize,
    threshold: usize,
}

impl ActionLoopDetector {
    pub fn new(window_size: usize, threshold: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            threshold,
        }
    }

    /// Record an action. Returns an escalating verdict if a loop is detected.
    pub fn record(
        &mut self,
        action_name: &str,
        params: &serde_json::Value,
        fingerprint: Option<PageFingerprint>,
    ) -> Option<LoopVerdict> {
        let action_hash = compute_action_hash(action_name, params);
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back((action_hash.clone(), fingerprint.clone()));

        let count = self.window.iter().filter(|(h, _)| *h == action_hash).count();
        if count < self.threshold {
            return None;
        }

        let fp_matches = match &fingerprint {
            Some(fp) => self
                .window
                .iter()
                .filter(|(h, other)| {
                    *h == action_hash
                        && other.as_ref().is_some_and(|o| fp.similarity(o) > 0.8)
                })
                .count(),
            None => count,
        };
        if fp_matches < self.threshold {
            return None;
        }

        let message = if count >= self.threshold + 4 {
            format!(
                "CRITICAL: Action '{action_name}' repeated {count} times. \
                 You are in an infinite loop. Call done immediately with partial results."
            )
        } else if count >= self.threshold + 2 {
            format!(
                "STUCK: Action '{action_name}' repeated {count} times. \
                 Current approach is not working. Try: \
                 1) navigate to a different URL, 2) use evaluate to inspect the DOM, \
                 3) call done with partial results."
            )
        } else {
            format!(
                "WARNING: Action '{action_name}' repeated {count} times on same page. \
                 Try a different approach — scroll, use a different element, or navigate elsewhere."
            )
        };

        Some(if count >= self.threshold + 4 {
            LoopVerdict::Critical(message)
        } else if count >= self.threshold + 2 {
            LoopVerdict::Stuck(message)
        } else {
            LoopVerdict::Warning(message)
        })
    }

    /// Clear the window (e.g. after navigation to a new domain).
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for ActionLoopDetector {
    fn default() -> Self {
        Self::new(10, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn fp(url: &str) -> PageFingerprint {
        PageFingerprint::from_snapshot(url, &BTreeMap::new(), 1)
    }

    #[test]
    fn no_verdict_below_threshold() {
        let mut d = ActionLoopDetector::new(10, 3);
        assert!(d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test"))).is_none());
        assert!(d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test"))).is_none());
    }

    #[test]
    fn warning_at_threshold() {
        let mut d = ActionLoopDetector::new(10, 3);
        for _ in 0..2 {
            d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        }
        let v = d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test"))).unwrap();
        assert!(matches!(v, LoopVerdict::Warning(_)));
    }

    #[test]
    fn escalates_to_stuck_then_critical() {
        let mut d = ActionLoopDetector::new(10, 3);
        let mut last = None;
        for _ in 0..5 {
            last = d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        }
        assert!(matches!(last.as_ref().unwrap(), LoopVerdict::Stuck(_)));
        for _ in 0..2 {
            last = d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        }
        assert!(matches!(last.unwrap(), LoopVerdict::Critical(_)));
    }

    #[test]
    fn different_page_fingerprint_resets_match_count() {
        let mut d = ActionLoopDetector::new(10, 3);
        d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        let v = d.record("click", &json!({"ref": "e1"}), Some(fp("https://b.test")));
        assert!(v.is_none());
    }

    #[test]
    fn reset_clears_window() {
        let mut d = ActionLoopDetector::new(10, 3);
        for _ in 0..3 {
            d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test")));
        }
        d.reset();
        assert!(d.record("click", &json!({"ref": "e1"}), Some(fp("https://a.test"))).is_none());
    }

    #[test]
    fn no_fingerprint_falls_back_to_raw_count() {
        let mut d = ActionLoopDetector::new(10, 3);
        d.record("scroll", &json!({}), None);
        d.record("scroll", &json!({}), None);
        let v = d.record("scroll", &json!({}), None);
        assert!(v.is_some());
    }
}
