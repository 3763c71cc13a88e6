// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-domain sliding-window rate limiter for sensitive-site protection.
//! Ported from `rate_limiter.py::RateLimiter`; pattern matching uses
//! longest-substring-wins rather than the original's insertion order (see
//! DESIGN.md, Open Question: rate limiter specificity).

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Actions that don't count toward rate limits (read-only).
pub const EXEMPT_ACTIONS: &[&str] = &["snapshot", "screenshot", "wait", "done", "cookies_get", "tab_switch"];

pub fn is_exempt(action: &str) -> bool {
    EXEMPT_ACTIONS.contains(&action)
}

const WINDOW_SECS: f64 = 60.0;

pub struct RateLimiter {
    limits: HashMap<String, u32>,
    windows: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, u32>) -> Self {
        Self {
            limits,
            windows: HashMap::new(),
        }
    }

    fn limit_for(&self, domain: &str) -> u32 {
        let mut best: Option<(&str, u32)> = None;
        for (pattern, limit) in &self.limits {
            if pattern == "default" {
                continue;
            }
            if domain.contains(pattern.as_str()) {
                match best {
                    Some((best_pattern, _)) if best_pattern.len() >= pattern.len() => {}
                    _ => best = Some((pattern.as_str(), *limit)),
                }
            }
        }
        best.map(|(_, l)| l).unwrap_or_else(|| *self.limits.get("default").unwrap_or(&8))
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front).as_secs_f64() >= WINDOW_SECS {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// True if an action on `domain` is currently allowed.
    pub fn check(&mut self, domain: &str) -> bool {
        let now = Instant::now();
        let limit = self.limit_for(domain);
        let window = self.windows.entry(domain.to_string()).or_default();
        Self::prune(window, now);
        window.len() < limit as usize
    }

    /// Record an action against `domain`'s window.
    pub fn record(&mut self, domain: &str) {
        let now = Instant::now();
        let window = self.windows.entry(domain.to_string()).or_default();
        Self::prune(window, now);
        window.push_back(now);
    }

    /// Seconds until the next action is allowed; 0.0 if allowed now.
    pub fn wait_time(&mut self, domain: &str) -> f64 {
        let now = Instant::now();
        let limit = self.limit_for(domain);
        let window = self.windows.entry(domain.to_string()).or_default();
        Self::prune(window, now);
        if window.len() < limit as usize {
            return 0.0;
        }
        let oldest = *window.front().unwrap();
        let elapsed = now.duration_since(oldest).as_secs_f64();
        (WINDOW_SECS - elapsed).max(0.0)
    }
}
