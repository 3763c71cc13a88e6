// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Response envelope for dispatched actions. Oversize payloads are
//! truncated by category rather than dropped wholesale, so `success` and
//! `code` always survive — grounded in the teacher's
//! `sven-tools::tool::OutputCategory` truncation idea, generalized to
//! egret's action results per SPEC_FULL.md §4.10 / §9.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Byte ceiling for a single envelope's `data` field before truncation.
pub const MAX_DATA_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub action: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub truncated_bytes: Option<usize>,
}

impl Envelope {
    pub fn success(action: &str, data: Value) -> Self {
        let mut env = Self {
            success: true,
            action: action.to_string(),
            data,
            warnings: Vec::new(),
            error_code: None,
            error_message: None,
            truncated_bytes: None,
        };
        env.truncate_if_oversize();
        env
    }

    pub fn error(action: &str, code: &str, message: &str) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            data: Value::Null,
            warnings: Vec::new(),
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            truncated_bytes: None,
        }
    }

    pub fn with_warning(mut self, warning: String) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Truncates the `data` payload in place if it serializes larger than
    /// [`MAX_DATA_BYTES`], preserving `success`/`action`/`error_code` fields
    /// and recording how many bytes were dropped.
    fn truncate_if_oversize(&mut self) {
        let serialized = match serde_json::to_string(&self.data) {
            Ok(s) => s,
            Err(_) => return,
        };
        if serialized.len() <= MAX_DATA_BYTES {
            return;
        }
        let dropped = serialized.len() - MAX_DATA_BYTES;
        let truncated: String = serialized.chars().take(MAX_DATA_BYTES).collect();
        self.data = Value::String(truncated);
        self.truncated_bytes = Some(dropped);
        self.warnings.push(format!("response truncated, {dropped} bytes dropped"));
    }
}
