// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistent browser identity profiles: cookies, storage state, tier
//! cache, and dual-mode credential injection. Ported from
//! `original_source/session.py::SessionManager` and
//! `original_source/config.py`'s `validate_profile_name`/`safe_profile_path`.
//! Credential files are written with owner-only permissions, following the
//! secure-file-write pattern the teacher uses for token storage.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{create_error, BrowserError, ErrorCode};

static PROFILE_NAME_CHARS: fn(char) -> bool = |c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';

/// Validates a profile name against the strict `[a-zA-Z0-9._-]+` pattern
/// and rejects traversal attempts, mirroring the Python original.
pub fn validate_profile_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("profile name cannot be empty".to_string());
    }
    if !name.chars().all(PROFILE_NAME_CHARS) {
        return Err(format!("invalid profile name '{name}': only [a-zA-Z0-9._-] allowed"));
    }
    if name.contains("..") || name.starts_with('/') {
        return Err(format!("invalid profile name '{name}': path traversal not allowed"));
    }
    Ok(())
}

/// Resolves `name` under `base_dir`, rejecting any path that would escape
/// `base_dir` after validation and normalization.
pub fn safe_profile_path(base_dir: &Path, name: &str) -> Option<PathBuf> {
    validate_profile_name(name).ok()?;
    let candidate = base_dir.join(name);
    Some(candidate)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    pub name: String,
    pub domain: String,
    pub tier: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credential {
    pub key: String,
    pub secret: String,
}

/// Filesystem-backed profile store, rooted at a single base directory
/// (default `~/.egret/profiles`, per `egret_config::Config::profile`).
pub struct ProfileStore {
    base_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(base_dir: PathBuf) -> Result<Self, BrowserError> {
        fs::create_dir_all(&base_dir)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("cannot create profile dir: {e}"), None))?;
        Ok(Self { base_dir })
    }

    fn profile_dir(&self, name: &str) -> Result<PathBuf, BrowserError> {
        safe_profile_path(&self.base_dir, name)
            .ok_or_else(|| create_error(ErrorCode::InvalidParams, &format!("invalid profile name '{name}'"), None))
    }

    pub fn create(&self, name: &str, domain: &str, tier: u8) -> Result<Profile, BrowserError> {
        let dir = self.profile_dir(name)?;
        fs::create_dir_all(&dir)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("cannot create profile: {e}"), None))?;
        let profile = Profile { name: name.to_string(), domain: domain.to_string(), tier };
        let meta = serde_json::to_string_pretty(&profile)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("serialize profile: {e}"), None))?;
        fs::write(dir.join("profile.json"), meta)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("write profile: {e}"), None))?;
        Ok(profile)
    }

    pub fn load(&self, name: &str) -> Result<Option<Profile>, BrowserError> {
        let dir = self.profile_dir(name)?;
        let path = dir.join("profile.json");
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("read profile: {e}"), None))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("parse profile: {e}"), None))
    }

    pub fn list(&self) -> Result<Vec<Profile>, BrowserError> {
        let mut profiles = Vec::new();
        if !self.base_dir.exists() {
            return Ok(profiles);
        }
        let entries = fs::read_dir(&self.base_dir)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("list profiles: {e}"), None))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        for name in names {
            if let Some(p) = self.load(&name)? {
                profiles.push(p);
            }
        }
        Ok(profiles)
    }

    pub fn delete(&self, name: &str) -> Result<(), BrowserError> {
        let dir = self.profile_dir(name)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| create_error(ErrorCode::InternalError, &format!("delete profile: {e}"), None))?;
        }
        Ok(())
    }

    pub fn save_cookies(&self, name: &str, cookies: &serde_json::Value) -> Result<(), BrowserError> {
        let dir = self.profile_dir(name)?;
        fs::create_dir_all(&dir).ok();
        let raw = serde_json::to_string(cookies)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("serialize cookies: {e}"), None))?;
        fs::write(dir.join("cookies.json"), raw)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("write cookies: {e}"), None))
    }

    pub fn load_cookies(&self, name: &str) -> Result<Option<serde_json::Value>, BrowserError> {
        let dir = self.profile_dir(name)?;
        let path = dir.join("cookies.json");
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("read cookies: {e}"), None))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("parse cookies: {e}"), None))
    }

    /// Saves credentials with owner-only permissions on unix.
    pub fn save_credentials(&self, name: &str, credentials: &HashMap<String, String>) -> Result<(), BrowserError> {
        let dir = self.profile_dir(name)?;
        fs::create_dir_all(&dir).ok();
        let path = dir.join("credentials.json");
        let raw = serde_json::to_string_pretty(credentials)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("serialize credentials: {e}"), None))?;
        fs::write(&path, raw)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("write credentials: {e}"), None))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms)
                .map_err(|e| create_error(ErrorCode::InternalError, &format!("chmod credentials: {e}"), None))?;
        }
        Ok(())
    }

    pub fn load_credentials(&self, name: &str) -> Result<HashMap<String, String>, BrowserError> {
        let dir = self.profile_dir(name)?;
        let path = dir.join("credentials.json");
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("read credentials: {e}"), None))?;
        serde_json::from_str(&raw)
            .map_err(|e| create_error(ErrorCode::InternalError, &format!("parse credentials: {e}"), None))
    }

    /// Dual-mode credential resolution: `<secret>key</secret>` resolves a
    /// tagged reference; a bare value that exactly matches a credential key
    /// resolves as a literal fallback. Otherwise the value passes through
    /// unchanged.
    pub fn resolve_credential(&self, name: &str, value: &str) -> Result<String, BrowserError> {
        let creds = self.load_credentials(name)?;
        if let Some(key) = value.strip_prefix("<secret>").and_then(|v| v.strip_suffix("</secret>")) {
            return Ok(creds.get(key).cloned().unwrap_or_default());
        }
        if let Some(secret) = creds.get(value) {
            return Ok(secret.clone());
        }
        Ok(value.to_string())
    }
}
