// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bearer token lifecycle: generate a raw token once at first run, persist
//! only its SHA-256 hash, and verify in constant time thereafter. Adapted
//! from the teacher's `sven-node::crypto::token` pattern.

use std::fs;
use std::path::Path;

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const TOKEN_BYTES: usize = 32;

/// A freshly generated token, shown to the operator exactly once.
pub struct RawToken {
    value: String,
}

impl RawToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let value = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        Self { value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_stored(self) -> StoredToken {
        StoredToken::from_raw(&self.value)
    }
}

/// The persisted form: only a SHA-256 hash, never the raw token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    hash_hex: String,
}

impl StoredToken {
    fn from_raw(raw: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Self { hash_hex: hex::encode(hasher.finalize()) }
    }

    /// Constant-time comparison against a candidate bearer token.
    pub fn verify(&self, candidate: &str) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(candidate.as_bytes());
        let candidate_hash = hex::encode(hasher.finalize());
        candidate_hash.as_bytes().ct_eq(self.hash_hex.as_bytes()).into()
    }
}

/// On-disk container for a [`StoredToken`], written with owner-only
/// permissions on unix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokenFile {
    pub token: StoredToken,
}

impl StoredTokenFile {
    pub fn write(path: &Path, token: &StoredToken) -> std::io::Result<()> {
        let file = StoredTokenFile { token: token.clone() };
        let yaml = serde_yaml::to_string(&file).map_err(std::io::Error::other)?;
        fs::write(path, yaml)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn read(path: &Path) -> std::io::Result<Option<StoredToken>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let file: StoredTokenFile = serde_yaml::from_str(&raw).map_err(std::io::Error::other)?;
        Ok(Some(file.token))
    }

    /// Loads the stored token at `path`, generating and persisting a new
    /// one if it doesn't exist yet. Returns the raw token only on first
    /// generation (None on subsequent loads, since the raw value is never
    /// persisted).
    pub fn load_or_generate(path: &Path) -> std::io::Result<(StoredToken, Option<String>)> {
        if let Some(stored) = Self::read(path)? {
            return Ok((stored, None));
        }
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let stored = raw.into_stored();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::write(path, &stored)?;
        Ok((stored, Some(raw_str)))
    }
}
