// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration for the egret gateway and session core.
///
/// Defaults mirror `original_source/config.py`'s `Config` class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub session: SessionConfig,
    pub tier: TierConfig,
    pub rate_limit: RateLimitConfig,
    pub snapshot: SnapshotConfig,
    pub humanize: HumanizeConfig,
    pub geo: GeoConfig,
    pub proxy: ProxyConfig,
    pub captcha: CaptchaConfig,
    pub profile: ProfileConfig,
    pub features: FeatureFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            tier: TierConfig::default(),
            rate_limit: RateLimitConfig::default(),
            snapshot: SnapshotConfig::default(),
            humanize: HumanizeConfig::default(),
            geo: GeoConfig::default(),
            proxy: ProxyConfig::default(),
            captcha: CaptchaConfig::default(),
            profile: ProfileConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}
fn default_bind_port() -> u16 {
    8088
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_bind_port")]
    pub port: u16,
    /// Path to the stored bearer-token hash file.
    pub token_path: Option<String>,
    /// Per-IP failed-auth attempts allowed per minute before lockout.
    pub auth_failures_per_minute: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_bind_port(),
            token_path: None,
            auth_failures_per_minute: 5,
        }
    }
}

fn default_idle_ttl_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_max_sessions() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    pub default_viewport_width: u32,
    pub default_viewport_height: u32,
    pub default_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_sessions: default_max_sessions(),
            default_viewport_width: 1920,
            default_viewport_height: 1080,
            default_timeout_ms: 30_000,
        }
    }
}

fn default_max_tier() -> u8 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    #[serde(default = "default_max_tier")]
    pub max_tier: u8,
    pub chrome_channel: Option<String>,
    pub chrome_executable: Option<String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            max_tier: default_max_tier(),
            chrome_channel: None,
            chrome_executable: None,
        }
    }
}

fn default_sensitive_limits() -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("default".to_string(), 8);
    m.insert("linkedin.com".to_string(), 4);
    m.insert("facebook.com".to_string(), 5);
    m.insert("twitter.com".to_string(), 6);
    m.insert("x.com".to_string(), 6);
    m.insert("instagram.com".to_string(), 4);
    m
}

/// Per-domain action budgets, in actions-per-minute. Keyed by domain
/// substring; `"default"` is the fallback applied to any domain not
/// otherwise matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    #[serde(default = "default_sensitive_limits")]
    pub sensitive_limits: HashMap<String, u32>,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sensitive_limits: default_sensitive_limits(),
            window_secs: 60,
        }
    }
}

fn default_max_snapshot_depth() -> usize {
    10
}
fn default_max_snapshot_bytes() -> usize {
    100_000
}
fn default_max_response_bytes() -> usize {
    100_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    #[serde(default = "default_max_snapshot_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_snapshot_depth(),
            max_bytes: default_max_snapshot_bytes(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_humanize() -> f64 {
    1.0
}
fn default_warm_humanize() -> f64 {
    1.5
}
fn default_sensitive_floor() -> f64 {
    1.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizeConfig {
    pub enabled: bool,
    #[serde(default = "default_humanize")]
    pub default_intensity: f64,
    #[serde(default = "default_warm_humanize")]
    pub warm_up_intensity: f64,
    #[serde(default = "default_sensitive_floor")]
    pub sensitive_floor: f64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_intensity: default_humanize(),
            warm_up_intensity: default_warm_humanize(),
            sensitive_floor: default_sensitive_floor(),
        }
    }
}

fn default_geo_profile() -> String {
    "us".to_string()
}

fn default_geo_profiles() -> HashMap<String, GeoProfile> {
    let entries: &[(&str, &str, &str)] = &[
        ("us", "America/New_York", "en-US"),
        ("uk", "Europe/London", "en-GB"),
        ("de", "Europe/Berlin", "de-DE"),
        ("fr", "Europe/Paris", "fr-FR"),
        ("jp", "Asia/Tokyo", "ja-JP"),
        ("au", "Australia/Sydney", "en-AU"),
        ("ca", "America/Toronto", "en-CA"),
        ("br", "America/Sao_Paulo", "pt-BR"),
        ("in", "Asia/Kolkata", "en-IN"),
        ("sg", "Asia/Singapore", "en-SG"),
        ("nl", "Europe/Amsterdam", "nl-NL"),
        ("es", "Europe/Madrid", "es-ES"),
    ];
    entries
        .iter()
        .map(|(k, tz, locale)| {
            (
                k.to_string(),
                GeoProfile {
                    timezone: tz.to_string(),
                    locale: locale.to_string(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoProfile {
    pub timezone: String,
    pub locale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    #[serde(default = "default_geo_profile")]
    pub active: String,
    #[serde(default = "default_geo_profiles")]
    pub profiles: HashMap<String, GeoProfile>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            active: default_geo_profile(),
            profiles: default_geo_profiles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CaptchaConfig {
    pub provider: Option<String>,
    pub api_key: Option<String>,
}

fn default_profile_dir() -> String {
    "~/.local/share/egret/profiles".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_dir")]
    pub dir: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            dir: default_profile_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub evaluate_enabled: bool,
    pub webmcp_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            evaluate_enabled: true,
            webmcp_enabled: true,
        }
    }
}
