// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Stealth tier profiles. Tiers differ only in the [`TierProfile`] config
//! handed to [`crate::backend::BrowserBackend::launch`] — there is a single
//! launch code path, never a per-tier branch, per `original_source/config.py`'s
//! `TIER_PROFILES` table.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Basic = 1,
    Stealth = 2,
    Residential = 3,
}

impl Tier {
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            1 => Some(Tier::Basic),
            2 => Some(Tier::Stealth),
            3 => Some(Tier::Residential),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn profile(self) -> TierProfile {
        match self {
            Tier::Basic => TierProfile {
                tier: self,
                use_stealth_patches: false,
                use_proxy: false,
                humanize_multiplier: 1.0,
                ja4t_spoof: false,
            },
            Tier::Stealth => TierProfile {
                tier: self,
                use_stealth_patches: true,
                use_proxy: false,
                humanize_multiplier: 1.3,
                ja4t_spoof: false,
            },
            Tier::Residential => TierProfile {
                tier: self,
                use_stealth_patches: true,
                use_proxy: true,
                humanize_multiplier: 1.5,
                ja4t_spoof: true,
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Basic => write!(f, "basic"),
            Tier::Stealth => write!(f, "stealth"),
            Tier::Residential => write!(f, "residential"),
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Basic
    }
}

/// Concrete launch configuration for a tier. The backend interprets this;
/// the dispatcher and session core never branch on `tier` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct TierProfile {
    pub tier: Tier,
    pub use_stealth_patches: bool,
    pub use_proxy: bool,
    pub humanize_multiplier: f64,
    pub ja4t_spoof: bool,
}

/// Escalate to the next tier, or stay at the top if already at the
/// highest. Used when block detection fires (see `detector.rs`).
pub fn escalate(current: Tier, max_tier: u8) -> Tier {
    let next = (current.as_u8() + 1).min(max_tier.max(1));
    Tier::from_u8(next).unwrap_or(current)
}
