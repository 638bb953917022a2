//! Core types for the progressive attestation controller.
//!
//! This crate is the bottom of the workspace layering: plain data types
//! shared by the journal, policy evaluator, and tier controllers. No I/O.

pub mod flags;
pub mod record;

use serde::{Deserialize, Serialize};

pub use flags::BootFlags;
pub use record::{BootRecord, DEFAULT_TRIES_T2, DEFAULT_TRIES_T3, JOURNAL_VERSION};

/// One of the three operational tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Tier {
    /// Minimal safe mode.
    Minimal = 1,
    /// Network-enabled, integrity-verified root.
    Connected = 2,
    /// Full-feature with remote attestation and measured-integrity root.
    Attested = 3,
}

impl Tier {
    /// Parse a raw tier byte; `None` outside 1..=3.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Minimal),
            2 => Some(Self::Connected),
            3 => Some(Self::Attested),
            _ => None,
        }
    }

    /// The raw on-disk byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The next tier up the ladder, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Minimal => Some(Self::Connected),
            Self::Connected => Some(Self::Attested),
            Self::Attested => None,
        }
    }

    /// The next tier down the ladder, if any.
    #[must_use]
    pub const fn below(self) -> Option<Self> {
        match self {
            Self::Minimal => None,
            Self::Connected => Some(Self::Minimal),
            Self::Attested => Some(Self::Connected),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.as_u8()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(raw: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or_else(|| format!("invalid tier: {raw} (must be 1, 2, or 3)"))
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Categorical health status carried in the health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Marginal,
    /// Also the decode fallback for unknown strings, so a half-written
    /// report never reads as healthy.
    #[default]
    #[serde(other)]
    Critical,
}

/// Why a tier decision came out the way it did.
///
/// Every guard evaluation maps to exactly one of these, so decisions are
/// observable in logs and deterministic in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    HealthBelowThreshold,
    RetriesExhausted,
    VerifierUnreachable,
    AttestationFailed,
    NetworkUnstable,
    TierRootMissing,
    Quarantined,
    BrownoutCooldown,
    ImaViolation,
    DiskCritical,
    MemoryCritical,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::HealthBelowThreshold => "health-below-threshold",
            Self::RetriesExhausted => "retries-exhausted",
            Self::VerifierUnreachable => "verifier-unreachable",
            Self::AttestationFailed => "attestation-failed",
            Self::NetworkUnstable => "network-unstable",
            Self::TierRootMissing => "tier-root-missing",
            Self::Quarantined => "quarantined",
            Self::BrownoutCooldown => "brownout-cooldown",
            Self::ImaViolation => "ima-violation",
            Self::DiskCritical => "disk-critical",
            Self::MemoryCritical => "memory-critical",
        };
        f.write_str(name)
    }
}

/// Outcome of one policy evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum TierDecision {
    /// All promotion guards passed; attempt the climb.
    Promote { to: Tier },
    /// Hold the current tier.
    Stay { at: Tier, reason: ReasonCode },
    /// A degradation guard fired. The first failing guard in evaluation
    /// order is `reason`; any other failing guards ride along.
    Demote {
        from: Tier,
        to: Tier,
        reason: ReasonCode,
        secondary: Vec<ReasonCode>,
    },
    /// Fall to Tier 1 and stay there until administrative action.
    Emergency { reason: ReasonCode },
}

impl TierDecision {
    /// The tier the device should be running after this decision applies.
    #[must_use]
    pub fn target_tier(&self) -> Tier {
        match self {
            Self::Promote { to } => *to,
            Self::Stay { at, .. } => *at,
            Self::Demote { to, .. } => *to,
            Self::Emergency { .. } => Tier::Minimal,
        }
    }

    /// True when applying this decision changes the committed tier.
    #[must_use]
    pub fn changes_tier(&self, current: Tier) -> bool {
        self.target_tier() != current
    }
}
