//! Policy thresholds and timing knobs.
//!
//! Health scores are opaque integers; every threshold against them lives
//! here, not in code. The shipped collector scores 0..=6, and the defaults
//! below are calibrated to that scale.

use std::path::Path;
use std::time::Duration;

use pac_error::{PacError, Result};
use pac_types::flags::BROWNOUT_BOOTS_MAX;
use serde::Deserialize;
use tracing::info;

/// Evaluator configuration. Every field has a serde default so a config
/// file only names what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum score for Tier-2 promotion.
    pub t2_score_min: u32,
    /// Minimum score for Tier-3 promotion at boot.
    pub t3_score_min: u32,
    /// Minimum score the monitor requires to hold or reach Tier 3 in
    /// steady state.
    pub t3_runtime_score_min: u32,
    /// Boots a brownout blocks promotion for.
    pub brownout_cooldown_boots: u8,
    /// Network stability window before Tier-3 promotion, seconds.
    pub network_stability_secs: u64,
    /// Consecutive failed verifier probes that trigger the attestation
    /// sanity re-attempt.
    pub verifier_fail_threshold: u32,
    /// Consecutive low-health polls that degrade Tier 2.
    pub low_health_threshold: u32,
    /// Free-space floor on /var while at Tier 3, bytes.
    pub var_min_free_t3: u64,
    /// Free-space floor on /var while at Tier 2, bytes.
    pub var_min_free_t2: u64,
    /// Available-memory floor while at Tier 3, percent of total.
    pub mem_min_percent_t3: u8,
    /// Available-memory floor while at Tier 2, percent of total.
    pub mem_min_percent_t2: u8,
    /// Exhausted Tier-2 budget at boot raises EMERGENCY and QUARANTINE.
    pub emergency_on_exhaustion: bool,
    /// Degradation checks are suppressed this long after Tier 3 is first
    /// observed, seconds.
    pub t3_grace_secs: u64,
    /// Monitor loop period, seconds.
    pub monitor_interval_secs: u64,
    /// Oldest health report the controllers will trust, seconds.
    pub health_max_age_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            t2_score_min: 3,
            t3_score_min: 6,
            t3_runtime_score_min: 5,
            brownout_cooldown_boots: 2,
            network_stability_secs: 60,
            verifier_fail_threshold: 2,
            low_health_threshold: 2,
            var_min_free_t3: 10 * 1024 * 1024,
            var_min_free_t2: 5 * 1024 * 1024,
            mem_min_percent_t3: 5,
            mem_min_percent_t2: 3,
            emergency_on_exhaustion: true,
            t3_grace_secs: 10,
            monitor_interval_secs: 10,
            health_max_age_secs: 120,
        }
    }
}

impl PolicyConfig {
    /// Load from a JSON file; `None` or a missing file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no policy config, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            PacError::config(format!("policy config {}: {err}", path.display()))
        })
    }

    /// Brownout cooldown clamped to what the persisted counter can hold.
    #[must_use]
    pub fn brownout_cooldown(&self) -> u8 {
        self.brownout_cooldown_boots.min(BROWNOUT_BOOTS_MAX)
    }

    /// Network stability window.
    #[must_use]
    pub const fn network_stability_window(&self) -> Duration {
        Duration::from_secs(self.network_stability_secs)
    }

    /// Tier-3 grace period.
    #[must_use]
    pub const fn t3_grace(&self) -> Duration {
        Duration::from_secs(self.t3_grace_secs)
    }

    /// Monitor loop period.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Health report freshness bound.
    #[must_use]
    pub const fn health_max_age(&self) -> Duration {
        Duration::from_secs(self.health_max_age_secs)
    }
}
