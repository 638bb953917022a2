//! Health report parsing and the oracle adapter.
//!
//! An absent or malformed report degrades to the empty snapshot: score 0,
//! every check false, never fresh. Callers treat "no report" as "fails all
//! guards", never as "healthy".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pac_types::HealthStatus;
use serde::Deserialize;
use tracing::debug;

/// A check entry: either a bare boolean or the collector's detailed form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCheck {
    Flag(bool),
    Detailed {
        ok: bool,
        #[serde(default)]
        #[allow(dead_code)]
        message: Option<String>,
    },
}

impl RawCheck {
    const fn ok(&self) -> bool {
        match self {
            Self::Flag(ok) | Self::Detailed { ok, .. } => *ok,
        }
    }
}

/// Wire form of the report. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    overall_score: i64,
    #[serde(default)]
    overall_status: HealthStatus,
    #[serde(default)]
    checks: BTreeMap<String, RawCheck>,
    #[serde(default)]
    timestamp: u64,
}

/// A point-in-time view of device health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    present: bool,
    score: u32,
    status: HealthStatus,
    checks: BTreeMap<String, bool>,
    timestamp: u64,
}

impl HealthSnapshot {
    /// The snapshot used when no report can be read.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            present: false,
            score: 0,
            status: HealthStatus::Critical,
            checks: BTreeMap::new(),
            timestamp: 0,
        }
    }

    /// Build a snapshot directly (tests and the collector).
    #[must_use]
    pub fn new(
        score: u32,
        status: HealthStatus,
        checks: BTreeMap<String, bool>,
        timestamp: u64,
    ) -> Self {
        Self {
            present: true,
            score,
            status,
            checks,
            timestamp,
        }
    }

    /// Overall health score. Negative wire values clamp to zero.
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    /// Categorical status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// One per-component boolean; false when the check is not present.
    #[must_use]
    pub fn check(&self, name: &str) -> bool {
        self.checks.get(name).copied().unwrap_or(false)
    }

    /// Report timestamp, seconds since epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Whether a report was actually read.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Whether the report is recent enough to trust.
    ///
    /// Absent reports are never fresh. A timestamp ahead of the clock reads
    /// as age zero.
    #[must_use]
    pub fn is_fresh(&self, max_age: Duration, now_epoch: u64) -> bool {
        if !self.present {
            return false;
        }
        let age = now_epoch.saturating_sub(self.timestamp);
        age <= max_age.as_secs()
    }
}

/// Anything that can produce a health snapshot on demand.
///
/// The file-backed oracle is the production source; tests substitute a
/// fixed snapshot.
pub trait HealthSource {
    fn snapshot(&self) -> HealthSnapshot;
}

/// A source that always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct FixedHealth(pub HealthSnapshot);

impl HealthSource for FixedHealth {
    fn snapshot(&self) -> HealthSnapshot {
        self.0.clone()
    }
}

/// Reads the health report from a well-known path.
#[derive(Debug, Clone)]
pub struct HealthOracle {
    path: PathBuf,
}

impl HealthOracle {
    /// Oracle over the report at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The report path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current snapshot. Missing or malformed reports degrade to
    /// [`HealthSnapshot::absent`]; this never fails.
    #[must_use]
    pub fn load(&self) -> HealthSnapshot {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "health report unreadable");
                return HealthSnapshot::absent();
            }
        };
        match serde_json::from_slice::<RawReport>(&bytes) {
            Ok(raw) => {
                let score = u32::try_from(raw.overall_score).unwrap_or(0);
                let checks = raw
                    .checks
                    .into_iter()
                    .map(|(name, check)| (name, check.ok()))
                    .collect();
                HealthSnapshot {
                    present: true,
                    score,
                    status: raw.overall_status,
                    checks,
                    timestamp: raw.timestamp,
                }
            }
            Err(err) => {
                debug!(path = %self.path.display(), %err, "health report malformed");
                HealthSnapshot::absent()
            }
        }
    }
}

impl HealthSource for HealthOracle {
    fn snapshot(&self) -> HealthSnapshot {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn oracle_over(content: &str) -> (tempfile::TempDir, HealthOracle) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("health.json");
        let mut file = std::fs::File::create(&path).expect("create report");
        file.write_all(content.as_bytes()).expect("write report");
        (dir, HealthOracle::new(path))
    }

    #[test]
    fn parses_flat_boolean_checks() {
        let (_dir, oracle) = oracle_over(
            r#"{
                "overall_score": 5,
                "overall_status": "healthy",
                "checks": {"memory": true, "storage": true, "network": false},
                "timestamp": 1700000000
            }"#,
        );
        let snapshot = oracle.load();
        assert!(snapshot.is_present());
        assert_eq!(snapshot.score(), 5);
        assert_eq!(snapshot.status(), HealthStatus::Healthy);
        assert!(snapshot.check("memory"));
        assert!(!snapshot.check("network"));
        assert!(!snapshot.check("watchdog"), "missing checks read false");
    }

    #[test]
    fn parses_detailed_collector_checks() {
        let (_dir, oracle) = oracle_over(
            r#"{
                "overall_score": 6,
                "max_score": 6,
                "overall_status": "healthy",
                "checks": {
                    "storage": {"ok": true, "message": "Storage healthy: 40% free"},
                    "ecc": {"ok": false, "message": "Uncorrectable ECC errors detected: 2"}
                },
                "timestamp": 1700000000
            }"#,
        );
        let snapshot = oracle.load();
        assert!(snapshot.check("storage"));
        assert!(!snapshot.check("ecc"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let (_dir, oracle) = oracle_over(
            r#"{"overall_score": 4, "overall_status": "degraded", "checks": {},
                "timestamp": 10, "legacy_format": {"wdt_ok": 1}, "extra": [1,2]}"#,
        );
        assert_eq!(oracle.load().score(), 4);
    }

    #[test]
    fn negative_score_clamps_to_zero() {
        let (_dir, oracle) = oracle_over(
            r#"{"overall_score": -3, "overall_status": "critical", "checks": {}, "timestamp": 1}"#,
        );
        assert_eq!(oracle.load().score(), 0);
    }

    #[test]
    fn absent_report_fails_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let oracle = HealthOracle::new(dir.path().join("nope.json"));
        let snapshot = oracle.load();
        assert!(!snapshot.is_present());
        assert_eq!(snapshot.score(), 0);
        assert!(!snapshot.check("memory"));
        assert!(!snapshot.is_fresh(Duration::from_secs(u64::MAX / 2), 0));
    }

    #[test]
    fn malformed_report_degrades_to_absent() {
        let (_dir, oracle) = oracle_over("{ this is not json");
        let snapshot = oracle.load();
        assert!(!snapshot.is_present());
        assert_eq!(snapshot.score(), 0);
    }

    #[test]
    fn unknown_status_reads_critical() {
        let (_dir, oracle) = oracle_over(
            r#"{"overall_score": 6, "overall_status": "excellent", "checks": {}, "timestamp": 1}"#,
        );
        assert_eq!(oracle.load().status(), HealthStatus::Critical);
    }

    #[test]
    fn freshness_window() {
        let snapshot = HealthSnapshot::new(6, HealthStatus::Healthy, BTreeMap::new(), 1_000);
        assert!(snapshot.is_fresh(Duration::from_secs(60), 1_030));
        assert!(!snapshot.is_fresh(Duration::from_secs(60), 1_100));
        // Clock behind the report: age reads as zero.
        assert!(snapshot.is_fresh(Duration::from_secs(60), 900));
    }
}
