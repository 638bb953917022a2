//! Health collector: produces the report the oracle consumes.
//!
//! Six checks, one score point each: watchdog, ecc, storage, network,
//! memory, temperature. Every sysfs/procfs root is a parameter so the
//! collector runs against a fixture tree in tests.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pac_error::Result;
use pac_types::HealthStatus;
use serde::Serialize;
use tracing::debug;

/// Maximum attainable score: one point per check.
pub const MAX_SCORE: u32 = 6;

/// Collector thresholds and probe roots.
#[derive(Debug, Clone)]
pub struct HealthCollectorConfig {
    /// Correctable-ECC count below which memory is healthy.
    pub ecc_threshold: u64,
    /// Minimum available memory in KiB.
    pub mem_min_free_kb: u64,
    /// Minimum free space on the root filesystem, percent.
    pub storage_min_free_pct: u8,
    /// Per-target network probe timeout.
    pub network_timeout: Duration,
    /// Maximum tolerated temperature in whole degrees Celsius.
    pub temp_max_celsius: u32,
    /// Network probe targets, tried in order until one answers.
    pub network_targets: Vec<SocketAddr>,
    /// Watchdog device nodes, first present wins.
    pub watchdog_devices: Vec<PathBuf>,
    /// EDAC memory-controller root.
    pub edac_root: PathBuf,
    /// Thermal-zone root.
    pub thermal_root: PathBuf,
    /// Hardware-monitor root.
    pub hwmon_root: PathBuf,
    /// Mount point whose free space the storage check measures.
    pub storage_mount: PathBuf,
    /// Memory statistics file.
    pub meminfo_path: PathBuf,
}

impl Default for HealthCollectorConfig {
    fn default() -> Self {
        Self {
            ecc_threshold: 10,
            mem_min_free_kb: 10_240,
            storage_min_free_pct: 5,
            network_timeout: Duration::from_secs(2),
            temp_max_celsius: 85,
            network_targets: vec![
                SocketAddr::from(([8, 8, 8, 8], 53)),
                SocketAddr::from(([1, 1, 1, 1], 53)),
            ],
            watchdog_devices: vec![
                PathBuf::from("/dev/watchdog"),
                PathBuf::from("/dev/watchdog0"),
            ],
            edac_root: PathBuf::from("/sys/devices/system/edac"),
            thermal_root: PathBuf::from("/sys/class/thermal"),
            hwmon_root: PathBuf::from("/sys/class/hwmon"),
            storage_mount: PathBuf::from("/"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub ok: bool,
    pub message: String,
}

impl CheckOutcome {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// A full collection pass, ready to serialize as the on-disk report.
#[derive(Debug, Clone, Serialize)]
pub struct CollectedReport {
    pub timestamp: u64,
    pub overall_score: u32,
    pub max_score: u32,
    pub overall_status: HealthStatus,
    pub checks: BTreeMap<String, CheckOutcome>,
}

impl CollectedReport {
    /// Render the report for humans.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Health Check Report");
        let _ = writeln!(out, "Timestamp: {}", self.timestamp);
        let _ = writeln!(
            out,
            "Overall Status: {:?} ({}/{} checks passed)",
            self.overall_status, self.overall_score, self.max_score
        );
        let _ = writeln!(out);
        for (name, check) in &self.checks {
            let mark = if check.ok { "ok " } else { "FAIL" };
            let _ = writeln!(out, "  [{mark}] {name:<12} {}", check.message);
        }
        out
    }

    /// Write the report as JSON, atomically (temp file then rename) so the
    /// oracle never observes a half-written report.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|err| pac_error::PacError::config(format!("report serialization: {err}")))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Coarse classification of a collected score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum HealthClass {
    Healthy = 0,
    Degraded = 1,
    Critical = 2,
}

/// Map a score onto the decision-return classification:
/// healthy at 5 of 6 and above, degraded at 3, critical below.
#[must_use]
pub const fn classify_score(score: u32) -> HealthClass {
    if score >= 5 {
        HealthClass::Healthy
    } else if score >= 3 {
        HealthClass::Degraded
    } else {
        HealthClass::Critical
    }
}

const fn status_for_score(score: u32) -> HealthStatus {
    // healthy >= 5/6 of max, degraded >= half, critical below.
    if score >= MAX_SCORE * 5 / 6 {
        HealthStatus::Healthy
    } else if score >= MAX_SCORE / 2 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Critical
    }
}

/// Runs the six checks.
#[derive(Debug, Default, Clone)]
pub struct HealthCollector {
    config: HealthCollectorConfig,
}

impl HealthCollector {
    #[must_use]
    pub fn new(config: HealthCollectorConfig) -> Self {
        Self { config }
    }

    /// Run every check and assemble the report.
    #[must_use]
    pub fn run(&self) -> CollectedReport {
        let mut checks = BTreeMap::new();
        checks.insert("watchdog".to_owned(), self.check_watchdog());
        checks.insert("ecc".to_owned(), self.check_ecc());
        checks.insert("storage".to_owned(), self.check_storage());
        checks.insert("network".to_owned(), self.check_network());
        checks.insert("memory".to_owned(), self.check_memory());
        checks.insert("temperature".to_owned(), self.check_temperature());

        let overall_score = checks.values().filter(|check| check.ok).count() as u32;
        CollectedReport {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            overall_score,
            max_score: MAX_SCORE,
            overall_status: status_for_score(overall_score),
            checks,
        }
    }

    fn check_watchdog(&self) -> CheckOutcome {
        for dev in &self.config.watchdog_devices {
            if dev.exists() {
                return CheckOutcome::pass(format!(
                    "Watchdog device present at {}",
                    dev.display()
                ));
            }
        }
        CheckOutcome::fail("No watchdog device found")
    }

    fn check_ecc(&self) -> CheckOutcome {
        if !self.config.edac_root.exists() {
            return CheckOutcome::pass("EDAC not available, assuming OK");
        }
        let mut ce_total: u64 = 0;
        let mut ue_total: u64 = 0;
        if let Ok(entries) = std::fs::read_dir(self.config.edac_root.join("mc")) {
            for entry in entries.flatten() {
                if !entry.file_name().to_string_lossy().starts_with("mc") {
                    continue;
                }
                ce_total += read_number(&entry.path().join("ce_count")).unwrap_or(0);
                ue_total += read_number(&entry.path().join("ue_count")).unwrap_or(0);
            }
        }
        if ue_total > 0 {
            return CheckOutcome::fail(format!(
                "Uncorrectable ECC errors detected: {ue_total}"
            ));
        }
        if ce_total < self.config.ecc_threshold {
            CheckOutcome::pass(format!(
                "ECC errors within threshold: {ce_total} < {}",
                self.config.ecc_threshold
            ))
        } else {
            CheckOutcome::fail(format!(
                "ECC errors exceed threshold: {ce_total} >= {}",
                self.config.ecc_threshold
            ))
        }
    }

    fn check_storage(&self) -> CheckOutcome {
        let stats = match nix::sys::statvfs::statvfs(&self.config.storage_mount) {
            Ok(stats) => stats,
            Err(err) => return CheckOutcome::fail(format!("Failed to check storage: {err}")),
        };
        let blocks_total = stats.blocks().max(1);
        let free_pct = (stats.blocks_available() as u128 * 100 / blocks_total as u128) as u8;
        if free_pct >= self.config.storage_min_free_pct {
            CheckOutcome::pass(format!("Storage healthy: {free_pct}% free"))
        } else {
            CheckOutcome::fail(format!(
                "Storage low: {free_pct}% free (min: {}%)",
                self.config.storage_min_free_pct
            ))
        }
    }

    fn check_network(&self) -> CheckOutcome {
        for target in &self.config.network_targets {
            match TcpStream::connect_timeout(target, self.config.network_timeout) {
                Ok(_) => {
                    return CheckOutcome::pass(format!("Network reachable (tested: {target})"));
                }
                Err(err) => debug!(%target, %err, "network probe failed"),
            }
        }
        CheckOutcome::fail("Network unreachable")
    }

    fn check_memory(&self) -> CheckOutcome {
        let content = match std::fs::read_to_string(&self.config.meminfo_path) {
            Ok(content) => content,
            Err(_) => return CheckOutcome::fail("Failed to read memory statistics"),
        };
        let field = |name: &str| {
            content.lines().find_map(|line| {
                let rest = line.strip_prefix(name)?;
                rest.trim().split_whitespace().next()?.parse::<u64>().ok()
            })
        };
        let total = field("MemTotal:");
        let available = field("MemAvailable:").or_else(|| field("MemFree:"));
        let (Some(total), Some(available)) = (total, available) else {
            return CheckOutcome::fail("Failed to parse memory info");
        };
        let pct = available * 100 / total.max(1);
        if available >= self.config.mem_min_free_kb {
            CheckOutcome::pass(format!("Memory healthy: {available}KB available ({pct}%)"))
        } else {
            CheckOutcome::fail(format!("Low memory: {available}KB available ({pct}%)"))
        }
    }

    fn check_temperature(&self) -> CheckOutcome {
        let mut max_milli: Option<u64> = None;

        if let Ok(entries) = std::fs::read_dir(&self.config.thermal_root) {
            for entry in entries.flatten() {
                if !entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("thermal_zone")
                {
                    continue;
                }
                if let Some(value) = read_number(&entry.path().join("temp")) {
                    max_milli = Some(max_milli.map_or(value, |cur| cur.max(value)));
                }
            }
        }

        // Each sensor directory under the hwmon root, every temp*_input file.
        if let Ok(sensors) = std::fs::read_dir(&self.config.hwmon_root) {
            for sensor in sensors.flatten() {
                let Ok(files) = std::fs::read_dir(sensor.path()) else {
                    continue;
                };
                for file in files.flatten() {
                    let name = file.file_name();
                    let name = name.to_string_lossy();
                    if !(name.starts_with("temp") && name.ends_with("_input")) {
                        continue;
                    }
                    if let Some(value) = read_number(&file.path()) {
                        max_milli = Some(max_milli.map_or(value, |cur| cur.max(value)));
                    }
                }
            }
        }

        let Some(max_milli) = max_milli else {
            return CheckOutcome::pass("Temperature monitoring not available");
        };
        let celsius = max_milli / 1000;
        if celsius <= u64::from(self.config.temp_max_celsius) {
            CheckOutcome::pass(format!(
                "Temperature normal: {celsius}C (max: {}C)",
                self.config.temp_max_celsius
            ))
        } else {
            CheckOutcome::fail(format!(
                "Temperature critical: {celsius}C (max: {}C)",
                self.config.temp_max_celsius
            ))
        }
    }
}

fn read_number(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixture tree with healthy sysfs/procfs stand-ins, and a config whose
    /// network targets point nowhere reachable.
    fn fixture() -> (tempfile::TempDir, HealthCollectorConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        std::fs::write(root.join("watchdog"), b"").expect("watchdog node");

        let mc0 = root.join("edac/mc/mc0");
        std::fs::create_dir_all(&mc0).expect("edac tree");
        std::fs::write(mc0.join("ce_count"), "2\n").expect("ce");
        std::fs::write(mc0.join("ue_count"), "0\n").expect("ue");

        let zone = root.join("thermal/thermal_zone0");
        std::fs::create_dir_all(&zone).expect("thermal tree");
        std::fs::write(zone.join("temp"), "45000\n").expect("temp");

        let hwmon = root.join("hwmon/hwmon0");
        std::fs::create_dir_all(&hwmon).expect("hwmon tree");
        std::fs::write(hwmon.join("temp1_input"), "52000\n").expect("sensor");
        std::fs::write(hwmon.join("fan1_input"), "1200\n").expect("non-temp file");

        std::fs::write(
            root.join("meminfo"),
            "MemTotal:       1000000 kB\nMemFree:         400000 kB\nMemAvailable:    500000 kB\n",
        )
        .expect("meminfo");

        let config = HealthCollectorConfig {
            network_targets: vec![SocketAddr::from(([127, 0, 0, 1], 1))],
            network_timeout: Duration::from_millis(50),
            watchdog_devices: vec![root.join("watchdog")],
            edac_root: root.join("edac"),
            thermal_root: root.join("thermal"),
            hwmon_root: root.join("hwmon"),
            storage_mount: root.to_path_buf(),
            meminfo_path: root.join("meminfo"),
            ..HealthCollectorConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn fixture_tree_scores_all_but_network() {
        let (_dir, config) = fixture();
        let report = HealthCollector::new(config).run();
        assert!(report.checks["watchdog"].ok);
        assert!(report.checks["ecc"].ok);
        assert!(report.checks["storage"].ok);
        assert!(report.checks["memory"].ok);
        assert!(report.checks["temperature"].ok);
        assert!(!report.checks["network"].ok, "no listener on port 1");
        assert_eq!(report.overall_score, 5);
        assert_eq!(report.overall_status, HealthStatus::Healthy);
    }

    #[test]
    fn uncorrectable_ecc_fails() {
        let (dir, config) = fixture();
        std::fs::write(dir.path().join("edac/mc/mc0/ue_count"), "1\n").expect("ue");
        let report = HealthCollector::new(config).run();
        assert!(!report.checks["ecc"].ok);
        assert!(report.checks["ecc"].message.contains("Uncorrectable"));
    }

    #[test]
    fn missing_edac_is_ok() {
        let (dir, mut config) = fixture();
        config.edac_root = dir.path().join("no-such-edac");
        let report = HealthCollector::new(config).run();
        assert!(report.checks["ecc"].ok);
    }

    #[test]
    fn hwmon_sensors_feed_the_temperature_check() {
        let (dir, mut config) = fixture();
        config.temp_max_celsius = 50;
        // hwmon sensor reads 52C, above the 50C ceiling.
        std::fs::write(dir.path().join("thermal/thermal_zone0/temp"), "40000\n").expect("temp");
        let report = HealthCollector::new(config).run();
        assert!(!report.checks["temperature"].ok);
    }

    #[test]
    fn absent_sensors_read_ok() {
        let (dir, mut config) = fixture();
        config.thermal_root = dir.path().join("no-thermal");
        config.hwmon_root = dir.path().join("no-hwmon");
        let report = HealthCollector::new(config).run();
        assert!(report.checks["temperature"].ok);
        assert!(report.checks["temperature"]
            .message
            .contains("not available"));
    }

    #[test]
    fn low_memory_fails() {
        let (dir, config) = fixture();
        std::fs::write(
            dir.path().join("meminfo"),
            "MemTotal:       1000000 kB\nMemAvailable:      1024 kB\n",
        )
        .expect("meminfo");
        let report = HealthCollector::new(config).run();
        assert!(!report.checks["memory"].ok);
    }

    #[test]
    fn report_roundtrips_through_the_oracle() {
        let (dir, config) = fixture();
        let report = HealthCollector::new(config).run();
        let path = dir.path().join("health.json");
        report.write_to(&path).expect("write report");

        let snapshot = crate::report::HealthOracle::new(&path).load();
        assert!(snapshot.is_present());
        assert_eq!(snapshot.score(), report.overall_score);
        assert!(snapshot.check("watchdog"));
        assert!(!snapshot.check("network"));
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify_score(6), HealthClass::Healthy);
        assert_eq!(classify_score(5), HealthClass::Healthy);
        assert_eq!(classify_score(4), HealthClass::Degraded);
        assert_eq!(classify_score(3), HealthClass::Degraded);
        assert_eq!(classify_score(2), HealthClass::Critical);
        assert_eq!(classify_score(0), HealthClass::Critical);
    }
}
