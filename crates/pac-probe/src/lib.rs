//! External probe facade.
//!
//! All I/O the policy evaluator depends on goes through the [`Probes`]
//! trait: one bounded verifier probe, a fixed-interval network stability
//! window, tier-root presence, and the system gauges the degradation guards
//! read. Every call is time-bounded; a timeout is a `false` or `None`
//! result, never an error.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use pac_types::Tier;
use tracing::debug;

/// Probe targets and bounds.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Verifier endpoint, `host:port`.
    pub verifier_addr: String,
    /// Bound on one verifier reachability probe.
    pub verifier_timeout: Duration,
    /// Target probed for network stability, `host:port`.
    pub stability_target: String,
    /// Interval between stability probes inside the window.
    pub stability_interval: Duration,
    /// Tier-2 root image path.
    pub tier2_root: PathBuf,
    /// Tier-3 root image path.
    pub tier3_root: PathBuf,
    /// Filesystem whose free space the disk guards watch.
    pub var_path: PathBuf,
    /// Memory statistics file.
    pub meminfo_path: PathBuf,
    /// IMA violations counter, absent on kernels without IMA.
    pub ima_violations_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            verifier_addr: "verifier.local:8443".to_owned(),
            verifier_timeout: Duration::from_secs(2),
            stability_target: "verifier.local:8443".to_owned(),
            stability_interval: Duration::from_secs(5),
            tier2_root: PathBuf::from("/var/pac/roots/tier2.img"),
            tier3_root: PathBuf::from("/var/pac/roots/tier3.img"),
            var_path: PathBuf::from("/var"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            ima_violations_path: PathBuf::from("/sys/kernel/security/ima/violations"),
        }
    }
}

/// The probe surface the policy evaluator sees.
pub trait Probes {
    /// One probe of the verifier endpoint with a bounded timeout.
    fn verifier_reachable(&self) -> bool;

    /// Probe the stability target at a fixed interval for `window`;
    /// true only if every probe succeeds.
    fn network_stable_for(&self, window: Duration) -> bool;

    /// Whether the tier-specific root image is present. Tier 1 has no
    /// image; it is always present.
    fn tier_root_present(&self, tier: Tier) -> bool;

    /// Free bytes on the /var filesystem, `None` when unmeasurable.
    fn var_free_bytes(&self) -> Option<u64>;

    /// Available memory as a percentage of total, `None` when unmeasurable.
    fn mem_available_percent(&self) -> Option<u8>;

    /// IMA violations counter, `None` when not exposed.
    fn ima_violations(&self) -> Option<u64>;
}

/// Probes against the real system.
#[derive(Debug, Clone, Default)]
pub struct SystemProbes {
    config: ProbeConfig,
}

impl SystemProbes {
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    fn probe_endpoint(&self, addr: &str, timeout: Duration) -> bool {
        let resolved: Vec<SocketAddr> = match addr.to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(err) => {
                debug!(%addr, %err, "endpoint did not resolve");
                return false;
            }
        };
        for target in resolved {
            match TcpStream::connect_timeout(&target, timeout) {
                Ok(_) => return true,
                Err(err) => debug!(%target, %err, "probe failed"),
            }
        }
        false
    }
}

impl Probes for SystemProbes {
    fn verifier_reachable(&self) -> bool {
        self.probe_endpoint(&self.config.verifier_addr, self.config.verifier_timeout)
    }

    fn network_stable_for(&self, window: Duration) -> bool {
        let interval = self.config.stability_interval.max(Duration::from_millis(1));
        let mut remaining = window;
        loop {
            if !self.probe_endpoint(&self.config.stability_target, self.config.verifier_timeout) {
                return false;
            }
            if remaining.is_zero() {
                return true;
            }
            let step = interval.min(remaining);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }

    fn tier_root_present(&self, tier: Tier) -> bool {
        match tier {
            Tier::Minimal => true,
            Tier::Connected => self.config.tier2_root.exists(),
            Tier::Attested => self.config.tier3_root.exists(),
        }
    }

    fn var_free_bytes(&self) -> Option<u64> {
        let stats = nix::sys::statvfs::statvfs(&self.config.var_path).ok()?;
        Some(stats.blocks_available() as u64 * stats.fragment_size() as u64)
    }

    fn mem_available_percent(&self) -> Option<u8> {
        let content = std::fs::read_to_string(&self.config.meminfo_path).ok()?;
        let field = |name: &str| {
            content.lines().find_map(|line| {
                let rest = line.strip_prefix(name)?;
                rest.trim().split_whitespace().next()?.parse::<u64>().ok()
            })
        };
        let total = field("MemTotal:")?.max(1);
        let available = field("MemAvailable:").or_else(|| field("MemFree:"))?;
        Some((available * 100 / total).min(100) as u8)
    }

    fn ima_violations(&self) -> Option<u64> {
        std::fs::read_to_string(&self.config.ima_violations_path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

/// Deterministic probe double for tests.
///
/// Verifier answers replay from a queue (the last answer repeats once the
/// queue drains); everything else is a fixed value.
#[derive(Debug)]
pub struct ScriptedProbes {
    verifier_answers: RefCell<VecDeque<bool>>,
    last_verifier_answer: RefCell<bool>,
    pub network_stable: RefCell<bool>,
    pub tier2_root: bool,
    pub tier3_root: bool,
    pub var_free: Option<u64>,
    pub mem_percent: Option<u8>,
    pub ima: Option<u64>,
    verifier_calls: RefCell<u32>,
    stability_calls: RefCell<u32>,
}

impl Default for ScriptedProbes {
    fn default() -> Self {
        Self {
            verifier_answers: RefCell::new(VecDeque::new()),
            last_verifier_answer: RefCell::new(true),
            network_stable: RefCell::new(true),
            tier2_root: true,
            tier3_root: true,
            var_free: Some(1 << 30),
            mem_percent: Some(40),
            ima: Some(0),
            verifier_calls: RefCell::new(0),
            stability_calls: RefCell::new(0),
        }
    }
}

impl ScriptedProbes {
    /// A double where every probe succeeds.
    #[must_use]
    pub fn all_healthy() -> Self {
        Self::default()
    }

    /// Queue the next verifier answers.
    pub fn script_verifier(&self, answers: impl IntoIterator<Item = bool>) {
        self.verifier_answers.borrow_mut().extend(answers);
    }

    /// How many verifier probes ran.
    #[must_use]
    pub fn verifier_calls(&self) -> u32 {
        *self.verifier_calls.borrow()
    }

    /// How many stability windows ran.
    #[must_use]
    pub fn stability_calls(&self) -> u32 {
        *self.stability_calls.borrow()
    }
}

impl Probes for ScriptedProbes {
    fn verifier_reachable(&self) -> bool {
        *self.verifier_calls.borrow_mut() += 1;
        if let Some(answer) = self.verifier_answers.borrow_mut().pop_front() {
            *self.last_verifier_answer.borrow_mut() = answer;
        }
        *self.last_verifier_answer.borrow()
    }

    fn network_stable_for(&self, _window: Duration) -> bool {
        *self.stability_calls.borrow_mut() += 1;
        *self.network_stable.borrow()
    }

    fn tier_root_present(&self, tier: Tier) -> bool {
        match tier {
            Tier::Minimal => true,
            Tier::Connected => self.tier2_root,
            Tier::Attested => self.tier3_root,
        }
    }

    fn var_free_bytes(&self) -> Option<u64> {
        self.var_free
    }

    fn mem_available_percent(&self) -> Option<u8> {
        self.mem_percent
    }

    fn ima_violations(&self) -> Option<u64> {
        self.ima
    }
}
