//! Promotion and degradation guards.
//!
//! Both entry points are total functions over their inputs: the journal
//! record, a health snapshot, the probe facade, and (for degradation) the
//! monitor's sticky-counter context passed in as a value. No I/O happens
//! here except through the probe facade, and every outcome carries a
//! reason code, so decisions are observable and replayable.
//!
//! Tie-breaks: degradation wins over promotion within one evaluation pass
//! (callers check [`must_degrade`] first). Inside degradation the first
//! failing guard in evaluation order is the primary reason; the other
//! failing guards ride along as secondary codes. A guard refusal never
//! costs a retry: budgets decrement only when an attempted promotion
//! fails.

mod config;

pub use config::PolicyConfig;

use pac_health::HealthSnapshot;
use pac_probe::Probes;
use pac_types::{BootFlags, BootRecord, ReasonCode, Tier};
use tracing::debug;

/// Which thresholds apply: the boot-time ladder or the monitor's
/// steady-state pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    Boot,
    Runtime,
}

/// Monitor-owned sticky state entering the degradation guards as a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradeContext {
    /// Tier-3 grace elapsed; no degradation check runs before it has.
    pub grace_elapsed: bool,
    /// Consecutive failed verifier reachability probes.
    pub verifier_fail_streak: u32,
    /// The attestation-sanity re-attempt also failed.
    pub sanity_attest_failed: bool,
    /// Consecutive polls with health below the Tier-2 threshold.
    pub low_health_streak: u32,
}

/// A fired degradation: primary reason plus every other failing guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    pub reason: ReasonCode,
    pub secondary: Vec<ReasonCode>,
}

impl Degradation {
    fn from_failures(mut failures: Vec<ReasonCode>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            let reason = failures.remove(0);
            Some(Self {
                reason,
                secondary: failures,
            })
        }
    }
}

/// Should the boot controller short-circuit INIT into EMERGENCY?
#[must_use]
pub fn emergency_on_init(cfg: &PolicyConfig, rec: &BootRecord) -> Option<ReasonCode> {
    if rec.flags.contains(BootFlags::EMERGENCY) {
        return Some(ReasonCode::Quarantined);
    }
    if cfg.emergency_on_exhaustion && rec.tries_t2 == 0 {
        return Some(ReasonCode::RetriesExhausted);
    }
    None
}

/// Evaluate the promotion guards for `from` → `to`.
///
/// `Ok(())` only when every guard holds; otherwise the first failing
/// guard's reason, in evaluation order.
pub fn may_promote<P: Probes>(
    cfg: &PolicyConfig,
    rec: &BootRecord,
    health: &HealthSnapshot,
    probes: &P,
    from: Tier,
    to: Tier,
    phase: EvalPhase,
) -> std::result::Result<(), ReasonCode> {
    let result = match (from, to) {
        (Tier::Minimal, Tier::Connected) => promote_t1_t2(cfg, rec, health, probes),
        (Tier::Connected, Tier::Attested) => promote_t2_t3(cfg, rec, health, probes, phase),
        // The ladder has no other rungs.
        _ => Err(ReasonCode::TierRootMissing),
    };
    if let Err(reason) = result {
        debug!(%from, %to, %reason, "promotion refused");
    }
    result
}

fn promote_t1_t2<P: Probes>(
    cfg: &PolicyConfig,
    rec: &BootRecord,
    health: &HealthSnapshot,
    probes: &P,
) -> std::result::Result<(), ReasonCode> {
    if rec.tries_t2 == 0 {
        return Err(ReasonCode::RetriesExhausted);
    }
    if rec.flags.contains(BootFlags::QUARANTINE) {
        return Err(ReasonCode::Quarantined);
    }
    if rec.flags.contains(BootFlags::BROWNOUT)
        && rec.flags.brownout_boots() <= cfg.brownout_cooldown()
    {
        return Err(ReasonCode::BrownoutCooldown);
    }
    if !probes.tier_root_present(Tier::Connected) {
        return Err(ReasonCode::TierRootMissing);
    }
    if health.score() < cfg.t2_score_min {
        return Err(ReasonCode::HealthBelowThreshold);
    }
    if !health.check("memory") {
        return Err(ReasonCode::MemoryCritical);
    }
    if !health.check("storage") {
        return Err(ReasonCode::DiskCritical);
    }
    Ok(())
}

fn promote_t2_t3<P: Probes>(
    cfg: &PolicyConfig,
    rec: &BootRecord,
    health: &HealthSnapshot,
    probes: &P,
    phase: EvalPhase,
) -> std::result::Result<(), ReasonCode> {
    if rec.tries_exhausted(Tier::Attested) {
        return Err(ReasonCode::RetriesExhausted);
    }
    // Quarantine forbids promotion outright, whatever the numeric budget.
    if rec.flags.contains(BootFlags::QUARANTINE) {
        return Err(ReasonCode::Quarantined);
    }
    if !probes.tier_root_present(Tier::Attested) {
        return Err(ReasonCode::TierRootMissing);
    }
    let threshold = match phase {
        EvalPhase::Boot => cfg.t3_score_min,
        EvalPhase::Runtime => cfg.t3_runtime_score_min,
    };
    if health.score() < threshold {
        return Err(ReasonCode::HealthBelowThreshold);
    }
    if !probes.verifier_reachable() {
        return Err(ReasonCode::VerifierUnreachable);
    }
    if !probes.network_stable_for(cfg.network_stability_window()) {
        return Err(ReasonCode::NetworkUnstable);
    }
    Ok(())
}

/// Evaluate the degradation guards at tier `at`.
///
/// `Some` iff at least one guard holds; the primary reason is the first
/// failing guard in evaluation order, with the rest attached as secondary
/// codes.
pub fn must_degrade<P: Probes>(
    cfg: &PolicyConfig,
    rec: &BootRecord,
    health: &HealthSnapshot,
    probes: &P,
    at: Tier,
    ctx: &DegradeContext,
) -> Option<Degradation> {
    let degradation = match at {
        Tier::Attested => degrade_at_t3(cfg, rec, health, probes, ctx),
        Tier::Connected => degrade_at_t2(cfg, health, probes, ctx),
        Tier::Minimal => None,
    };
    if let Some(degradation) = &degradation {
        debug!(%at, reason = %degradation.reason, "degradation guard fired");
    }
    degradation
}

fn degrade_at_t3<P: Probes>(
    cfg: &PolicyConfig,
    rec: &BootRecord,
    health: &HealthSnapshot,
    probes: &P,
    ctx: &DegradeContext,
) -> Option<Degradation> {
    if !ctx.grace_elapsed {
        return None;
    }
    let mut failures = Vec::new();

    if health.score() < cfg.t3_runtime_score_min {
        failures.push(ReasonCode::HealthBelowThreshold);
    }

    // NETWORK_GATED makes a single probe failure a trigger; otherwise the
    // streak must reach the threshold and the sanity re-attempt must have
    // failed too.
    let verifier_down = if rec.flags.contains(BootFlags::NETWORK_GATED) {
        ctx.verifier_fail_streak >= 1
    } else {
        ctx.verifier_fail_streak >= cfg.verifier_fail_threshold && ctx.sanity_attest_failed
    };
    if verifier_down {
        failures.push(ReasonCode::VerifierUnreachable);
    }

    if probes.ima_violations().unwrap_or(0) > 0 {
        failures.push(ReasonCode::ImaViolation);
    }
    if let Some(free) = probes.var_free_bytes() {
        if free < cfg.var_min_free_t3 {
            failures.push(ReasonCode::DiskCritical);
        }
    }
    if let Some(percent) = probes.mem_available_percent() {
        if percent < cfg.mem_min_percent_t3 {
            failures.push(ReasonCode::MemoryCritical);
        }
    }
    if rec.flags.contains(BootFlags::BROWNOUT) {
        failures.push(ReasonCode::BrownoutCooldown);
    }

    Degradation::from_failures(failures)
}

fn degrade_at_t2<P: Probes>(
    cfg: &PolicyConfig,
    health: &HealthSnapshot,
    probes: &P,
    ctx: &DegradeContext,
) -> Option<Degradation> {
    let mut failures = Vec::new();

    if health.score() < cfg.t2_score_min && ctx.low_health_streak >= cfg.low_health_threshold {
        failures.push(ReasonCode::HealthBelowThreshold);
    }
    if let Some(free) = probes.var_free_bytes() {
        if free < cfg.var_min_free_t2 {
            failures.push(ReasonCode::DiskCritical);
        }
    }
    if let Some(percent) = probes.mem_available_percent() {
        if percent < cfg.mem_min_percent_t2 {
            failures.push(ReasonCode::MemoryCritical);
        }
    }

    Degradation::from_failures(failures)
}
