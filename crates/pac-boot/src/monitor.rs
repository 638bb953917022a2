//! The runtime monitor.
//!
//! A long-running loop started once a boot terminates at Tier 2 or 3.
//! Each tick is sequential: re-read the journal, collect health, evaluate
//! degradation then promotion, act, sleep. Ticks never overlap, nothing
//! inside a tick terminates the loop, and every committed tier change is
//! followed by a tier-apply (reboot) request so the matching root is
//! mounted from scratch.
//!
//! Sticky counters live here, in memory, reset when the monitor starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pac_error::Result;
use pac_health::{HealthSnapshot, HealthSource};
use pac_journal::{Journal, Storage};
use pac_policy::{may_promote, must_degrade, DegradeContext, EvalPhase, PolicyConfig};
use pac_probe::Probes;
use pac_types::{BootFlags, ReasonCode, Tier, TierDecision};
use tracing::{info, warn};

use crate::actions::TierActions;
use crate::attest::Attestor;

/// Sleep granularity; a termination signal is honored within one chunk.
const SLEEP_CHUNK: Duration = Duration::from_millis(500);

/// Cooldown multiplier applied while the EMERGENCY flag is set.
const EMERGENCY_COOLDOWN_TICKS: u32 = 30;

/// What one tick concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// EMERGENCY flag set; the loop backs off for a long cooldown.
    EmergencyHold,
    /// Tier-3 grace period still running; checks suppressed.
    Grace,
    /// Nothing to do.
    Steady,
    /// Promotion was refused or failed; holding the current tier.
    Stayed { at: Tier, reason: ReasonCode },
    /// A tier change was committed and a reboot requested.
    TierChanged { decision: TierDecision },
}

/// The runtime monitor loop.
pub struct Monitor<'a, S, H, P, A, T>
where
    S: Storage,
    H: HealthSource,
    P: Probes,
    A: Attestor,
    T: TierActions,
{
    cfg: &'a PolicyConfig,
    journal: &'a mut Journal<S>,
    health: &'a H,
    probes: &'a P,
    attestor: &'a mut A,
    actions: &'a mut T,
    verifier_fail_streak: u32,
    low_health_streak: u32,
    grace_started: Option<u64>,
}

impl<'a, S, H, P, A, T> Monitor<'a, S, H, P, A, T>
where
    S: Storage,
    H: HealthSource,
    P: Probes,
    A: Attestor,
    T: TierActions,
{
    pub fn new(
        cfg: &'a PolicyConfig,
        journal: &'a mut Journal<S>,
        health: &'a H,
        probes: &'a P,
        attestor: &'a mut A,
        actions: &'a mut T,
    ) -> Self {
        Self {
            cfg,
            journal,
            health,
            probes,
            attestor,
            actions,
            verifier_fail_streak: 0,
            low_health_streak: 0,
            grace_started: None,
        }
    }

    /// Consecutive failed verifier probes (test observability).
    #[must_use]
    pub const fn verifier_fail_streak(&self) -> u32 {
        self.verifier_fail_streak
    }

    fn fresh_health(&self, now_epoch: u64) -> HealthSnapshot {
        let snapshot = self.health.snapshot();
        if snapshot.is_fresh(self.cfg.health_max_age(), now_epoch) {
            snapshot
        } else {
            HealthSnapshot::absent()
        }
    }

    /// Track the Tier-3 grace window. Clock skew (now behind the recorded
    /// start) resets the timer rather than degrading.
    fn grace_elapsed(&mut self, tier: Tier, now_epoch: u64) -> bool {
        if tier != Tier::Attested {
            self.grace_started = None;
            return true;
        }
        let started = match self.grace_started {
            Some(started) if now_epoch >= started => started,
            _ => {
                self.grace_started = Some(now_epoch);
                now_epoch
            }
        };
        now_epoch.saturating_sub(started) >= self.cfg.t3_grace_secs
    }

    /// One tick: read, evaluate, act.
    pub fn tick(&mut self, now_epoch: u64) -> Result<TickOutcome> {
        let mut rec = self.journal.read()?;

        if rec.flags.contains(BootFlags::EMERGENCY) {
            return Ok(TickOutcome::EmergencyHold);
        }

        let health = self.fresh_health(now_epoch);
        let tier = rec.tier;
        let grace_elapsed = self.grace_elapsed(tier, now_epoch);

        // Sticky counters ahead of the guard pass.
        if tier == Tier::Attested {
            if self.probes.verifier_reachable() {
                self.verifier_fail_streak = 0;
            } else {
                self.verifier_fail_streak += 1;
            }
        }
        if tier == Tier::Connected {
            if health.score() < self.cfg.t2_score_min {
                self.low_health_streak += 1;
            } else {
                self.low_health_streak = 0;
            }
        }

        // The sanity re-attempt runs only once the streak crosses the
        // threshold; its verdict feeds the degradation guard.
        let mut sanity_attest_failed = false;
        if tier == Tier::Attested
            && grace_elapsed
            && self.verifier_fail_streak >= self.cfg.verifier_fail_threshold
            && !rec.flags.contains(BootFlags::NETWORK_GATED)
        {
            sanity_attest_failed = !self.attestor.attest().passed();
            if !sanity_attest_failed {
                info!("attestation sanity passed, clearing verifier streak");
                self.verifier_fail_streak = 0;
            }
        }

        let ctx = DegradeContext {
            grace_elapsed,
            verifier_fail_streak: self.verifier_fail_streak,
            sanity_attest_failed,
            low_health_streak: self.low_health_streak,
        };

        // Degradation wins over promotion within one pass.
        if let Some(degradation) =
            must_degrade(self.cfg, &rec, &health, self.probes, tier, &ctx)
        {
            let target = tier.below().unwrap_or(Tier::Minimal);
            warn!(
                from = %tier,
                to = %target,
                reason = %degradation.reason,
                "degrading"
            );
            rec.tier = target;
            self.journal.write(&mut rec)?;
            self.actions.request_reboot(target)?;
            let decision = TierDecision::Demote {
                from: tier,
                to: target,
                reason: degradation.reason,
                secondary: degradation.secondary,
            };
            self.verifier_fail_streak = 0;
            self.low_health_streak = 0;
            self.grace_started = None;
            return Ok(TickOutcome::TierChanged { decision });
        }

        if tier == Tier::Attested && !grace_elapsed {
            return Ok(TickOutcome::Grace);
        }

        // Promotion.
        let Some(target) = tier.next() else {
            return Ok(TickOutcome::Steady);
        };
        if let Err(reason) = may_promote(
            self.cfg,
            &rec,
            &health,
            self.probes,
            tier,
            target,
            EvalPhase::Runtime,
        ) {
            return Ok(TickOutcome::Stayed { at: tier, reason });
        }

        match target {
            Tier::Connected => {
                if let Err(err) = self.actions.setup_network() {
                    warn!(%err, "network setup failed, staying at tier 1");
                    rec.decrement_tries(Tier::Connected)?;
                    self.journal.write(&mut rec)?;
                    return Ok(TickOutcome::Stayed {
                        at: tier,
                        reason: ReasonCode::NetworkUnstable,
                    });
                }
            }
            Tier::Attested => {
                if !self.attestor.attest().passed() {
                    info!("attestation failed, staying at tier 2");
                    rec.decrement_tries(Tier::Attested)?;
                    self.journal.write(&mut rec)?;
                    return Ok(TickOutcome::Stayed {
                        at: tier,
                        reason: ReasonCode::AttestationFailed,
                    });
                }
            }
            Tier::Minimal => {}
        }

        info!(from = %tier, to = %target, "promoting");
        rec.tier = target;
        if target == Tier::Connected {
            rec.flags.remove(BootFlags::DIRTY);
            if rec.flags.contains(BootFlags::BROWNOUT) {
                rec.flags = rec.flags.clear_brownout();
            }
        }
        self.journal.write(&mut rec)?;
        self.actions.request_reboot(target)?;
        Ok(TickOutcome::TierChanged {
            decision: TierDecision::Promote { to: target },
        })
    }

    /// Run ticks on the configured period until `stop` is raised. The
    /// current tick always completes; the sleep is chunked so shutdown
    /// latency stays bounded.
    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());

            let outcome = self.tick(now);
            let sleep_for = match &outcome {
                Ok(TickOutcome::EmergencyHold) => {
                    self.cfg.monitor_interval() * EMERGENCY_COOLDOWN_TICKS
                }
                Ok(TickOutcome::TierChanged { .. }) => {
                    // The reboot request is in flight; stop evaluating.
                    info!("tier change committed, awaiting tier-apply");
                    self.cfg.monitor_interval()
                }
                Ok(_) => self.cfg.monitor_interval(),
                Err(err) => {
                    // Nothing inside a tick may kill the monitor.
                    warn!(%err, "monitor tick failed");
                    self.cfg.monitor_interval()
                }
            };

            let mut remaining = sleep_for;
            while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
                let chunk = SLEEP_CHUNK.min(remaining);
                std::thread::sleep(chunk);
                remaining = remaining.saturating_sub(chunk);
            }
        }
        info!("monitor stopping after completed tick");
    }
}
