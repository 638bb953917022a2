//! The boot-time tier ladder.
//!
//! One pass per boot: read the journal, advance the boot ordinal, then
//! climb 1 → 2 → 3 as far as the guards, the mounts, and the attestation
//! verdict allow. Every achieved rung is committed before the next is
//! attempted, so the journal always reflects the last decision when the
//! next boot (or the monitor) reads it.
//!
//! Nothing here terminates the process except a `Fatal` journal path;
//! every other failure maps to "stay in the safest admissible tier".

use pac_error::Result;
use pac_health::{HealthSnapshot, HealthSource};
use pac_journal::{Journal, Storage};
use pac_policy::{emergency_on_init, may_promote, EvalPhase, PolicyConfig};
use pac_probe::Probes;
use pac_types::{BootFlags, BootRecord, ReasonCode, Tier};
use tracing::{info, warn};

use crate::actions::TierActions;
use crate::attest::{AttestOutcome, Attestor};

/// Ladder states. `Tier1`, `Tier2`, `Tier3`, and `Emergency` are terminal
/// within one boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Init,
    Tier1,
    PromoteT2,
    Tier2,
    PromoteT3,
    Tier3,
    Emergency,
}

impl BootState {
    /// The tier a terminal state runs at.
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self {
            Self::Tier3 => Tier::Attested,
            Self::Tier2 | Self::PromoteT3 => Tier::Connected,
            _ => Tier::Minimal,
        }
    }
}

/// What a boot pass produced.
#[derive(Debug)]
pub struct BootOutcome {
    /// Terminal ladder state.
    pub state: BootState,
    /// The record as last committed.
    pub record: BootRecord,
    /// Every promotion the guards refused, for operators.
    pub refusals: Vec<(Tier, ReasonCode)>,
}

/// Drives one boot pass over the shared journal contract.
pub struct BootController<'a, S, H, P, A, T>
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
}

impl<'a, S, H, P, A, T> BootController<'a, S, H, P, A, T>
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
        }
    }

    /// A snapshot the guards may trust: stale reports degrade to absent.
    fn fresh_health(&self, now_epoch: u64) -> HealthSnapshot {
        let snapshot = self.health.snapshot();
        if snapshot.is_fresh(self.cfg.health_max_age(), now_epoch) {
            snapshot
        } else {
            if snapshot.is_present() {
                warn!("health report stale, treating as absent");
            }
            HealthSnapshot::absent()
        }
    }

    /// Execute one pass of the tier ladder.
    pub fn run_boot_pass(&mut self, now_epoch: u64) -> Result<BootOutcome> {
        let mut rec = self.journal.read()?;
        let mut refusals = Vec::new();

        // Boot ordinal first, in its own committed write. A boot under
        // BROWNOUT also advances the persisted cooldown counter here.
        if rec.flags.contains(BootFlags::BROWNOUT) {
            rec.flags = rec.flags.tick_brownout_boots();
        }
        self.journal.increment_boot_count(&mut rec)?;

        if let Some(reason) = emergency_on_init(self.cfg, &rec) {
            warn!(%reason, "entering emergency tier");
            rec.flags.insert(BootFlags::EMERGENCY | BootFlags::QUARANTINE);
            rec.tier = Tier::Minimal;
            self.journal.write(&mut rec)?;
            return Ok(BootOutcome {
                state: BootState::Emergency,
                record: rec,
                refusals,
            });
        }

        let health = self.fresh_health(now_epoch);

        // Rung 1 -> 2.
        if let Err(reason) = may_promote(
            self.cfg,
            &rec,
            &health,
            self.probes,
            Tier::Minimal,
            Tier::Connected,
            EvalPhase::Boot,
        ) {
            info!(%reason, "holding tier 1");
            refusals.push((Tier::Connected, reason));
            rec.tier = Tier::Minimal;
            self.journal.write(&mut rec)?;
            return Ok(BootOutcome {
                state: BootState::Tier1,
                record: rec,
                refusals,
            });
        }

        // Guards passed: commit tier 2, then perform the external actions.
        // An attempted-and-failed promotion costs a retry; a guard refusal
        // above did not.
        rec.tier = Tier::Connected;
        rec.flags.remove(BootFlags::DIRTY);
        if rec.flags.contains(BootFlags::BROWNOUT) {
            // Cooldown elapsed, or the guard would have refused.
            rec.flags = rec.flags.clear_brownout();
        }
        self.journal.write(&mut rec)?;

        let climb = self
            .actions
            .setup_network()
            .and_then(|()| self.actions.mount_tier_root(Tier::Connected));
        if let Err(err) = climb {
            warn!(%err, "tier 2 bring-up failed, falling back to tier 1");
            rec.decrement_tries(Tier::Connected)?;
            rec.tier = Tier::Minimal;
            rec.flags.insert(BootFlags::DIRTY);
            self.journal.write(&mut rec)?;
            return Ok(BootOutcome {
                state: BootState::Tier1,
                record: rec,
                refusals,
            });
        }
        info!("tier 2 reached");

        // Rung 2 -> 3.
        if let Err(reason) = may_promote(
            self.cfg,
            &rec,
            &health,
            self.probes,
            Tier::Connected,
            Tier::Attested,
            EvalPhase::Boot,
        ) {
            info!(%reason, "holding tier 2");
            refusals.push((Tier::Attested, reason));
            return Ok(BootOutcome {
                state: BootState::Tier2,
                record: rec,
                refusals,
            });
        }

        let verdict = self.attestor.attest();
        if !verdict.passed() {
            match verdict {
                AttestOutcome::Error => warn!("attestation procedure error, treated as failure"),
                _ => info!("attestation failed"),
            }
            rec.decrement_tries(Tier::Attested)?;
            self.journal.write(&mut rec)?;
            refusals.push((Tier::Attested, ReasonCode::AttestationFailed));
            return Ok(BootOutcome {
                state: BootState::Tier2,
                record: rec,
                refusals,
            });
        }

        if let Err(err) = self.actions.mount_tier_root(Tier::Attested) {
            warn!(%err, "tier 3 root mount failed, staying at tier 2");
            rec.decrement_tries(Tier::Attested)?;
            self.journal.write(&mut rec)?;
            refusals.push((Tier::Attested, ReasonCode::TierRootMissing));
            return Ok(BootOutcome {
                state: BootState::Tier2,
                record: rec,
                refusals,
            });
        }

        rec.tier = Tier::Attested;
        self.journal.write(&mut rec)?;
        info!("tier 3 reached");
        Ok(BootOutcome {
            state: BootState::Tier3,
            record: rec,
            refusals,
        })
    }
}
