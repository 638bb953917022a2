//! The boot record: the journal's payload.

use pac_error::{PacError, Result};

use crate::flags::BootFlags;
use crate::Tier;

/// Current record layout version.
pub const JOURNAL_VERSION: u32 = 1;

/// Initial Tier-2 promotion budget.
pub const DEFAULT_TRIES_T2: u8 = 3;

/// Initial Tier-3 promotion budget.
pub const DEFAULT_TRIES_T3: u8 = 3;

/// Durable boot-controller state, one copy per journal page.
///
/// Mutated only through the journal store's read-modify-write cycle, which
/// refreshes `timestamp` and the checksum on every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRecord {
    /// Layout version; always [`JOURNAL_VERSION`].
    pub version: u32,
    /// Committed tier.
    pub tier: Tier,
    /// Remaining Tier-2 promotion attempts.
    pub tries_t2: u8,
    /// Remaining Tier-3 promotion attempts.
    pub tries_t3: u8,
    /// Monotonic anti-rollback counter.
    pub rollback_idx: u8,
    /// Status flag bitset.
    pub flags: BootFlags,
    /// Monotonically increasing boot ordinal.
    pub boot_count: u64,
    /// Seconds since epoch of the last journal write.
    pub timestamp: u64,
}

impl Default for BootRecord {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            tier: Tier::Minimal,
            tries_t2: DEFAULT_TRIES_T2,
            tries_t3: DEFAULT_TRIES_T3,
            rollback_idx: 0,
            flags: BootFlags::default(),
            boot_count: 0,
            timestamp: 0,
        }
    }
}

impl BootRecord {
    /// Decrement the promotion budget for `tier`, saturating at zero.
    ///
    /// Returns the remaining budget. Only tiers 2 and 3 carry budgets.
    pub fn decrement_tries(&mut self, tier: Tier) -> Result<u8> {
        match tier {
            Tier::Connected => {
                self.tries_t2 = self.tries_t2.saturating_sub(1);
                Ok(self.tries_t2)
            }
            Tier::Attested => {
                self.tries_t3 = self.tries_t3.saturating_sub(1);
                Ok(self.tries_t3)
            }
            Tier::Minimal => Err(PacError::BadTier {
                tier: tier.as_u8(),
            }),
        }
    }

    /// Restore both promotion budgets to their defaults.
    pub fn reset_tries(&mut self) {
        self.tries_t2 = DEFAULT_TRIES_T2;
        self.tries_t3 = DEFAULT_TRIES_T3;
    }

    /// Whether the promotion budget for `tier` is spent.
    ///
    /// Tier 2 also counts as exhausted under QUARANTINE, regardless of the
    /// numeric budget.
    #[must_use]
    pub fn tries_exhausted(&self, tier: Tier) -> bool {
        match tier {
            Tier::Connected => self.tries_t2 == 0 || self.flags.contains(BootFlags::QUARANTINE),
            Tier::Attested => self.tries_t3 == 0,
            Tier::Minimal => false,
        }
    }

    /// Advance the boot ordinal, saturating at `u64::MAX`.
    ///
    /// Returns false when the counter was already saturated.
    pub fn increment_boot_count(&mut self) -> bool {
        match self.boot_count.checked_add(1) {
            Some(next) => {
                self.boot_count = next;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Display for BootRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Boot Record ===")?;
        writeln!(f, "  Version:       {}", self.version)?;
        writeln!(f, "  Tier:          {}", self.tier)?;
        writeln!(f, "  Tries T2:      {}", self.tries_t2)?;
        writeln!(f, "  Tries T3:      {}", self.tries_t3)?;
        writeln!(f, "  Rollback IDX:  {}", self.rollback_idx)?;
        write!(f, "  Flags:         {:#010x}", self.flags.bits())?;
        let names = self.flags.describe();
        if names.is_empty() {
            writeln!(f)?;
        } else {
            writeln!(f, " ({names})")?;
        }
        writeln!(f, "  Boot Count:    {}", self.boot_count)?;
        writeln!(f, "  Timestamp:     {}", self.timestamp)?;
        write!(f, "===================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_initial_journal_state() {
        let rec = BootRecord::default();
        assert_eq!(rec.version, JOURNAL_VERSION);
        assert_eq!(rec.tier, Tier::Minimal);
        assert_eq!(rec.tries_t2, DEFAULT_TRIES_T2);
        assert_eq!(rec.tries_t3, DEFAULT_TRIES_T3);
        assert_eq!(rec.boot_count, 0);
        assert!(rec.flags.is_empty());
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let mut rec = BootRecord::default();
        for _ in 0..10 {
            rec.decrement_tries(Tier::Connected).expect("tier 2 has a budget");
        }
        assert_eq!(rec.tries_t2, 0);
        assert_eq!(
            rec.decrement_tries(Tier::Connected).expect("still valid"),
            0
        );
    }

    #[test]
    fn decrement_rejects_tier_one() {
        let mut rec = BootRecord::default();
        assert!(matches!(
            rec.decrement_tries(Tier::Minimal),
            Err(PacError::BadTier { tier: 1 })
        ));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut rec = BootRecord::default();
        rec.tries_t2 = 0;
        rec.tries_t3 = 1;
        rec.reset_tries();
        let once = rec;
        rec.reset_tries();
        assert_eq!(rec, once);
        assert_eq!(rec.tries_t2, DEFAULT_TRIES_T2);
        assert_eq!(rec.tries_t3, DEFAULT_TRIES_T3);
    }

    #[test]
    fn quarantine_exhausts_tier_two_budget() {
        let mut rec = BootRecord::default();
        assert!(!rec.tries_exhausted(Tier::Connected));
        rec.flags.insert(BootFlags::QUARANTINE);
        assert!(rec.tries_exhausted(Tier::Connected));
        // Tier 3 exhaustion is purely numeric.
        assert!(!rec.tries_exhausted(Tier::Attested));
    }

    #[test]
    fn boot_count_saturates() {
        let mut rec = BootRecord::default();
        assert!(rec.increment_boot_count());
        assert_eq!(rec.boot_count, 1);

        rec.boot_count = u64::MAX;
        assert!(!rec.increment_boot_count());
        assert_eq!(rec.boot_count, u64::MAX);
    }

    #[test]
    fn display_names_flags() {
        let mut rec = BootRecord::default();
        rec.flags.insert(BootFlags::EMERGENCY | BootFlags::DIRTY);
        let rendered = rec.to_string();
        assert!(rendered.contains("EMERGENCY DIRTY"));
        assert!(rendered.contains("Tier:          1"));
    }
}
