//! Boot status flag algebra.
//!
//! The journal's `flags` field is a u32 bitset. Bits 0..=4 are the named
//! administrative flags; bits 8..=10 hold a small saturating counter of
//! boots observed with BROWNOUT set, so the brownout cooldown survives
//! power cycles without widening the record layout.

use pac_error::{PacError, Result};

bitflags::bitflags! {
    /// Named boot status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BootFlags: u32 {
        /// Remain in Tier 1; never auto-cleared.
        const EMERGENCY = 1 << 0;
        /// Retry budgets count as exhausted; promotion forbidden.
        const QUARANTINE = 1 << 1;
        /// Promotion forbidden until the cooldown elapses.
        const BROWNOUT = 1 << 2;
        /// Last shutdown was not clean; cleared by the first successful
        /// Tier-1 to Tier-2 promotion.
        const DIRTY = 1 << 3;
        /// Tier 3 requires a verified stable network; a single probe
        /// failure becomes a degradation trigger.
        const NETWORK_GATED = 1 << 4;

        // Keep unknown bits (including the cooldown counter) intact when
        // manipulating named flags.
        const _ = !0;
    }
}

/// Mask and shift of the brownout cooldown counter inside the flags word.
const BROWNOUT_BOOTS_SHIFT: u32 = 8;
const BROWNOUT_BOOTS_MASK: u32 = 0b111 << BROWNOUT_BOOTS_SHIFT;

/// Largest representable brownout cooldown (counter saturates here).
pub const BROWNOUT_BOOTS_MAX: u8 = 0b111;

impl BootFlags {
    /// Boots observed with BROWNOUT set since the flag was raised.
    #[must_use]
    pub const fn brownout_boots(self) -> u8 {
        ((self.bits() & BROWNOUT_BOOTS_MASK) >> BROWNOUT_BOOTS_SHIFT) as u8
    }

    /// Record one more boot under BROWNOUT, saturating.
    #[must_use]
    pub const fn tick_brownout_boots(self) -> Self {
        let count = self.brownout_boots();
        let next = if count >= BROWNOUT_BOOTS_MAX {
            BROWNOUT_BOOTS_MAX
        } else {
            count + 1
        };
        let cleared = self.bits() & !BROWNOUT_BOOTS_MASK;
        Self::from_bits_retain(cleared | ((next as u32) << BROWNOUT_BOOTS_SHIFT))
    }

    /// Drop the BROWNOUT flag together with its boot counter.
    #[must_use]
    pub const fn clear_brownout(self) -> Self {
        Self::from_bits_retain(self.bits() & !(Self::BROWNOUT.bits() | BROWNOUT_BOOTS_MASK))
    }

    /// Parse an administrative flag name.
    pub fn parse_name(name: &str) -> Result<Self> {
        match name {
            "emergency" => Ok(Self::EMERGENCY),
            "quarantine" => Ok(Self::QUARANTINE),
            "brownout" => Ok(Self::BROWNOUT),
            "dirty" => Ok(Self::DIRTY),
            "network_gated" => Ok(Self::NETWORK_GATED),
            _ => Err(PacError::BadFlag {
                name: name.to_owned(),
            }),
        }
    }

    /// Render the set named flags for display, e.g. `EMERGENCY DIRTY`.
    #[must_use]
    pub fn describe(self) -> String {
        let mut names = Vec::new();
        if self.contains(Self::EMERGENCY) {
            names.push("EMERGENCY");
        }
        if self.contains(Self::QUARANTINE) {
            names.push("QUARANTINE");
        }
        if self.contains(Self::BROWNOUT) {
            names.push("BROWNOUT");
        }
        if self.contains(Self::DIRTY) {
            names.push("DIRTY");
        }
        if self.contains(Self::NETWORK_GATED) {
            names.push("NETWORK_GATED");
        }
        names.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_test() {
        let mut flags = BootFlags::default();
        assert!(!flags.contains(BootFlags::EMERGENCY));
        flags.insert(BootFlags::EMERGENCY);
        assert!(flags.contains(BootFlags::EMERGENCY));
        flags.remove(BootFlags::EMERGENCY);
        assert!(!flags.contains(BootFlags::EMERGENCY));
    }

    #[test]
    fn set_is_idempotent() {
        let mut flags = BootFlags::default();
        flags.insert(BootFlags::QUARANTINE);
        let once = flags;
        flags.insert(BootFlags::QUARANTINE);
        assert_eq!(flags, once);
    }

    #[test]
    fn clear_set_clear_equals_clear() {
        let mut a = BootFlags::default();
        a.remove(BootFlags::DIRTY);
        let cleared = a;

        let mut b = BootFlags::default();
        b.remove(BootFlags::DIRTY);
        b.insert(BootFlags::DIRTY);
        b.remove(BootFlags::DIRTY);
        assert_eq!(b, cleared);
    }

    #[test]
    fn brownout_counter_saturates() {
        let mut flags = BootFlags::BROWNOUT;
        for _ in 0..20 {
            flags = flags.tick_brownout_boots();
        }
        assert_eq!(flags.brownout_boots(), BROWNOUT_BOOTS_MAX);
        assert!(flags.contains(BootFlags::BROWNOUT));
    }

    #[test]
    fn brownout_counter_does_not_disturb_named_flags() {
        let flags = (BootFlags::BROWNOUT | BootFlags::DIRTY).tick_brownout_boots();
        assert!(flags.contains(BootFlags::BROWNOUT));
        assert!(flags.contains(BootFlags::DIRTY));
        assert_eq!(flags.brownout_boots(), 1);
    }

    #[test]
    fn clear_brownout_drops_counter() {
        let flags = BootFlags::BROWNOUT
            .tick_brownout_boots()
            .tick_brownout_boots()
            .clear_brownout();
        assert!(!flags.contains(BootFlags::BROWNOUT));
        assert_eq!(flags.brownout_boots(), 0);
    }

    #[test]
    fn named_flag_ops_preserve_counter_bits() {
        let mut flags = BootFlags::BROWNOUT.tick_brownout_boots();
        flags.insert(BootFlags::DIRTY);
        flags.remove(BootFlags::DIRTY);
        assert_eq!(flags.brownout_boots(), 1);
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            BootFlags::parse_name("emergency").expect("known flag"),
            BootFlags::EMERGENCY
        );
        assert_eq!(
            BootFlags::parse_name("network_gated").expect("known flag"),
            BootFlags::NETWORK_GATED
        );
        assert!(BootFlags::parse_name("bogus").is_err());
    }

    #[test]
    fn describe_lists_set_flags() {
        let flags = BootFlags::EMERGENCY | BootFlags::QUARANTINE;
        assert_eq!(flags.describe(), "EMERGENCY QUARANTINE");
        assert_eq!(BootFlags::default().describe(), "");
    }
}
