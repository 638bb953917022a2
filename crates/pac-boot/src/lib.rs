//! Boot-time tier ladder and runtime monitor.
//!
//! Both controllers share one contract: the journal is ground truth. The
//! boot controller climbs the ladder once per boot and commits what it
//! achieves; the monitor re-evaluates promotion and degradation on a fixed
//! period and follows every committed tier change with a tier-apply
//! (reboot) request. They never run concurrently and never call each
//! other.

pub mod actions;
pub mod attest;
pub mod controller;
pub mod monitor;

pub use actions::{CommandActions, RecordingActions, TierActions};
pub use attest::{AttestOutcome, Attestor, CommandAttestor, ScriptedAttestor};
pub use controller::{BootController, BootOutcome, BootState};
pub use monitor::{Monitor, TickOutcome};
