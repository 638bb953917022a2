//! Progressive attestation boot controller.
//!
//! Re-exports the public surface of the workspace crates:
//!
//! - [`journal`]: the crash-safe double-page boot journal
//! - [`policy`]: promotion and degradation guards
//! - [`boot`]: the boot-time tier ladder and the runtime monitor
//! - [`health`]: health report model, oracle, and collector
//! - [`probe`]: the external probe facade
//!
//! # Example
//!
//! ```
//! use pac::journal::Journal;
//! use pac::types::Tier;
//!
//! let mut journal = Journal::open_in_memory().expect("fresh journal");
//! let mut rec = journal.read().expect("recovered record");
//! assert_eq!(rec.tier, Tier::Minimal);
//!
//! rec.tier = Tier::Connected;
//! journal.write(&mut rec).expect("committed");
//! assert_eq!(journal.read().expect("recovered").tier, Tier::Connected);
//! ```

pub use pac_boot as boot;
pub use pac_error as error;
pub use pac_health as health;
pub use pac_journal as journal;
pub use pac_policy as policy;
pub use pac_probe as probe;
pub use pac_types as types;

pub use pac_error::{PacError, Result};
pub use pac_types::{BootFlags, BootRecord, ReasonCode, Tier, TierDecision};
