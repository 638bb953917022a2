//! Attestation facade.
//!
//! The nonce, TPM quote, and token layout live in an external procedure;
//! the controllers only consume its verdict. An `Error` verdict decides
//! exactly like `Fail` but is logged distinctly.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Command;

use tracing::{error, warn};

/// Verdict of one attestation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestOutcome {
    Pass,
    Fail,
    /// The procedure itself misbehaved (could not run, crashed).
    Error,
}

impl AttestOutcome {
    /// Whether this verdict permits Tier 3.
    #[must_use]
    pub const fn passed(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// The external attestation procedure.
pub trait Attestor {
    fn attest(&mut self) -> AttestOutcome;
}

/// Runs a configured external program; exit 0 is a pass, any other exit is
/// a fail, and failure to run at all is an error.
#[derive(Debug, Clone)]
pub struct CommandAttestor {
    program: PathBuf,
}

impl CommandAttestor {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Attestor for CommandAttestor {
    fn attest(&mut self) -> AttestOutcome {
        match Command::new(&self.program).status() {
            Ok(status) if status.success() => AttestOutcome::Pass,
            Ok(status) => {
                warn!(program = %self.program.display(), %status, "attestation failed");
                AttestOutcome::Fail
            }
            Err(err) => {
                error!(program = %self.program.display(), %err, "attestation procedure error");
                AttestOutcome::Error
            }
        }
    }
}

/// Deterministic attestor for tests: replays queued verdicts, then repeats
/// the default.
#[derive(Debug)]
pub struct ScriptedAttestor {
    queued: VecDeque<AttestOutcome>,
    default: AttestOutcome,
    calls: u32,
}

impl ScriptedAttestor {
    #[must_use]
    pub fn always(outcome: AttestOutcome) -> Self {
        Self {
            queued: VecDeque::new(),
            default: outcome,
            calls: 0,
        }
    }

    /// Queue verdicts ahead of the default.
    pub fn script(&mut self, outcomes: impl IntoIterator<Item = AttestOutcome>) {
        self.queued.extend(outcomes);
    }

    /// Attestation attempts observed so far.
    #[must_use]
    pub const fn calls(&self) -> u32 {
        self.calls
    }
}

impl Attestor for ScriptedAttestor {
    fn attest(&mut self) -> AttestOutcome {
        self.calls += 1;
        self.queued.pop_front().unwrap_or(self.default)
    }
}
