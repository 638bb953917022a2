use thiserror::Error;

/// Primary error type for the boot controller stack.
///
/// Structured variants for the failure kinds the journal, probes, and tier
/// controllers can surface. Policy refusals are *not* errors; they travel
/// as reason codes inside tier decisions.
#[derive(Error, Debug)]
pub enum PacError {
    // === Journal / storage ===
    /// Underlying storage or filesystem failure during journal access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Short read from a storage backend.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Buffer length does not match the fixed record layout.
    #[error("bad journal layout: expected {expected} bytes, got {actual}")]
    BadLayout { expected: usize, actual: usize },

    /// Both journal pages failed validation.
    ///
    /// Recovered locally by rewriting a default record; callers only see
    /// this when reconstruction itself is impossible.
    #[error("journal corrupt: {detail}")]
    Corrupt { detail: String },

    // === Record manipulation ===
    /// A retry-budget operation was asked about a tier that has no budget.
    #[error("tier {tier} has no retry budget")]
    BadTier { tier: u8 },

    /// Unknown flag name on the administrative surface.
    #[error("unknown flag: {name}")]
    BadFlag { name: String },

    /// Tier value outside 1..=3 on the administrative surface.
    #[error("invalid tier: {value} (must be 1, 2, or 3)")]
    InvalidTier { value: String },

    // === Configuration ===
    /// Configuration file missing a required value or malformed.
    #[error("configuration error: {detail}")]
    Config { detail: String },

    // === External collaborators ===
    /// A probe exceeded its time bound.
    ///
    /// Equivalent to a `false` probe result for policy purposes; carried
    /// as an error only on surfaces that report probe health itself.
    #[error("probe timed out: {what}")]
    ProbeTimeout { what: String },

    /// The attestation procedure reported an error (distinct from a clean
    /// "fail" verdict, but decided identically).
    #[error("attestation error: {detail}")]
    AttestationError { detail: String },

    // === Terminal ===
    /// The journal path is unreachable and cannot be created. The only
    /// error that terminates the boot controller.
    #[error("fatal: {detail}")]
    Fatal { detail: String },

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Process exit codes for the administrative CLI surface.
///
/// 0 success, 1 bad arguments / recoverable failure, 2 I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    Usage = 1,
    Io = 2,
}

impl PacError {
    /// Map this error to a CLI exit code.
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::ShortRead { .. } | Self::Fatal { .. } => ExitCode::Io,
            Self::BadLayout { .. }
            | Self::Corrupt { .. }
            | Self::BadTier { .. }
            | Self::BadFlag { .. }
            | Self::InvalidTier { .. }
            | Self::Config { .. }
            | Self::ProbeTimeout { .. }
            | Self::AttestationError { .. }
            | Self::Internal(_) => ExitCode::Usage,
        }
    }

    /// Whether the boot controller may continue in its current tier after
    /// observing this error (everything except `Fatal`).
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal { .. })
    }

    /// Create a corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Create a fatal error.
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::Fatal {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `PacError`.
pub type Result<T> = std::result::Result<T, PacError>;
