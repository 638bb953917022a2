//! Health report model, oracle adapter, and collector.
//!
//! The policy stack consumes health as a snapshot loaded from a JSON report
//! on disk; the collector in this crate is the default producer of that
//! report. Producer and consumer meet only at the file, never in-process,
//! so staleness is real and detected via the report timestamp.

pub mod collector;
pub mod report;

pub use collector::{classify_score, CollectedReport, HealthClass, HealthCollector, HealthCollectorConfig};
pub use report::{FixedHealth, HealthOracle, HealthSnapshot, HealthSource};
