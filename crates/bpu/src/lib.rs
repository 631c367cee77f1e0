//! Speculative branch prediction unit for a cycle-accurate CPU model.
//!
//! This crate implements the fetch-side branch prediction subsystem with the following:
//! 1. **Coordination:** A per-thread speculative history protocol that keeps the
//!    direction predictor, BTB, indirect predictor, and return address stack
//!    consistent across out-of-order mispredictions and pipeline flushes.
//! 2. **Predictors:** Bimodal and gshare direction predictors, a direct-mapped
//!    BTB, a path-history indirect target predictor, and a speculative RAS.
//! 3. **Configuration:** Hierarchical serde config with per-structure defaults.
//! 4. **Observability:** Prediction statistics, probe points, and state dumps.

/// Unit configuration (defaults, selector enums, validation).
pub mod config;
/// Control-transfer instruction contract, program counter, branch classification.
pub mod inst;
/// Prediction subsystem (coordinator, history records, sub-predictors).
pub mod pred;
/// Named probe points for PMU-style event listeners.
pub mod probe;
/// Prediction statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `BpuConfig::default()` or deserialize from JSON.
pub use crate::config::BpuConfig;
/// The branch prediction unit; drives all sub-predictors from fetch/commit events.
pub use crate::pred::BranchPredUnit;
/// Counter aggregate for prediction statistics.
pub use crate::stats::BpuStats;
