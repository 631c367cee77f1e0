//! Branch prediction subsystem.
//!
//! This module contains the branch prediction unit and the sub-predictors it
//! coordinates: direction predictors (bimodal, gshare), the branch target
//! buffer, the indirect target predictor, and the return address stack. Each
//! sub-predictor sits behind a narrow trait so the simulator can swap
//! implementations at construction time.

pub use self::unit::BranchPredUnit;

/// Branch Target Buffer trait and direct-mapped implementation.
pub mod btb;

/// Direction predictor trait and implementations.
pub mod direction;

/// Per-branch history records and per-thread queues.
pub mod history;

/// Indirect target predictor trait and implementation.
pub mod indirect;

/// Speculative return address stack with undo tokens.
pub mod ras;

/// The coordinator driving all sub-predictors.
pub mod unit;

/// Fetch-order sequence number; unique per in-flight instruction of a thread.
pub type InstSeqNum = u64;

/// Hardware thread index, `0 <= tid < num_threads`.
pub type ThreadId = usize;
