//! Direction predictor interface and implementations.
//!
//! A direction predictor answers taken/not-taken for conditional branches and
//! owns whatever speculative history that answer perturbed. The unit never
//! looks inside that state: each lookup hands back an opaque
//! [`DirectionHistory`] token, and the token is returned to the predictor
//! exactly once, released at commit or rolled back at squash.

use std::any::Any;
use std::fmt;

use crate::config::{BpuConfig, DirectionKind};
use crate::inst::ControlInstPtr;
use crate::pred::ThreadId;

/// Per-PC 2-bit counter direction predictor.
pub mod bimodal;

/// Global-history direction predictor (gshare algorithm).
pub mod gshare;

pub use self::bimodal::BimodalPredictor;
pub use self::gshare::GSharePredictor;

/// Opaque speculative state for one in-flight branch.
///
/// Owned by the history record between prediction and resolution; the unit
/// only moves it. The concrete payload type belongs to the predictor that
/// issued the token, and handing a token back to a different predictor is a
/// fatal protocol breach.
pub struct DirectionHistory(Box<dyn Any>);

impl DirectionHistory {
    /// Wraps predictor-private state into a token.
    pub fn new<S: 'static>(state: S) -> Self {
        Self(Box::new(state))
    }

    /// Unwraps the token, consuming it.
    ///
    /// # Panics
    ///
    /// Panics if the token was issued by a predictor with a different state
    /// type, which is a wiring bug in the surrounding simulator.
    pub fn take<S: 'static>(self) -> S {
        *self
            .0
            .downcast::<S>()
            .unwrap_or_else(|_| panic!("direction history token holds a foreign state type"))
    }

    /// Borrows the token's state mutably.
    ///
    /// # Panics
    ///
    /// Panics on a foreign state type, as with [`DirectionHistory::take`].
    pub fn state_mut<S: 'static>(&mut self) -> &mut S {
        self.0
            .downcast_mut::<S>()
            .unwrap_or_else(|| panic!("direction history token holds a foreign state type"))
    }
}

impl fmt::Debug for DirectionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirectionHistory(..)")
    }
}

/// Taken/not-taken oracle consulted once per fetched control-transfer.
///
/// Every lookup allocates speculative state; `update` with `squashed = false`
/// is the single authoritative training call and releases the token, while
/// `squashed = true` repairs speculative history after a misprediction and
/// carries the token through to the eventual commit.
pub trait DirectionPredictor {
    /// Predicts the direction of the conditional branch at `pc`.
    fn lookup(&mut self, tid: ThreadId, pc: u64) -> (bool, DirectionHistory);

    /// Records an unconditional control transfer at `pc`.
    ///
    /// Unconditional branches are not predicted, but history-based
    /// predictors still account for them in their speculative state.
    fn uncond_branch(&mut self, tid: ThreadId, pc: u64) -> DirectionHistory;

    /// Corrects speculative state after the BTB overrode a taken prediction
    /// to not-taken.
    fn btb_update(&mut self, tid: ThreadId, pc: u64, history: &mut DirectionHistory);

    /// Resolves a branch.
    ///
    /// With `squashed = false` this is the commit-time training call: counter
    /// tables change and the token in `history` is consumed. With
    /// `squashed = true` the branch was just found mispredicted: only
    /// speculative history is rewritten to the corrected direction, tables
    /// are untouched, and the token stays in `history` for the later commit.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        tid: ThreadId,
        pc: u64,
        taken: bool,
        history: &mut Option<DirectionHistory>,
        squashed: bool,
        inst: &ControlInstPtr,
        target: u64,
    );

    /// Rolls back and releases the speculative state of a wrong-path branch.
    fn squash(&mut self, tid: ThreadId, history: DirectionHistory);
}

/// Builds the configured direction predictor.
pub fn from_config(config: &BpuConfig) -> Box<dyn DirectionPredictor> {
    match config.direction {
        DirectionKind::Bimodal => Box::new(BimodalPredictor::new(
            config.bimodal.entries,
            config.inst_shift_amt,
        )),
        DirectionKind::GShare => Box::new(GSharePredictor::new(
            config.gshare.entries,
            config.num_threads,
            config.inst_shift_amt,
        )),
    }
}
