//! Indirect target predictor.
//!
//! Indirect branches (virtual dispatch, computed gotos) have data-dependent
//! targets the BTB alone resolves poorly. This predictor hashes the branch PC
//! with a per-thread path history register so the same branch can predict
//! different targets in different calling contexts. The path history is
//! speculative: every lookup snapshots it into an [`IndirectHistory`] token so
//! squashes and misprediction repairs can rebuild it.

use std::any::Any;
use std::fmt;

use crate::inst::BranchType;
use crate::pred::{InstSeqNum, ThreadId};

/// Opaque speculative state for one in-flight indirect lookup.
pub struct IndirectHistory(Box<dyn Any>);

impl IndirectHistory {
    /// Wraps predictor-private state into a token.
    pub fn new<S: 'static>(state: S) -> Self {
        Self(Box::new(state))
    }

    /// Unwraps the token, consuming it.
    ///
    /// # Panics
    ///
    /// Panics if the token was issued by a different predictor implementation.
    pub fn take<S: 'static>(self) -> S {
        *self
            .0
            .downcast::<S>()
            .unwrap_or_else(|_| panic!("indirect history token holds a foreign state type"))
    }

    /// Borrows the token's state mutably.
    ///
    /// # Panics
    ///
    /// Panics on a foreign state type, as with [`IndirectHistory::take`].
    pub fn state_mut<S: 'static>(&mut self) -> &mut S {
        self.0
            .downcast_mut::<S>()
            .unwrap_or_else(|| panic!("indirect history token holds a foreign state type"))
    }
}

impl fmt::Debug for IndirectHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IndirectHistory(..)")
    }
}

/// History-indexed oracle for indirect branch targets.
///
/// `lookup` allocates the per-inflight token. `update` is called for every
/// prediction the unit makes (so the path history tracks the speculative
/// stream) and again with `squashed = true` when a branch resolves
/// mispredicted. `commit` and `squash` release the token.
pub trait IndirectPredictor {
    /// Predicts the target of the indirect branch at `pc`, allocating
    /// speculative state into `history`.
    fn lookup(
        &mut self,
        tid: ThreadId,
        sn: InstSeqNum,
        pc: u64,
        history: &mut Option<IndirectHistory>,
    ) -> Option<u64>;

    /// Informs the predictor of a direction/target decision.
    ///
    /// With `squashed = false` this records the prediction-time decision.
    /// With `squashed = true` the branch resolved mispredicted: speculative
    /// state is rebuilt for the corrected target, which is also installed in
    /// the target table. The token stays in `history` either way.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        tid: ThreadId,
        sn: InstSeqNum,
        pc: u64,
        squashed: bool,
        taken: bool,
        target: u64,
        kind: BranchType,
        history: &mut Option<IndirectHistory>,
    );

    /// Releases the speculative state of a retiring branch.
    fn commit(&mut self, tid: ThreadId, sn: InstSeqNum, history: Option<IndirectHistory>);

    /// Rolls back and releases the speculative state of a wrong-path branch.
    fn squash(&mut self, tid: ThreadId, sn: InstSeqNum, history: Option<IndirectHistory>);
}

/// Token payload: the path history register before this branch folded in.
struct SimpleIndirectHistory {
    path_history: u64,
}

/// An entry in the indirect target table.
#[derive(Clone, Copy, Default)]
struct IndirectEntry {
    tid: ThreadId,
    tag: u64,
    target: u64,
    valid: bool,
}

/// Path-history indirect target predictor.
pub struct SimpleIndirectPredictor {
    /// Target table indexed by PC hashed with path history.
    table: Vec<IndirectEntry>,
    /// Per-thread speculative path history register.
    path_history: Vec<u64>,
    /// Table index mask (`entries - 1`).
    mask: u64,
    /// Instruction address shift applied before hashing.
    shift: u64,
}

impl SimpleIndirectPredictor {
    /// Creates an indirect predictor with `entries` target slots.
    pub fn new(entries: usize, num_threads: usize, shift: u64) -> Self {
        Self {
            table: vec![IndirectEntry::default(); entries],
            path_history: vec![0; num_threads],
            mask: entries as u64 - 1,
            shift,
        }
    }

    fn index(&self, path: u64, pc: u64) -> usize {
        (((pc >> self.shift) ^ path) & self.mask) as usize
    }

    /// Folds a taken branch's target into a path history value.
    fn fold(&self, path: u64, target: u64) -> u64 {
        ((path << 2) ^ (target >> self.shift)) & self.mask
    }
}

impl IndirectPredictor for SimpleIndirectPredictor {
    fn lookup(
        &mut self,
        tid: ThreadId,
        _sn: InstSeqNum,
        pc: u64,
        history: &mut Option<IndirectHistory>,
    ) -> Option<u64> {
        let path = self.path_history[tid];
        *history = Some(IndirectHistory::new(SimpleIndirectHistory {
            path_history: path,
        }));
        let entry = self.table[self.index(path, pc)];
        if entry.valid && entry.tid == tid && entry.tag == pc {
            Some(entry.target)
        } else {
            None
        }
    }

    fn update(
        &mut self,
        tid: ThreadId,
        _sn: InstSeqNum,
        pc: u64,
        squashed: bool,
        taken: bool,
        target: u64,
        _kind: BranchType,
        history: &mut Option<IndirectHistory>,
    ) {
        // Only branches that allocated a token perturb the path history;
        // everything else has no speculative state here to repair later.
        let Some(token) = history.as_mut() else {
            return;
        };
        let snapshot = token.state_mut::<SimpleIndirectHistory>().path_history;

        if squashed && taken {
            // Misprediction repair: install the resolved target under the
            // context the lookup actually used.
            let idx = self.index(snapshot, pc);
            self.table[idx] = IndirectEntry {
                tid,
                tag: pc,
                target,
                valid: true,
            };
        }

        self.path_history[tid] = if taken {
            self.fold(snapshot, target)
        } else {
            snapshot
        };
    }

    fn commit(&mut self, _tid: ThreadId, _sn: InstSeqNum, history: Option<IndirectHistory>) {
        if let Some(token) = history {
            token.take::<SimpleIndirectHistory>();
        }
    }

    fn squash(&mut self, tid: ThreadId, _sn: InstSeqNum, history: Option<IndirectHistory>) {
        if let Some(token) = history {
            let state = token.take::<SimpleIndirectHistory>();
            self.path_history[tid] = state.path_history;
        }
    }
}
