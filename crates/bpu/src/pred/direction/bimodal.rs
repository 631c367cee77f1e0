//! Bimodal direction predictor.
//!
//! One 2-bit saturating counter per (hashed) PC, shared across threads. The
//! bimodal scheme keeps no cross-branch history, so its speculative tokens
//! carry no undo state; squashing one is a pure release.

use super::{DirectionHistory, DirectionPredictor};
use crate::inst::ControlInstPtr;
use crate::pred::ThreadId;

/// Token payload: the bimodal predictor has nothing to roll back.
struct BimodalHistory;

/// Bimodal predictor structure.
pub struct BimodalPredictor {
    /// 2-bit saturating counters, indexed by shifted PC.
    pht: Vec<u8>,
    /// Table index mask (`entries - 1`).
    index_mask: u64,
    /// Instruction address shift applied before indexing.
    shift: u64,
}

impl BimodalPredictor {
    /// Creates a bimodal predictor with `entries` counters.
    ///
    /// Counters start weakly not-taken.
    pub fn new(entries: usize, shift: u64) -> Self {
        Self {
            pht: vec![1; entries],
            index_mask: entries as u64 - 1,
            shift,
        }
    }

    fn index(&self, pc: u64) -> usize {
        ((pc >> self.shift) & self.index_mask) as usize
    }
}

impl DirectionPredictor for BimodalPredictor {
    fn lookup(&mut self, _tid: ThreadId, pc: u64) -> (bool, DirectionHistory) {
        let taken = self.pht[self.index(pc)] >= 2;
        (taken, DirectionHistory::new(BimodalHistory))
    }

    fn uncond_branch(&mut self, _tid: ThreadId, _pc: u64) -> DirectionHistory {
        DirectionHistory::new(BimodalHistory)
    }

    fn btb_update(&mut self, _tid: ThreadId, _pc: u64, history: &mut DirectionHistory) {
        // No speculative history to correct.
        let _ = history.state_mut::<BimodalHistory>();
    }

    fn update(
        &mut self,
        _tid: ThreadId,
        pc: u64,
        taken: bool,
        history: &mut Option<DirectionHistory>,
        squashed: bool,
        _inst: &ControlInstPtr,
        _target: u64,
    ) {
        if squashed {
            // Nothing speculative to restore; the token stays with the
            // record until commit.
            return;
        }
        if let Some(token) = history.take() {
            token.take::<BimodalHistory>();
        }
        let idx = self.index(pc);
        let counter = self.pht[idx];
        if taken && counter < 3 {
            self.pht[idx] = counter + 1;
        } else if !taken && counter > 0 {
            self.pht[idx] = counter - 1;
        }
    }

    fn squash(&mut self, _tid: ThreadId, history: DirectionHistory) {
        history.take::<BimodalHistory>();
    }
}
