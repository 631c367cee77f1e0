//! GShare direction predictor.
//!
//! GShare correlates a per-thread global history register with the program
//! counter using an XOR hash. The history register is updated speculatively
//! at lookup time, so every token snapshots the pre-lookup register: a squash
//! restores the snapshot, and a misprediction repair re-derives the register
//! from the snapshot plus the corrected direction.

use super::{DirectionHistory, DirectionPredictor};
use crate::inst::ControlInstPtr;
use crate::pred::ThreadId;

/// Token payload: the global history register before this branch shifted in.
struct GShareHistory {
    global_history: u64,
}

/// GShare predictor structure.
pub struct GSharePredictor {
    /// Pattern history table of 2-bit saturating counters, shared across threads.
    pht: Vec<u8>,
    /// Per-thread speculative global history register.
    global_history: Vec<u64>,
    /// Index and history mask (`entries - 1`).
    mask: u64,
    /// Instruction address shift applied before hashing.
    shift: u64,
}

impl GSharePredictor {
    /// Creates a gshare predictor with `entries` counters.
    pub fn new(entries: usize, num_threads: usize, shift: u64) -> Self {
        Self {
            pht: vec![1; entries],
            global_history: vec![0; num_threads],
            mask: entries as u64 - 1,
            shift,
        }
    }

    /// XOR of the shifted PC and a history register value, masked to the table.
    fn index(&self, history: u64, pc: u64) -> usize {
        (((pc >> self.shift) ^ history) & self.mask) as usize
    }

    fn shift_in(&self, history: u64, taken: bool) -> u64 {
        ((history << 1) | u64::from(taken)) & self.mask
    }
}

impl DirectionPredictor for GSharePredictor {
    fn lookup(&mut self, tid: ThreadId, pc: u64) -> (bool, DirectionHistory) {
        let snapshot = self.global_history[tid];
        let taken = self.pht[self.index(snapshot, pc)] >= 2;
        // Shift the prediction in speculatively; squash restores the snapshot.
        self.global_history[tid] = self.shift_in(snapshot, taken);
        (
            taken,
            DirectionHistory::new(GShareHistory {
                global_history: snapshot,
            }),
        )
    }

    fn uncond_branch(&mut self, tid: ThreadId, _pc: u64) -> DirectionHistory {
        let snapshot = self.global_history[tid];
        self.global_history[tid] = self.shift_in(snapshot, true);
        DirectionHistory::new(GShareHistory {
            global_history: snapshot,
        })
    }

    fn btb_update(&mut self, tid: ThreadId, _pc: u64, history: &mut DirectionHistory) {
        // The taken prediction was overridden to not-taken; rewrite the
        // youngest speculative bit to match.
        let state = history.state_mut::<GShareHistory>();
        self.global_history[tid] = self.shift_in(state.global_history, false);
    }

    fn update(
        &mut self,
        tid: ThreadId,
        pc: u64,
        taken: bool,
        history: &mut Option<DirectionHistory>,
        squashed: bool,
        _inst: &ControlInstPtr,
        _target: u64,
    ) {
        if squashed {
            // Misprediction repair: rebuild the speculative register from the
            // snapshot and the resolved direction. Counters train at commit.
            if let Some(token) = history.as_mut() {
                let snapshot = token.state_mut::<GShareHistory>().global_history;
                self.global_history[tid] = self.shift_in(snapshot, taken);
            }
            return;
        }
        if let Some(token) = history.take() {
            let state = token.take::<GShareHistory>();
            let idx = self.index(state.global_history, pc);
            let counter = self.pht[idx];
            if taken && counter < 3 {
                self.pht[idx] = counter + 1;
            } else if !taken && counter > 0 {
                self.pht[idx] = counter - 1;
            }
        }
    }

    fn squash(&mut self, tid: ThreadId, history: DirectionHistory) {
        let state = history.take::<GShareHistory>();
        self.global_history[tid] = state.global_history;
    }
}
