//! Per-branch prediction history records.
//!
//! Every predicted control-transfer leaves one [`HistoryEntry`] in its
//! thread's history queue. The entry carries everything needed to finish the
//! branch later: the predicted direction and target for the authoritative
//! predictor update at commit, and the speculative-history tokens of each
//! sub-predictor for rollback at squash. Entries live from prediction until
//! exactly one of commit or squash consumes them.

use std::collections::VecDeque;

use crate::inst::ControlInstPtr;
use crate::pred::direction::DirectionHistory;
use crate::pred::indirect::IndirectHistory;
use crate::pred::ras::RasHistory;
use crate::pred::{InstSeqNum, ThreadId};

/// Bookkeeping for one in-flight predicted branch.
pub struct HistoryEntry {
    /// Fetch sequence number of the branch.
    pub seq_num: InstSeqNum,
    /// Address of the branch instruction.
    pub pc: u64,
    /// Current belief about the direction; rewritten on misprediction.
    pub pred_taken: bool,
    /// Predicted (or corrected) target address.
    pub target: u64,
    /// Thread the entry belongs to.
    pub tid: ThreadId,
    /// Set once a misprediction squash corrected this entry.
    pub mispredict: bool,
    /// True if the indirect predictor, not the BTB, supplied the target.
    pub was_indirect: bool,
    /// True if a call push went through and was not rolled back at predict time.
    pub pushed_ras: bool,
    /// Direction predictor speculative state.
    pub bp_history: Option<DirectionHistory>,
    /// Indirect predictor speculative state.
    pub indirect_history: Option<IndirectHistory>,
    /// RAS undo state; present iff the stack was mutated for this branch.
    pub ras_history: Option<RasHistory>,
    /// The branch instruction, re-consulted at commit and squash.
    pub inst: ControlInstPtr,
}

impl HistoryEntry {
    /// Creates a record for a freshly predicted branch.
    ///
    /// Target, RAS state, and the resolution flags are filled in by the
    /// prediction path as it consults the target predictors.
    pub fn new(
        seq_num: InstSeqNum,
        pc: u64,
        pred_taken: bool,
        bp_history: Option<DirectionHistory>,
        indirect_history: Option<IndirectHistory>,
        tid: ThreadId,
        inst: ControlInstPtr,
    ) -> Self {
        Self {
            seq_num,
            pc,
            pred_taken,
            target: 0,
            tid,
            mispredict: false,
            was_indirect: false,
            pushed_ras: false,
            bp_history,
            indirect_history,
            ras_history: None,
            inst,
        }
    }
}

/// One thread's in-flight branches, youngest at the front.
///
/// Sequence numbers decrease strictly from front to back: predictions push
/// the front, commits pop the back, squashes pop the front.
pub type ThreadHistory = VecDeque<HistoryEntry>;
