//! Branch prediction unit: the speculative-history coordinator.
//!
//! The unit weaves four sub-predictors (direction, BTB, indirect target, and
//! return address stack) into one prediction per fetched control-transfer,
//! and keeps their speculative state consistent afterwards. It provides:
//! 1. **Prediction:** `predict` produces a taken/not-taken decision and the
//!    next PC, and records one history entry per branch.
//! 2. **Commit:** `update` retires entries in order from the back of the
//!    queue and issues the single authoritative update to each sub-predictor.
//! 3. **Squash:** `squash` unwinds wrong-path entries from the front;
//!    `squash_mispredict` additionally repairs the mispredicted branch itself
//!    with the resolved direction and target.
//!
//! The unit is driven single-threaded by the simulator event loop; thread IDs
//! multiplex state, they do not imply concurrency.

use crate::config::BpuConfig;
use crate::inst::{BranchType, ControlInstPtr, Pc};
use crate::pred::btb::{SimpleBtb, TargetBuffer};
use crate::pred::direction::{self, DirectionPredictor};
use crate::pred::history::{HistoryEntry, ThreadHistory};
use crate::pred::indirect::{IndirectPredictor, SimpleIndirectPredictor};
use crate::pred::ras::{ReturnStack, SpecRas};
use crate::pred::{InstSeqNum, ThreadId};
use crate::probe::ProbePoint;
use crate::stats::BpuStats;

/// The branch prediction unit.
///
/// Owns the per-thread history queues and the attached sub-predictors. The
/// indirect predictor and the RAS are optional; without the former, indirect
/// branches fall back to the BTB, and without the latter, calls and returns
/// are predicted like any other branch.
pub struct BranchPredUnit {
    num_threads: usize,
    dir: Box<dyn DirectionPredictor>,
    btb: Box<dyn TargetBuffer>,
    ipred: Option<Box<dyn IndirectPredictor>>,
    ras: Option<Box<dyn ReturnStack>>,
    /// In-flight branch records, one queue per thread, youngest at the front.
    pred_hist: Vec<ThreadHistory>,
    /// Prediction statistics.
    pub stats: BpuStats,
    pp_branches: ProbePoint,
    pp_misses: ProbePoint,
    trace: bool,
}

impl BranchPredUnit {
    /// Builds a unit with the sub-predictors selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error for configs the structures cannot be
    /// built from.
    pub fn new(config: &BpuConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        let ipred: Option<Box<dyn IndirectPredictor>> = if config.indirect.enabled {
            Some(Box::new(SimpleIndirectPredictor::new(
                config.indirect.entries,
                config.num_threads,
                config.inst_shift_amt,
            )))
        } else {
            None
        };
        let ras: Option<Box<dyn ReturnStack>> = if config.ras.enabled {
            Some(Box::new(SpecRas::new(config.ras.depth, config.num_threads)))
        } else {
            None
        };
        Ok(Self::with_parts(
            config.num_threads,
            config.trace_branches,
            direction::from_config(config),
            Box::new(SimpleBtb::new(config.btb.entries, config.inst_shift_amt)),
            ipred,
            ras,
        ))
    }

    /// Builds a unit around caller-supplied sub-predictors.
    pub fn with_parts(
        num_threads: usize,
        trace: bool,
        dir: Box<dyn DirectionPredictor>,
        btb: Box<dyn TargetBuffer>,
        ipred: Option<Box<dyn IndirectPredictor>>,
        ras: Option<Box<dyn ReturnStack>>,
    ) -> Self {
        Self {
            num_threads,
            dir,
            btb,
            ipred,
            ras,
            pred_hist: (0..num_threads).map(|_| ThreadHistory::new()).collect(),
            stats: BpuStats::default(),
            pp_branches: ProbePoint::new("Branches"),
            pp_misses: ProbePoint::new("Misses"),
            trace,
        }
    }

    /// Attaches a listener to the "Branches" probe (fired once per prediction).
    pub fn connect_branches_probe(&mut self, listener: impl FnMut(u64) + 'static) {
        self.pp_branches.connect(listener);
    }

    /// Attaches a listener to the "Misses" probe (fired once per misprediction).
    pub fn connect_misses_probe(&mut self, listener: impl FnMut(u64) + 'static) {
        self.pp_misses.connect(listener);
    }

    /// Number of in-flight branch records for `tid`.
    pub fn history_depth(&self, tid: ThreadId) -> usize {
        self.pred_hist[tid].len()
    }

    /// Iterates `tid`'s in-flight records, youngest first.
    pub fn history(&self, tid: ThreadId) -> impl Iterator<Item = &HistoryEntry> {
        self.pred_hist[tid].iter()
    }

    /// Predicts the branch `inst` fetched at `*pc` with sequence number
    /// `seq_num`, and redirects `*pc` to the predicted next instruction.
    ///
    /// Returns the predicted taken decision. One history entry is appended to
    /// the thread's queue; the caller resolves it later through [`Self::update`]
    /// or one of the squash operations.
    pub fn predict(
        &mut self,
        inst: &ControlInstPtr,
        seq_num: InstSeqNum,
        pc: &mut Pc,
        tid: ThreadId,
    ) -> bool {
        debug_assert!(tid < self.num_threads);
        debug_assert!(
            inst.is_cond_ctrl() != inst.is_uncond_ctrl(),
            "control-transfer must be exactly one of conditional/unconditional"
        );

        self.stats.lookups += 1;
        self.pp_branches.notify(1);

        let branch_pc = pc.inst_addr();
        let mut target = *pc;

        let (mut pred_taken, bp_history) = if inst.is_uncond_ctrl() {
            if self.trace {
                eprintln!("BP  [tid:{tid}] [sn:{seq_num}] unconditional control at {branch_pc:#x}");
            }
            (true, self.dir.uncond_branch(tid, branch_pc))
        } else {
            self.stats.cond_predicted += 1;
            let (taken, history) = self.dir.lookup(tid, branch_pc);
            if self.trace {
                eprintln!(
                    "BP  [tid:{tid}] [sn:{seq_num}] direction predictor says taken={taken} for {branch_pc:#x}"
                );
            }
            (taken, history)
        };

        let mut entry = HistoryEntry::new(
            seq_num,
            branch_pc,
            pred_taken,
            Some(bp_history),
            None,
            tid,
            ControlInstPtr::clone(inst),
        );

        if pred_taken {
            // The RAS may be both popped and pushed to support coroutines.
            if inst.is_return() {
                if let Some(ras) = self.ras.as_mut() {
                    self.stats.ras_used += 1;
                    if let Some(return_addr) = ras.pop(tid, &mut entry.ras_history) {
                        target = Pc(return_addr);
                        if self.trace {
                            eprintln!(
                                "BP  [tid:{tid}] [sn:{seq_num}] return, RAS predicted {return_addr:#x}"
                            );
                        }
                    }
                }
            }

            if inst.is_call() {
                if let Some(ras) = self.ras.as_mut() {
                    let return_addr = inst.build_ret_pc(pc);
                    ras.push(tid, return_addr.inst_addr(), &mut entry.ras_history);
                    entry.pushed_ras = true;
                    if self.trace {
                        eprintln!(
                            "BP  [tid:{tid}] [sn:{seq_num}] call, pushed {:#x} onto the RAS",
                            return_addr.inst_addr()
                        );
                    }
                }
            }

            // The RAS covers returns; everything else predicted taken needs a
            // target from the BTB or the indirect predictor.
            if !inst.is_return() {
                if inst.is_direct_ctrl() || self.ipred.is_none() {
                    self.stats.btb_lookups += 1;
                    match self.btb.lookup(tid, branch_pc, BranchType::of(inst.as_ref())) {
                        Some(btb_target) => {
                            self.stats.btb_hits += 1;
                            target = Pc(btb_target);
                            if self.trace {
                                eprintln!(
                                    "BP  [tid:{tid}] [sn:{seq_num}] BTB target {btb_target:#x}"
                                );
                            }
                        }
                        None => {
                            // No target to redirect to: fall through not-taken.
                            pred_taken = false;
                            entry.pred_taken = false;
                            if !inst.is_call() && !inst.is_return() {
                                if let Some(history) = entry.bp_history.as_mut() {
                                    self.dir.btb_update(tid, branch_pc, history);
                                }
                            } else if inst.is_call() && !inst.is_uncond_ctrl() {
                                if let Some(ras_history) = entry.ras_history.take() {
                                    let ras = self
                                        .ras
                                        .as_mut()
                                        .expect("RAS undo state recorded with no RAS attached");
                                    ras.squash(tid, ras_history);
                                }
                                entry.pushed_ras = false;
                            }
                            inst.advance_pc(&mut target);
                        }
                    }
                } else if let Some(ipred) = self.ipred.as_mut() {
                    entry.was_indirect = true;
                    self.stats.indirect_lookups += 1;
                    match ipred.lookup(tid, seq_num, branch_pc, &mut entry.indirect_history) {
                        Some(indirect_target) => {
                            self.stats.indirect_hits += 1;
                            target = Pc(indirect_target);
                            if self.trace {
                                eprintln!(
                                    "BP  [tid:{tid}] [sn:{seq_num}] indirect target {indirect_target:#x}"
                                );
                            }
                        }
                        None => {
                            self.stats.indirect_misses += 1;
                            pred_taken = false;
                            entry.pred_taken = false;
                            if inst.is_call() && !inst.is_uncond_ctrl() {
                                if let Some(ras_history) = entry.ras_history.take() {
                                    let ras = self
                                        .ras
                                        .as_mut()
                                        .expect("RAS undo state recorded with no RAS attached");
                                    ras.squash(tid, ras_history);
                                }
                            }
                            inst.advance_pc(&mut target);
                        }
                    }
                }
            }
        } else {
            inst.advance_pc(&mut target);
        }

        entry.target = target.inst_addr();
        *pc = target;

        // The indirect predictor tracks the direction of every branch, BTB
        // paths included, so its path history follows the speculative stream.
        if let Some(ipred) = self.ipred.as_mut() {
            ipred.update(
                tid,
                seq_num,
                entry.pc,
                false,
                entry.pred_taken,
                entry.target,
                BranchType::of(inst.as_ref()),
                &mut entry.indirect_history,
            );
        }

        if let Some(front) = self.pred_hist[tid].front() {
            debug_assert!(
                front.seq_num < seq_num,
                "predictions must arrive in fetch order"
            );
        }
        self.pred_hist[tid].push_front(entry);
        if self.trace {
            eprintln!(
                "BP  [tid:{tid}] [sn:{seq_num}] history entry added, depth {}",
                self.pred_hist[tid].len()
            );
        }

        pred_taken
    }

    /// Commits every branch of `tid` with sequence number `<= done_sn`.
    ///
    /// Commit walks from the back of the queue, so retirement is in program
    /// order no matter how many mispredictions rewrote the front. Each retired
    /// entry issues the single authoritative update to the direction
    /// predictor and releases the indirect and RAS tokens.
    pub fn update(&mut self, done_sn: InstSeqNum, tid: ThreadId) {
        if self.trace {
            eprintln!("BP  [tid:{tid}] committing branches until [sn:{done_sn}]");
        }
        while self.pred_hist[tid]
            .back()
            .is_some_and(|entry| entry.seq_num <= done_sn)
        {
            let Some(mut entry) = self.pred_hist[tid].pop_back() else {
                break;
            };

            self.dir.update(
                tid,
                entry.pc,
                entry.pred_taken,
                &mut entry.bp_history,
                false,
                &entry.inst,
                entry.target,
            );

            if let Some(ipred) = self.ipred.as_mut() {
                ipred.commit(tid, entry.seq_num, entry.indirect_history.take());
            }

            match (self.ras.as_mut(), entry.ras_history.take()) {
                (Some(ras), ras_history) => ras.commit(
                    tid,
                    entry.mispredict,
                    BranchType::of(entry.inst.as_ref()),
                    ras_history,
                ),
                (None, Some(_)) => {
                    panic!("[tid:{tid}] [sn:{}] RAS undo state with no RAS attached", entry.seq_num)
                }
                (None, None) => {}
            }
        }
    }

    /// Unwinds every branch of `tid` younger than `squashed_sn`.
    ///
    /// This is the wrong-path flush: each popped entry hands its speculative
    /// tokens back to the owning sub-predictors, restoring their state to the
    /// point before the branch was predicted. Directions are not rewritten.
    pub fn squash(&mut self, squashed_sn: InstSeqNum, tid: ThreadId) {
        while self.pred_hist[tid]
            .front()
            .is_some_and(|entry| entry.seq_num > squashed_sn)
        {
            let Some(mut entry) = self.pred_hist[tid].pop_front() else {
                break;
            };
            if self.trace {
                eprintln!(
                    "BP  [tid:{tid}] [squash sn:{squashed_sn}] removing history [sn:{}] pc {:#x}",
                    entry.seq_num, entry.pc
                );
            }

            if let Some(ras_history) = entry.ras_history.take() {
                let ras = self
                    .ras
                    .as_mut()
                    .expect("RAS undo state recorded with no RAS attached");
                ras.squash(tid, ras_history);
            }

            if let Some(bp_history) = entry.bp_history.take() {
                self.dir.squash(tid, bp_history);
            }

            if let Some(ipred) = self.ipred.as_mut() {
                ipred.squash(tid, entry.seq_num, entry.indirect_history.take());
            }
        }
    }

    /// Resolves a misprediction: the branch `squashed_sn` of `tid` actually
    /// went `actually_taken` to `corr_target`.
    ///
    /// All younger entries are unwound as in [`Self::squash`]; the boundary
    /// entry itself is rewritten with the resolved direction and target and
    /// stays queued so commit later issues the authoritative update with the
    /// corrected values. Speculative direction and indirect state are repaired
    /// immediately, the RAS is fixed up for calls and returns whose
    /// prediction-time behavior no longer matches, and taken non-indirect
    /// branches install the resolved target in the BTB.
    ///
    /// # Panics
    ///
    /// Panics when the queue is non-empty after the flush but its youngest
    /// entry is not `squashed_sn`; the caller broke the resolution protocol.
    pub fn squash_mispredict(
        &mut self,
        squashed_sn: InstSeqNum,
        corr_target: Pc,
        actually_taken: bool,
        tid: ThreadId,
    ) {
        self.stats.cond_incorrect += 1;
        self.pp_misses.notify(1);

        if self.trace {
            eprintln!(
                "BP  [tid:{tid}] squashing from [sn:{squashed_sn}], corrected target {:#x}",
                corr_target.inst_addr()
            );
        }

        // Unwind everything younger than the mispredicted branch.
        self.squash(squashed_sn, tid);

        // A squash caused by a syscall may have no record of its own.
        let Some(mut entry) = self.pred_hist[tid].pop_front() else {
            if self.trace {
                eprintln!("BP  [tid:{tid}] [sn:{squashed_sn}] history empty, nothing to repair");
            }
            return;
        };
        if entry.seq_num != squashed_sn {
            panic!(
                "[tid:{tid}] misprediction squash [sn:{squashed_sn}] does not match youngest surviving record [sn:{}]",
                entry.seq_num
            );
        }

        if entry.ras_history.is_some() {
            self.stats.ras_incorrect += 1;
        }

        // Remember the resolved direction and target for the commit-time
        // update; the counter tables are deliberately untouched here.
        entry.pred_taken = actually_taken;
        entry.target = corr_target.inst_addr();
        entry.mispredict = true;

        self.dir.update(
            tid,
            entry.pc,
            actually_taken,
            &mut entry.bp_history,
            true,
            &entry.inst,
            corr_target.inst_addr(),
        );

        if let Some(ipred) = self.ipred.as_mut() {
            ipred.update(
                tid,
                squashed_sn,
                entry.pc,
                true,
                actually_taken,
                corr_target.inst_addr(),
                BranchType::of(entry.inst.as_ref()),
                &mut entry.indirect_history,
            );
        }

        if let Some(ras) = self.ras.as_mut() {
            if actually_taken && entry.ras_history.is_none() {
                // The prediction went not-taken, so the stack was never
                // touched. Replay what a taken prediction would have done.
                if entry.inst.is_return() {
                    if self.trace {
                        eprintln!(
                            "BP  [tid:{tid}] [sn:{squashed_sn}] mispredicted return, fixing RAS pop"
                        );
                    }
                    let _ = ras.pop(tid, &mut entry.ras_history);
                }
                if entry.inst.is_call() {
                    let return_addr = entry.inst.build_ret_pc(&corr_target);
                    if self.trace {
                        eprintln!(
                            "BP  [tid:{tid}] [sn:{squashed_sn}] mispredicted call, pushing {:#x}",
                            return_addr.inst_addr()
                        );
                    }
                    ras.push(tid, return_addr.inst_addr(), &mut entry.ras_history);
                }
            } else if !actually_taken {
                // The stack was mutated for a branch that did not go anywhere.
                if let Some(ras_history) = entry.ras_history.take() {
                    ras.squash(tid, ras_history);
                }
            }
        }

        if actually_taken {
            if entry.was_indirect {
                self.stats.indirect_mispredicted += 1;
            } else {
                self.stats.btb_updates += 1;
                self.btb.update(
                    tid,
                    entry.pc,
                    corr_target.inst_addr(),
                    BranchType::of(entry.inst.as_ref()),
                );
            }
        }

        self.pred_hist[tid].push_front(entry);
    }

    /// Asserts that no thread has outstanding speculative branches.
    ///
    /// Called when the surrounding pipeline quiesces; a non-empty queue at
    /// that point means a branch was never resolved.
    pub fn drain_sanity_check(&self) {
        for (tid, history) in self.pred_hist.iter().enumerate() {
            assert!(
                history.is_empty(),
                "[tid:{tid}] {} speculative branches outstanding at drain",
                history.len()
            );
        }
    }

    /// Prints every non-empty history queue, youngest entry first.
    pub fn dump(&self) {
        for (tid, history) in self.pred_hist.iter().enumerate() {
            if history.is_empty() {
                continue;
            }
            println!("pred_hist[{tid}].len(): {}", history.len());
            for entry in history {
                println!(
                    "  sn:{} pc:{:#x} predTaken:{} target:{:#x} mispredict:{} indirect:{}",
                    entry.seq_num,
                    entry.pc,
                    entry.pred_taken,
                    entry.target,
                    entry.mispredict,
                    entry.was_indirect
                );
            }
        }
    }
}
