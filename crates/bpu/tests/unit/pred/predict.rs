//! Prediction Path Tests.
//!
//! Verifies the per-branch prediction protocol: direction consultation,
//! target selection through BTB / RAS / indirect predictor, the not-taken
//! overrides on target misses, and the bookkeeping recorded for later
//! resolution.

use std::cell::Cell;
use std::rc::Rc;

use bpu_core::inst::Pc;
use bpu_core::pred::direction::DirectionHistory;
use bpu_core::pred::BranchPredUnit;

use crate::common::harness::counting_unit;
use crate::common::insts::*;
use crate::common::mocks::{MockBtb, MockDirection};

// ══════════════════════════════════════════════════════════
// 1. Direction handling
// ══════════════════════════════════════════════════════════

#[test]
fn not_taken_advances_sequentially() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_direction(false);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&cond_branch(), 1, &mut pc, 0);

    assert!(!taken);
    assert_eq!(pc, Pc(0x1000 + INST_SIZE));
    assert_eq!(unit.history_depth(0), 1);
    assert_eq!(unit.stats.lookups, 1);
    assert_eq!(unit.stats.cond_predicted, 1);
    assert_eq!(unit.stats.btb_lookups, 0, "not-taken skips the BTB");
}

#[test]
fn uncond_jump_skips_direction_prediction() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_btb(0, 0x1000, 0x2000);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&direct_jump(), 1, &mut pc, 0);

    assert!(taken);
    assert_eq!(pc, Pc(0x2000));
    assert_eq!(unit.stats.cond_predicted, 0);
    assert_eq!(unit.stats.btb_hits, 1);
}

#[test]
fn taken_conditional_uses_btb_target() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_direction(true);
    bench.set_btb(0, 0x1000, 0x3000);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&cond_branch(), 1, &mut pc, 0);

    assert!(taken);
    assert_eq!(pc, Pc(0x3000));
    let front = unit.history(0).next().unwrap();
    assert!(front.pred_taken);
    assert_eq!(front.target, 0x3000);
    assert!(!front.was_indirect);
}

// ══════════════════════════════════════════════════════════
// 2. BTB miss overrides
// ══════════════════════════════════════════════════════════

#[test]
fn btb_miss_overrides_to_not_taken() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_direction(true);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&cond_branch(), 1, &mut pc, 0);

    assert!(!taken, "no target to redirect to");
    assert_eq!(pc, Pc(0x1000 + INST_SIZE));
    let front = unit.history(0).next().unwrap();
    assert!(!front.pred_taken);
    assert_eq!(unit.stats.btb_lookups, 1);
    assert_eq!(unit.stats.btb_hits, 0);
    assert_eq!(
        bench.ledger.borrow().dir_btb_updates,
        1,
        "plain branches correct the direction predictor on a BTB miss"
    );
}

#[test]
fn btb_miss_on_cond_call_undoes_the_push() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_direction(true);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&cond_call(), 1, &mut pc, 0);

    assert!(!taken);
    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.ras_pushes, 1);
    assert_eq!(ledger.ras_squashes, 1, "the speculative push is rolled back");
    assert_eq!(ledger.ras_live, 0);
    assert_eq!(ledger.dir_btb_updates, 0, "calls skip the direction correction");
    let front = unit.history(0).next().unwrap();
    assert!(!front.pushed_ras);
    assert!(front.ras_history.is_none());
}

#[test]
fn btb_miss_on_uncond_call_keeps_the_push() {
    let (mut unit, _bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    let taken = unit.predict(&direct_call(), 1, &mut pc, 0);

    assert!(!taken, "miss still overrides the direction");
    let front = unit.history(0).next().unwrap();
    assert!(front.pushed_ras, "only conditional calls roll the push back");
    assert!(front.ras_history.is_some());
}

// ══════════════════════════════════════════════════════════
// 3. RAS: calls and returns
// ══════════════════════════════════════════════════════════

#[test]
fn call_then_return_round_trip() {
    let (mut unit, bench) = counting_unit(1, false, true);
    bench.set_btb(0, 0x3000, 0x4000);

    let mut pc = Pc(0x3000);
    assert!(unit.predict(&direct_call(), 1, &mut pc, 0));
    assert_eq!(pc, Pc(0x4000));

    let mut pc = Pc(0x4040);
    assert!(unit.predict(&uncond_return(), 2, &mut pc, 0));
    assert_eq!(pc, Pc(0x3000 + INST_SIZE), "return address from the call");

    assert_eq!(unit.stats.ras_used, 1);
    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.ras_pushes, 1);
    assert_eq!(ledger.ras_pops, 1);
}

#[test]
fn return_with_empty_ras_keeps_current_pc() {
    let (mut unit, bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x5000);
    let taken = unit.predict(&uncond_return(), 1, &mut pc, 0);

    assert!(taken, "an empty stack does not force not-taken");
    assert_eq!(pc, Pc(0x5000), "no address to adopt");
    assert_eq!(unit.stats.ras_used, 1);
    let front = unit.history(0).next().unwrap();
    assert!(front.ras_history.is_none(), "nothing was popped");
    assert_eq!(bench.ledger.borrow().ras_live, 0);
}

#[test]
fn return_without_ras_keeps_pc_and_skips_btb() {
    // Returns never consult the BTB, so with no RAS attached there is no
    // target source at all and the PC stays put.
    let (mut unit, _bench) = counting_unit(1, false, false);

    let mut pc = Pc(0x5000);
    let taken = unit.predict(&uncond_return(), 1, &mut pc, 0);

    assert!(taken);
    assert_eq!(pc, Pc(0x5000));
    assert_eq!(unit.stats.ras_used, 0, "no RAS attached, no RAS usage");
    assert_eq!(unit.stats.btb_lookups, 0, "returns never consult the BTB");
}

// ══════════════════════════════════════════════════════════
// 4. Indirect predictor
// ══════════════════════════════════════════════════════════

#[test]
fn indirect_hit_redirects() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_indirect(0, 0x6000, 0x7777_0000);

    let mut pc = Pc(0x6000);
    let taken = unit.predict(&indirect_jump(), 1, &mut pc, 0);

    assert!(taken);
    assert_eq!(pc, Pc(0x7777_0000));
    assert_eq!(unit.stats.indirect_lookups, 1);
    assert_eq!(unit.stats.indirect_hits, 1);
    assert_eq!(unit.stats.btb_lookups, 0);
    let front = unit.history(0).next().unwrap();
    assert!(front.was_indirect);
    assert!(front.indirect_history.is_some());
}

#[test]
fn indirect_miss_forces_not_taken_without_direction_correction() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_direction(true);

    let mut pc = Pc(0x6000);
    let taken = unit.predict(&cond_indirect(), 1, &mut pc, 0);

    assert!(!taken);
    assert_eq!(pc, Pc(0x6000 + INST_SIZE));
    assert_eq!(unit.stats.indirect_misses, 1);
    assert_eq!(
        bench.ledger.borrow().dir_btb_updates,
        0,
        "indirect misses do not issue the BTB-miss direction correction"
    );
}

#[test]
fn indirect_call_pushes_and_takes_the_predicted_target() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_indirect(0, 0x6000, 0x7000);

    let mut pc = Pc(0x6000);
    let taken = unit.predict(&indirect_call(), 1, &mut pc, 0);

    assert!(taken);
    assert_eq!(pc, Pc(0x7000));
    assert_eq!(unit.stats.indirect_hits, 1);
    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.ras_pushes, 1, "the return address is pushed before the lookup");
    assert_eq!(ledger.ras_live, 1);
}

#[test]
fn indirect_miss_on_cond_call_undoes_push_but_keeps_flag() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_direction(true);

    let mut pc = Pc(0x6000);
    let taken = unit.predict(&cond_indirect_call(), 1, &mut pc, 0);

    assert!(!taken);
    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.ras_pushes, 1);
    assert_eq!(ledger.ras_squashes, 1);
    let front = unit.history(0).next().unwrap();
    assert!(front.ras_history.is_none());
    assert!(front.pushed_ras, "the flag survives on the indirect miss path");
}

#[test]
fn direct_branches_prefer_the_btb_even_with_indirect_present() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_direction(true);
    bench.set_btb(0, 0x1000, 0x2000);

    let mut pc = Pc(0x1000);
    assert!(unit.predict(&cond_branch(), 1, &mut pc, 0));

    assert_eq!(unit.stats.btb_lookups, 1);
    assert_eq!(unit.stats.indirect_lookups, 0);
}

#[test]
fn every_prediction_informs_the_indirect_predictor() {
    let (mut unit, bench) = counting_unit(1, true, true);

    let mut pc = Pc(0x1000);
    unit.predict(&cond_branch(), 1, &mut pc, 0);
    unit.predict(&direct_jump(), 2, &mut pc, 0);

    assert_eq!(
        bench.ledger.borrow().ind_updates,
        2,
        "BTB-path predictions still feed the indirect path history"
    );
}

// ══════════════════════════════════════════════════════════
// 5. Bookkeeping and probes
// ══════════════════════════════════════════════════════════

#[test]
fn history_orders_youngest_first() {
    let (mut unit, _bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    for sn in [1, 2, 5, 9] {
        unit.predict(&cond_branch(), sn, &mut pc, 0);
    }

    let seq_nums: Vec<_> = unit.history(0).map(|e| e.seq_num).collect();
    assert_eq!(seq_nums, vec![9, 5, 2, 1]);
    assert!(seq_nums.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn threads_get_private_history_queues() {
    let (mut unit, _bench) = counting_unit(2, false, true);

    let mut pc = Pc(0x1000);
    unit.predict(&cond_branch(), 1, &mut pc, 0);
    let mut pc = Pc(0x2000);
    unit.predict(&cond_branch(), 1, &mut pc, 1);

    assert_eq!(unit.history_depth(0), 1);
    assert_eq!(unit.history_depth(1), 1);
}

#[test]
fn branches_probe_fires_once_per_prediction() {
    let (mut unit, _bench) = counting_unit(1, false, true);
    let fired = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&fired);
    unit.connect_branches_probe(move |count| counter.set(counter.get() + count));

    let mut pc = Pc(0x1000);
    unit.predict(&cond_branch(), 1, &mut pc, 0);
    unit.predict(&direct_jump(), 2, &mut pc, 0);
    unit.predict(&uncond_return(), 3, &mut pc, 0);

    assert_eq!(fired.get(), 3);
}

// ══════════════════════════════════════════════════════════
// 6. Direction-correction hook (mock interaction)
// ══════════════════════════════════════════════════════════

#[test]
fn btb_miss_calls_direction_hook_for_plain_branch() {
    let mut dir = MockDirection::new();
    dir.expect_lookup()
        .times(1)
        .returning(|_, _| (true, DirectionHistory::new(())));
    dir.expect_btb_update().times(1).returning(|_, _, _| ());

    let mut btb = MockBtb::new();
    btb.expect_lookup().times(1).returning(|_, _, _| None);

    let mut unit =
        BranchPredUnit::with_parts(1, false, Box::new(dir), Box::new(btb), None, None);

    let mut pc = Pc(0x1000);
    assert!(!unit.predict(&cond_branch(), 1, &mut pc, 0));
}

#[test]
fn btb_miss_skips_direction_hook_for_calls() {
    let mut dir = MockDirection::new();
    dir.expect_lookup()
        .times(1)
        .returning(|_, _| (true, DirectionHistory::new(())));
    dir.expect_btb_update().times(0);

    let mut btb = MockBtb::new();
    btb.expect_lookup().times(1).returning(|_, _, _| None);

    let mut unit =
        BranchPredUnit::with_parts(1, false, Box::new(dir), Box::new(btb), None, None);

    let mut pc = Pc(0x1000);
    assert!(!unit.predict(&cond_call(), 1, &mut pc, 0));
}
