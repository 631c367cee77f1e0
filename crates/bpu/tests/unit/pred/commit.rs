//! Commit Path Tests.
//!
//! Verifies in-order retirement from the back of the history queue, the
//! single authoritative direction update per branch, and the release of
//! indirect and RAS tokens at commit.

use bpu_core::inst::Pc;

use crate::common::harness::counting_unit;
use crate::common::insts::*;

// ══════════════════════════════════════════════════════════
// 1. Retirement order and boundaries
// ══════════════════════════════════════════════════════════

#[test]
fn commit_drains_and_issues_one_update_per_branch() {
    let (mut unit, bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    for sn in 1..=4 {
        unit.predict(&cond_branch(), sn, &mut pc, 0);
    }

    unit.update(4, 0);

    assert_eq!(unit.history_depth(0), 0);
    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.dir_updates.len(), 4, "one authoritative update each");
    assert_eq!(ledger.outstanding(), 0, "every token released");
    drop(ledger);
    unit.drain_sanity_check();
}

#[test]
fn commit_stops_at_done_sn() {
    let (mut unit, bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    for sn in 1..=3 {
        unit.predict(&cond_branch(), sn, &mut pc, 0);
    }

    unit.update(2, 0);

    assert_eq!(unit.history_depth(0), 1);
    assert_eq!(unit.history(0).next().unwrap().seq_num, 3);
    assert_eq!(bench.ledger.borrow().dir_updates.len(), 2);
}

#[test]
fn commit_on_empty_queue_is_a_noop() {
    let (mut unit, bench) = counting_unit(1, false, true);
    unit.update(100, 0);
    assert_eq!(bench.ledger.borrow().dir_updates.len(), 0);
}

#[test]
fn commit_with_lower_sn_than_all_entries_retires_nothing() {
    let (mut unit, _bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    for sn in 10..=12 {
        unit.predict(&cond_branch(), sn, &mut pc, 0);
    }

    unit.update(9, 0);
    assert_eq!(unit.history_depth(0), 3);
}

// ══════════════════════════════════════════════════════════
// 2. Token release at commit
// ══════════════════════════════════════════════════════════

#[test]
fn commit_releases_ras_and_indirect_tokens() {
    let (mut unit, bench) = counting_unit(1, true, true);
    bench.set_btb(0, 0x3000, 0x4000);
    bench.set_indirect(0, 0x6000, 0x8000);

    let mut pc = Pc(0x3000);
    unit.predict(&direct_call(), 1, &mut pc, 0);
    let mut pc = Pc(0x6000);
    unit.predict(&indirect_jump(), 2, &mut pc, 0);

    assert_eq!(bench.ledger.borrow().outstanding(), 4, "2 dir + 1 ras + 1 indirect");

    unit.update(2, 0);

    let ledger = bench.ledger.borrow();
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.ras_commits, 1);
    assert_eq!(ledger.ind_commits, 1);
    assert_eq!(ledger.ras_squashes, 0);
    assert_eq!(ledger.ind_squashes, 0);
}

#[test]
fn threads_commit_independently() {
    let (mut unit, _bench) = counting_unit(2, false, true);

    let mut pc = Pc(0x1000);
    unit.predict(&cond_branch(), 1, &mut pc, 0);
    let mut pc = Pc(0x2000);
    unit.predict(&cond_branch(), 1, &mut pc, 1);

    unit.update(1, 0);

    assert_eq!(unit.history_depth(0), 0);
    assert_eq!(unit.history_depth(1), 1);
}

// ══════════════════════════════════════════════════════════
// 3. Drain sanity
// ══════════════════════════════════════════════════════════

#[test]
fn drain_succeeds_after_full_resolution() {
    let (mut unit, _bench) = counting_unit(2, false, true);

    let mut pc = Pc(0x1000);
    for sn in 1..=5 {
        unit.predict(&cond_branch(), sn, &mut pc, 0);
    }
    unit.update(5, 0);

    unit.drain_sanity_check();
}

#[test]
#[should_panic(expected = "speculative branches outstanding")]
fn drain_panics_with_inflight_branches() {
    let (mut unit, _bench) = counting_unit(1, false, true);

    let mut pc = Pc(0x1000);
    unit.predict(&cond_branch(), 1, &mut pc, 0);

    unit.drain_sanity_check();
}
