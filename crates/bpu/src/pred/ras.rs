//! Return Address Stack (RAS) with speculative undo.
//!
//! The RAS pairs calls with returns: calls push the architectural return
//! address, returns pop it. Because both happen at prediction time, every
//! mutation is recorded in a per-branch [`RasHistory`] token holding exactly
//! the state needed to reverse it. One token can carry a pop *and* a push
//! (a return-and-call trampoline); squashing undoes the push first, then the
//! pop.

use std::any::Any;
use std::fmt;

use crate::inst::BranchType;
use crate::pred::ThreadId;

/// Opaque undo state for the RAS mutations of one in-flight branch.
pub struct RasHistory(Box<dyn Any>);

impl RasHistory {
    /// Wraps stack-private undo state into a token.
    pub fn new<S: 'static>(state: S) -> Self {
        Self(Box::new(state))
    }

    /// Unwraps the token, consuming it.
    ///
    /// # Panics
    ///
    /// Panics if the token was issued by a different stack implementation.
    pub fn take<S: 'static>(self) -> S {
        *self
            .0
            .downcast::<S>()
            .unwrap_or_else(|_| panic!("RAS history token holds a foreign state type"))
    }

    /// Borrows the token's state mutably.
    ///
    /// # Panics
    ///
    /// Panics on a foreign state type, as with [`RasHistory::take`].
    pub fn state_mut<S: 'static>(&mut self) -> &mut S {
        self.0
            .downcast_mut::<S>()
            .unwrap_or_else(|| panic!("RAS history token holds a foreign state type"))
    }
}

impl fmt::Debug for RasHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RasHistory(..)")
    }
}

/// Speculative call/return stack.
///
/// `pop` and `push` record their undo state into the same per-branch token;
/// a token is created only when the stack actually mutates. `squash` reverses
/// the recorded mutations and releases the token; `commit` releases it once
/// the branch retires.
pub trait ReturnStack {
    /// Pops the predicted return address, recording undo state in `history`.
    ///
    /// Returns `None` (and records nothing) when the stack is empty.
    fn pop(&mut self, tid: ThreadId, history: &mut Option<RasHistory>) -> Option<u64>;

    /// Pushes a return address, recording undo state in `history`.
    fn push(&mut self, tid: ThreadId, ret_addr: u64, history: &mut Option<RasHistory>);

    /// Releases the undo state of a retiring branch.
    fn commit(&mut self, tid: ThreadId, mispredict: bool, kind: BranchType, history: Option<RasHistory>);

    /// Reverses the recorded mutations of a wrong-path branch.
    fn squash(&mut self, tid: ThreadId, history: RasHistory);
}

/// Undo record for a single push.
struct PushUndo {
    /// Slot the push wrote into.
    slot: usize,
    /// Value the push overwrote.
    overwritten: u64,
    /// Whether the push advanced the stack pointer (false when the stack was
    /// full and the top slot was overwritten in place).
    advanced: bool,
}

/// Token payload: mutations of one branch, in prediction order (pop, then push).
#[derive(Default)]
struct SpecRasHistory {
    popped: bool,
    push: Option<PushUndo>,
}

/// Per-thread stack storage.
struct RasStack {
    addrs: Vec<u64>,
    ptr: usize,
}

impl RasStack {
    fn new(depth: usize) -> Self {
        Self {
            addrs: vec![0; depth],
            ptr: 0,
        }
    }
}

/// Bounded speculative return address stack.
///
/// Overflowing pushes overwrite the top slot so the most recent call history
/// survives; the overwritten value is kept in the undo token, so a squash
/// still restores the previous state exactly.
pub struct SpecRas {
    stacks: Vec<RasStack>,
}

impl SpecRas {
    /// Creates per-thread stacks of the given depth.
    pub fn new(depth: usize, num_threads: usize) -> Self {
        Self {
            stacks: (0..num_threads).map(|_| RasStack::new(depth)).collect(),
        }
    }
}

impl ReturnStack for SpecRas {
    fn pop(&mut self, tid: ThreadId, history: &mut Option<RasHistory>) -> Option<u64> {
        let stack = &mut self.stacks[tid];
        if stack.ptr == 0 {
            return None;
        }
        stack.ptr -= 1;
        let addr = stack.addrs[stack.ptr];
        history
            .get_or_insert_with(|| RasHistory::new(SpecRasHistory::default()))
            .state_mut::<SpecRasHistory>()
            .popped = true;
        Some(addr)
    }

    fn push(&mut self, tid: ThreadId, ret_addr: u64, history: &mut Option<RasHistory>) {
        let stack = &mut self.stacks[tid];
        let depth = stack.addrs.len();
        let (slot, advanced) = if stack.ptr < depth {
            (stack.ptr, true)
        } else {
            (depth - 1, false)
        };
        let undo = PushUndo {
            slot,
            overwritten: stack.addrs[slot],
            advanced,
        };
        stack.addrs[slot] = ret_addr;
        if advanced {
            stack.ptr += 1;
        }
        history
            .get_or_insert_with(|| RasHistory::new(SpecRasHistory::default()))
            .state_mut::<SpecRasHistory>()
            .push = Some(undo);
    }

    fn commit(
        &mut self,
        _tid: ThreadId,
        _mispredict: bool,
        _kind: BranchType,
        history: Option<RasHistory>,
    ) {
        // The speculative state is architectural once the branch retires;
        // the undo record is simply released.
        if let Some(token) = history {
            token.take::<SpecRasHistory>();
        }
    }

    fn squash(&mut self, tid: ThreadId, history: RasHistory) {
        let state = history.take::<SpecRasHistory>();
        let stack = &mut self.stacks[tid];
        // Reverse of prediction order: undo the push, then the pop.
        if let Some(undo) = state.push {
            stack.addrs[undo.slot] = undo.overwritten;
            if undo.advanced {
                stack.ptr -= 1;
            }
        }
        if state.popped {
            stack.ptr += 1;
        }
    }
}
