//! Control-transfer instruction contract and program counter type.
//!
//! The prediction unit never decodes instructions itself. The fetch stage hands
//! it an opaque handle implementing [`ControlInst`], and the unit only asks
//! classification questions (call? return? direct?) and delegates PC arithmetic
//! (sequential advance, return-address construction) back to the handle.

use std::rc::Rc;

/// An architectural program counter value.
///
/// The unit reads the instruction address and moves whole values around; it
/// never interprets any other internal structure of the PC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pc(pub u64);

impl Pc {
    /// Creates a program counter from a raw 64-bit address.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the address of the instruction this PC points at.
    #[inline(always)]
    pub fn inst_addr(&self) -> u64 {
        self.0
    }
}

/// Classification and PC-arithmetic contract for a control-transfer instruction.
///
/// A single instruction may satisfy any consistent combination of these
/// predicates (an unconditional direct call, an indirect return, or even a
/// call-and-return trampoline). Exactly one of `is_cond_ctrl` /
/// `is_uncond_ctrl` must hold, and exactly one of `is_direct_ctrl` /
/// `is_indirect_ctrl`.
pub trait ControlInst {
    /// True if the direction depends on a run-time condition.
    fn is_cond_ctrl(&self) -> bool;

    /// True if the instruction always transfers control when executed.
    fn is_uncond_ctrl(&self) -> bool;

    /// True if the target is encoded in the instruction.
    fn is_direct_ctrl(&self) -> bool;

    /// True if the target is data-dependent (register, memory, dispatch table).
    fn is_indirect_ctrl(&self) -> bool;

    /// True for subroutine calls (pushes a return address).
    fn is_call(&self) -> bool;

    /// True for subroutine returns (consumes a return address).
    fn is_return(&self) -> bool;

    /// Advances `pc` past this instruction to the sequential successor.
    fn advance_pc(&self, pc: &mut Pc);

    /// Builds the architectural return address for a call at `branch_pc`.
    fn build_ret_pc(&self, branch_pc: &Pc) -> Pc;
}

/// Branch classification used to key the BTB and inform the target predictors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchType {
    /// Subroutine return; target comes from the return address stack.
    Return,
    /// Direct subroutine call.
    CallDirect,
    /// Indirect subroutine call.
    CallIndirect,
    /// Conditional branch with an encoded target.
    DirectCond,
    /// Unconditional jump with an encoded target.
    DirectUncond,
    /// Conditional branch with a data-dependent target.
    IndirectCond,
    /// Unconditional jump with a data-dependent target.
    IndirectUncond,
}

impl BranchType {
    /// Classifies a control-transfer instruction.
    ///
    /// `Return` outranks every other classification: a call that is also a
    /// return (coroutine trampoline) is classified as a return, matching how
    /// the unit selects its target.
    pub fn of(inst: &dyn ControlInst) -> Self {
        if inst.is_return() {
            Self::Return
        } else if inst.is_call() {
            if inst.is_direct_ctrl() {
                Self::CallDirect
            } else {
                Self::CallIndirect
            }
        } else if inst.is_direct_ctrl() {
            if inst.is_cond_ctrl() {
                Self::DirectCond
            } else {
                Self::DirectUncond
            }
        } else if inst.is_cond_ctrl() {
            Self::IndirectCond
        } else {
            Self::IndirectUncond
        }
    }
}

/// Shared handle to a control-transfer instruction.
///
/// The unit keeps one per in-flight branch record so commit and squash can
/// re-classify the instruction and rebuild return addresses.
pub type ControlInstPtr = Rc<dyn ControlInst>;
