// This module defines the abstract code generation contract the cleanup lowering talks to.
// Builder exposes exactly the operations scope-exit and unwind lowering needs: starting and
// finishing a function, reading and repositioning the single insertion point, creating
// blocks attached to the current function, looking up runtime symbols (the exception
// retrieval intrinsic, the selector function, the personality), and emitting calls,
// invokes, pointer casts, incomplete catch selectors and their later completion, loads,
// stores, comparisons, branches and the unwinding terminators. The suppress_cleanups toggle
// is the backend-level escape hatch that disables cleanup emission altogether. IrBuilder is
// the real backend over the in-memory IR; MockBuilder is the recording test double.

//! Abstract code generation contract.
//!
//! The trait is object safe: [`crate::context::Context`] holds a
//! `&mut dyn Builder` so cleanup actions can be emitted against any backend.

use crate::core::{CompileError, CompileResult};
use crate::ir::{BlockId, FuncId, Value};

pub mod ir_builder;
pub mod mock;

pub use ir_builder::IrBuilder;
pub use mock::MockBuilder;

pub trait Builder {
    /// Start emitting the body of `name`; positions the cursor in its entry block.
    fn begin_function(&mut self, name: &str) -> CompileResult<FuncId>;

    /// Finish the current function, verifying it.
    fn end_function(&mut self) -> CompileResult<()>;

    /// Current insertion block.
    fn insert_block(&self) -> Option<BlockId>;

    /// Reposition the insertion point at the end of `block`.
    fn set_insert_block(&mut self, block: Option<BlockId>);

    /// Create an empty block in the current function.
    fn create_block(&mut self, name: &str) -> CompileResult<BlockId>;

    /// Whether `block` already ends in a terminator.
    fn is_terminated(&self, block: BlockId) -> bool;

    fn declare_function(&mut self, name: &str) -> FuncId;

    fn lookup_function(&self, name: &str) -> Option<FuncId>;

    /// Class info record for an exception class.
    fn class_info(&mut self, class: &str) -> Value;

    /// Personality function registered for the current function.
    fn personality(&mut self) -> CompileResult<Value>;

    fn emit_alloca(&mut self, name: &str) -> CompileResult<Value>;

    fn emit_call(&mut self, callee: FuncId, args: &[Value]) -> CompileResult<Value>;

    /// Call that continues at `normal` and unwinds to `unwind`.
    fn emit_invoke(
        &mut self,
        callee: FuncId,
        args: &[Value],
        normal: BlockId,
        unwind: BlockId,
    ) -> CompileResult<Value>;

    /// Cast to the opaque pointer representation.
    fn emit_pointer_cast(&mut self, value: Value) -> CompileResult<Value>;

    /// Selector call whose class list is not yet known.
    fn emit_incomplete_selector(
        &mut self,
        selector: FuncId,
        exception: Value,
        personality: Value,
    ) -> CompileResult<Value>;

    /// Fill in the class list of a selector created by
    /// [`Builder::emit_incomplete_selector`]. Fails if already complete.
    fn complete_selector(&mut self, selector: Value, clauses: &[Value]) -> CompileResult<()>;

    fn emit_load(&mut self, slot: Value) -> CompileResult<Value>;

    fn emit_store(&mut self, value: Value, slot: Value) -> CompileResult<()>;

    fn emit_icmp_eq(&mut self, lhs: Value, rhs: Value) -> CompileResult<Value>;

    fn emit_branch(&mut self, target: BlockId) -> CompileResult<()>;

    fn emit_cond_branch(
        &mut self,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> CompileResult<()>;

    fn emit_return(&mut self) -> CompileResult<()>;

    fn emit_resume(&mut self) -> CompileResult<()>;

    fn emit_unreachable(&mut self) -> CompileResult<()>;

    /// When set, frames never emit their cleanups on normal exit.
    fn suppress_cleanups(&self) -> bool;

    /// Look up a runtime function that must exist.
    fn require_function(&self, name: &str) -> CompileResult<FuncId> {
        self.lookup_function(name)
            .ok_or_else(|| CompileError::MissingIntrinsic {
                name: name.to_string(),
            })
    }

    /// Whether the insertion block is still open for more instructions.
    fn has_open_block(&self) -> bool {
        self.insert_block()
            .is_some_and(|block| !self.is_terminated(block))
    }
}
