//! Cleanup actions.

use crate::context::Context;
use crate::core::CompileResult;
use crate::ir::{FuncId, Value};

/// A single emittable cleanup bound to one registered scope obligation.
///
/// An action may be emitted several times: inline on every normal exit of its
/// scope, and once into its own block on the unwind path. When emitted into an
/// unwind block the action must end that block with a transfer to the next
/// cleanup block; emitting through [`Context::emit_call`] takes care of that.
pub trait CleanupAction {
    fn emit(&self, ctx: &mut Context<'_, '_>) -> CompileResult<()>;

    /// Short description used in logs.
    fn describe(&self) -> String {
        "cleanup".to_string()
    }
}

impl<F> CleanupAction for F
where
    F: Fn(&mut Context<'_, '_>) -> CompileResult<()>,
{
    fn emit(&self, ctx: &mut Context<'_, '_>) -> CompileResult<()> {
        self(ctx)
    }
}

/// Calls a release function, typically on a scoped variable's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCleanup {
    pub callee: FuncId,
    pub args: Vec<Value>,
    pub label: String,
}

impl CallCleanup {
    pub fn new(callee: FuncId, args: Vec<Value>, label: impl Into<String>) -> Self {
        Self {
            callee,
            args,
            label: label.into(),
        }
    }
}

impl CleanupAction for CallCleanup {
    fn emit(&self, ctx: &mut Context<'_, '_>) -> CompileResult<()> {
        ctx.emit_call(self.callee, &self.args).map(|_| ())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
