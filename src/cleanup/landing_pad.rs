//! Landing pad construction.
//!
//! A landing pad retrieves the in-flight exception, casts the personality to
//! an opaque pointer, runs the selector, and branches to the unwind chain.
//! Inside a try body the selector is left incomplete and parked in the try's
//! catch data, and its result plus the exception object are stored into the
//! implicit `:exceptionSelector` / `:exceptionObject` variables for the catch
//! dispatch. Outside a try the selector is called with a null class info:
//! run the cleanups, keep unwinding.

use super::catch::IncompleteCatchSelector;
use super::FrameId;
use crate::context::{Context, TryId, EXCEPTION_OBJECT_VAR, EXCEPTION_SELECTOR_VAR};
use crate::core::{CompileError, CompileResult};
use crate::ir::{runtime, BlockId, Value};
use log::debug;

impl Context<'_, '_> {
    /// Landing pad exceptions unwinding into `frame` should target, built on
    /// first request. Cached on the frame while it has no cleanups, otherwise
    /// on its most recently registered cleanup.
    pub fn get_landing_pad(
        &mut self,
        frame: FrameId,
        next: BlockId,
        catch: Option<TryId>,
    ) -> CompileResult<BlockId> {
        if let Some(lp) = self.frame(frame).cached_landing_pad() {
            return Ok(lp);
        }

        let lp = self.build_landing_pad(next, catch)?;
        self.frames[frame.0 as usize].set_landing_pad(lp);
        Ok(lp)
    }

    /// Build an uncached landing pad branching to `next`.
    pub(crate) fn build_landing_pad(
        &mut self,
        next: BlockId,
        catch: Option<TryId>,
    ) -> CompileResult<BlockId> {
        let lp = self.builder.create_block("lp")?;

        // Dedicated cursor: the caller's insertion point survives.
        let saved_block = self.builder.insert_block();
        self.builder.set_insert_block(Some(lp));
        let result = self.fill_landing_pad(lp, next, catch);
        self.builder.set_insert_block(saved_block);
        result?;

        self.session.record_landing_pad();
        debug!(
            "Built {} landing pad {} -> {} in {}",
            if catch.is_some() { "catch" } else { "cleanup" },
            lp.0,
            next.0,
            self.session.current_function().unwrap_or("<none>")
        );
        Ok(lp)
    }

    fn fill_landing_pad(
        &mut self,
        lp: BlockId,
        next: BlockId,
        catch: Option<TryId>,
    ) -> CompileResult<()> {
        let exception_fn = self.builder.require_function(runtime::EXCEPTION_INTRINSIC)?;
        let exception = self.builder.emit_call(exception_fn, &[])?;

        let personality = self.builder.personality()?;
        let personality = self.builder.emit_pointer_cast(personality)?;

        let selector_fn = self.builder.require_function(runtime::SELECTOR_FUNCTION)?;

        match catch {
            Some(try_id) => {
                let Some(region) = self.tries.get(try_id.0 as usize) else {
                    return Err(CompileError::frame_stack(format!(
                        "landing pad refers to unknown try {}",
                        try_id.0
                    )));
                };
                // Resolved from the try's own scope: a nested try may shadow
                // the implicit variables.
                let scope = region.scope;
                let selector_slot = self.lookup_scoped(scope, EXCEPTION_SELECTOR_VAR)?;
                let object_slot = self.lookup_scoped(scope, EXCEPTION_OBJECT_VAR)?;

                // The class list is filled in when the try statement ends.
                let selector =
                    self.builder
                        .emit_incomplete_selector(selector_fn, exception, personality)?;
                self.tries[try_id.0 as usize]
                    .catch_data
                    .add_selector(IncompleteCatchSelector {
                        value: selector,
                        block: lp,
                    })?;
                self.session.record_selector_created();

                self.builder.emit_store(selector, selector_slot)?;
                self.builder.emit_store(exception, object_slot)?;
            }
            None => {
                self.builder
                    .emit_call(selector_fn, &[exception, personality, Value::Null])?;
            }
        }

        self.builder.emit_branch(next)
    }
}
