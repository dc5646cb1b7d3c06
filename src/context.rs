// This module defines the compilation context the surrounding compiler drives while lowering
// a function body. It owns the frame table (frames reference their parent by FrameId; the
// current-frame pointer is the only thing keeping a frame active), the context-wide
// re-entrancy guard, BuilderContextData with the next-cleanup-block target used while an
// unwind chain is under construction, the namespace holding the implicit exception
// variables, and the try and loop region stacks. On top of the frame primitives it offers
// the operations a front end needs: entering and leaving scopes, declaring variables with
// release cleanups, emitting calls that may throw (plain call, invoke into a landing pad,
// or invoke chained to the next cleanup), return and break with the right cleanups, loops
// whose back edge invalidates cached unwind blocks, throw, and try/catch with deferred
// selector completion and type dispatch.

//! Compilation context for scope and unwind lowering.

use crate::builder::Builder;
use crate::cleanup::{CallCleanup, CatchClause, CatchData, CleanupFrame, FrameId};
use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{runtime, BlockId, FuncId, Value};
use hashbrown::HashMap;
use log::{debug, trace};
use std::rc::Rc;

/// Implicit variable receiving the selector result in try landing pads.
pub const EXCEPTION_SELECTOR_VAR: &str = ":exceptionSelector";
/// Implicit variable receiving the exception object in try landing pads.
pub const EXCEPTION_OBJECT_VAR: &str = ":exceptionObject";

/// Index of a try statement on the context's try stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TryId(pub u32);

/// Scratch state shared by one unwind chain construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuilderContextData {
    /// Block the cleanup being emitted must transfer to.
    pub next_cleanup_block: Option<BlockId>,
}

/// Scoped name lookup for implicit and declared variables.
#[derive(Debug, Default)]
pub struct Namespace {
    scopes: Vec<HashMap<String, Value>>,
}

impl Namespace {
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn define(&mut self, name: &str, value: Value) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Look `name` up starting at scope `depth` and moving outward.
    pub fn lookup_within(&self, depth: usize, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .take(depth + 1)
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }
}

/// A try statement being compiled.
#[derive(Debug)]
pub struct TryRegion {
    pub(crate) body_frame: FrameId,
    pub(crate) outer_frame: Option<FrameId>,
    pub(crate) dispatch: BlockId,
    pub(crate) end: BlockId,
    pub(crate) catch_data: CatchData,
    /// Namespace scope holding the implicit exception variables.
    pub(crate) scope: usize,
    /// Set once the first catch clause starts.
    pub(crate) in_catch: bool,
}

impl TryRegion {
    pub fn body_frame(&self) -> FrameId {
        self.body_frame
    }

    pub fn dispatch(&self) -> BlockId {
        self.dispatch
    }

    pub fn end(&self) -> BlockId {
        self.end
    }

    pub fn catch_data(&self) -> &CatchData {
        &self.catch_data
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopRegion {
    header: BlockId,
    exit: BlockId,
    frame: FrameId,
}

/// Per-function lowering state plus the backend it emits through.
pub struct Context<'a, 's> {
    pub(crate) builder: &'a mut dyn Builder,
    pub(crate) session: &'a CompilationSession<'s>,
    pub(crate) frames: Vec<CleanupFrame>,
    current: Option<FrameId>,
    root: Option<FrameId>,
    /// Frame whose cleanups are being emitted on the normal path.
    pub(crate) closing_frame: Option<FrameId>,
    /// Re-entrancy guard: set while cleanup code is being emitted.
    pub(crate) emitting_cleanups: bool,
    pub(crate) data: BuilderContextData,
    namespace: Namespace,
    pub(crate) tries: Vec<TryRegion>,
    loops: Vec<LoopRegion>,
    resume_block: Option<BlockId>,
    terminate_block: Option<BlockId>,
}

impl<'a, 's> Context<'a, 's> {
    pub fn new(builder: &'a mut dyn Builder, session: &'a CompilationSession<'s>) -> Self {
        Self {
            builder,
            session,
            frames: Vec::new(),
            current: None,
            root: None,
            closing_frame: None,
            emitting_cleanups: false,
            data: BuilderContextData::default(),
            namespace: Namespace::default(),
            tries: Vec::new(),
            loops: Vec::new(),
            resume_block: None,
            terminate_block: None,
        }
    }

    pub fn builder(&mut self) -> &mut (dyn Builder + 'a) {
        &mut *self.builder
    }

    pub fn session(&self) -> &'a CompilationSession<'s> {
        self.session
    }

    pub fn current_frame(&self) -> Option<FrameId> {
        self.current
    }

    pub fn root_frame(&self) -> Option<FrameId> {
        self.root
    }

    pub fn frame(&self, id: FrameId) -> &CleanupFrame {
        &self.frames[id.0 as usize]
    }

    pub fn is_emitting_cleanups(&self) -> bool {
        self.emitting_cleanups
    }

    pub fn context_data(&self) -> BuilderContextData {
        self.data
    }

    pub fn try_region(&self, id: TryId) -> Option<&TryRegion> {
        self.tries.get(id.0 as usize)
    }

    pub(crate) fn require_frame(&self) -> CompileResult<FrameId> {
        self.current
            .ok_or_else(|| CompileError::frame_stack("no cleanup frame is active"))
    }

    pub fn define_variable(&mut self, name: &str, value: Value) {
        self.namespace.define(name, value);
    }

    pub fn lookup_variable(&self, name: &str) -> CompileResult<Value> {
        self.namespace
            .lookup(name)
            .ok_or_else(|| CompileError::MissingScopeVariable {
                name: name.to_string(),
            })
    }

    /// Look up an implicit variable as seen from namespace scope `scope`.
    pub(crate) fn lookup_scoped(&self, scope: usize, name: &str) -> CompileResult<Value> {
        self.namespace
            .lookup_within(scope, name)
            .ok_or_else(|| CompileError::MissingScopeVariable {
                name: name.to_string(),
            })
    }

    /// Emit `f` into `block` without disturbing the insertion point.
    fn emit_detached(
        &mut self,
        block: BlockId,
        f: impl FnOnce(&mut dyn Builder) -> CompileResult<()>,
    ) -> CompileResult<()> {
        let saved = self.builder.insert_block();
        self.builder.set_insert_block(Some(block));
        let result = f(&mut *self.builder);
        self.builder.set_insert_block(saved);
        result
    }

    /// Make sure there is an open block to emit into, starting an unreachable
    /// one after a terminator.
    pub fn ensure_insert_block(&mut self) -> CompileResult<BlockId> {
        match self.builder.insert_block() {
            Some(block) if !self.builder.is_terminated(block) => Ok(block),
            _ => {
                let block = self.builder.create_block("dead")?;
                self.builder.set_insert_block(Some(block));
                Ok(block)
            }
        }
    }

    // Functions

    /// Begin a function body with a fresh root frame.
    pub fn begin_function(&mut self, name: &str) -> CompileResult<FuncId> {
        if self.root.is_some() {
            return Err(CompileError::frame_stack(format!(
                "cannot begin {} while another function is open",
                name
            )));
        }
        let id = self.builder.begin_function(name)?;

        self.frames.clear();
        self.tries.clear();
        self.loops.clear();
        self.namespace = Namespace::default();
        self.data = BuilderContextData::default();
        self.closing_frame = None;
        self.emitting_cleanups = false;
        self.resume_block = None;
        self.terminate_block = None;

        self.root = Some(self.push_frame());
        debug!("Begin function {}", name);
        Ok(id)
    }

    /// Close the root frame, return if control can still fall off the end, and
    /// hand the function to the backend for verification.
    pub fn end_function(&mut self) -> CompileResult<()> {
        let root = self.root.ok_or(CompileError::NoFunction)?;
        if !self.tries.is_empty() || !self.loops.is_empty() || self.current != Some(root) {
            return Err(CompileError::frame_stack("function ended with open scopes"));
        }

        if self.builder.has_open_block() {
            self.close(root)?;
            self.builder.emit_return()?;
        }

        self.current = None;
        self.root = None;
        self.namespace.pop_scope();
        self.builder.end_function()
    }

    // Frames

    /// Enter a lexical scope.
    pub fn push_frame(&mut self) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(CleanupFrame::new(self.current));
        trace!("Push frame {} (parent {:?})", id.0, self.current);
        self.current = Some(id);
        self.namespace.push_scope();
        id
    }

    /// Leave the current scope, emitting its cleanups if control can reach
    /// the end of it.
    pub fn pop_frame(&mut self) -> CompileResult<FrameId> {
        let id = self.require_frame()?;
        if self.root == Some(id) {
            return Err(CompileError::frame_stack(
                "the root frame is closed by end_function",
            ));
        }
        if self.builder.has_open_block() {
            self.close(id)?;
        }
        self.leave_frame(id);
        Ok(id)
    }

    fn leave_frame(&mut self, id: FrameId) {
        trace!("Pop frame {}", id.0);
        self.current = self.frame(id).parent();
        self.namespace.pop_scope();
    }

    /// Declare a variable whose release function runs when its scope exits.
    pub fn declare_variable(&mut self, name: &str, release: &str) -> CompileResult<Value> {
        self.require_frame()?;
        let slot = self.builder.emit_alloca(name)?;
        self.namespace.define(name, slot);
        let callee = self.builder.declare_function(release);
        self.add_cleanup(Rc::new(CallCleanup::new(
            callee,
            vec![slot],
            format!("{}({})", release, name),
        )))?;
        Ok(slot)
    }

    /// Close every frame from the current one up to the root.
    pub fn close_all_cleanups(&mut self) -> CompileResult<()> {
        let mut cursor = self.current;
        while let Some(id) = cursor {
            self.close(id)?;
            cursor = self.frame(id).parent();
        }
        Ok(())
    }

    // Calls and unwinding

    /// Declare `name` if needed and call it.
    pub fn call_function(&mut self, name: &str, args: &[Value]) -> CompileResult<Value> {
        let callee = self.builder.declare_function(name);
        self.emit_call(callee, args)
    }

    /// Emit a call that may throw.
    ///
    /// While an unwind chain is being built the call becomes the transfer to
    /// the next cleanup block. Otherwise it is a plain call when no cleanup or
    /// handler could observe an exception, and an invoke into the current
    /// landing pad when one could.
    pub fn emit_call(&mut self, callee: FuncId, args: &[Value]) -> CompileResult<Value> {
        if let Some(next) = self.data.next_cleanup_block {
            let terminate = self.terminate_block()?;
            return self.builder.emit_invoke(callee, args, next, terminate);
        }

        if !self.unwind_required() {
            return self.builder.emit_call(callee, args);
        }

        let unwind = self.unwind_block()?;
        let cont = self.builder.create_block("invoke.cont")?;
        let value = self.builder.emit_invoke(callee, args, cont, unwind)?;
        self.builder.set_insert_block(Some(cont));
        Ok(value)
    }

    fn unwind_start(&self) -> Option<FrameId> {
        self.closing_frame.or(self.current)
    }

    /// Whether an exception raised here would run a cleanup or reach a handler.
    pub fn unwind_required(&self) -> bool {
        let Some(start) = self.unwind_start() else {
            return false;
        };
        if self.enclosing_try(start).is_some() {
            return true;
        }

        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let frame = self.frame(id);
            if frame.has_pending_cleanups() {
                return true;
            }
            cursor = frame.parent();
        }
        false
    }

    /// Innermost try whose body encloses `frame`.
    pub fn enclosing_try(&self, frame: FrameId) -> Option<TryId> {
        self.tries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, region)| !region.in_catch && self.is_within(frame, region.body_frame))
            .map(|(idx, _)| TryId(idx as u32))
    }

    fn is_within(&self, frame: FrameId, ancestor: FrameId) -> bool {
        let mut cursor = Some(frame);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.frame(id).parent();
        }
        false
    }

    /// Landing pad for a throwing call at the current point.
    ///
    /// Builds the unwind chain of every frame between the current frame and
    /// the innermost enclosing try body (or the root), ending in the try's
    /// dispatch block or the function's resume block.
    pub fn unwind_block(&mut self) -> CompileResult<BlockId> {
        let start = self
            .unwind_start()
            .ok_or_else(|| CompileError::frame_stack("no cleanup frame is active"))?;

        // Cleanup code on the normal path gets its own pad: part of the
        // frame has already run.
        let normal_path = self.closing_frame.is_some();
        if !normal_path {
            if let Some(lp) = self.frame(start).cached_landing_pad() {
                return Ok(lp);
            }
        }

        let catch = self.enclosing_try(start);
        let (stop, mut next) = match catch {
            Some(id) => {
                let region = &self.tries[id.0 as usize];
                (Some(region.body_frame), region.dispatch)
            }
            None => (None, self.resume_block()?),
        };

        let mut chain = Vec::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            chain.push(id);
            if Some(id) == stop {
                break;
            }
            cursor = self.frame(id).parent();
        }

        for id in chain.into_iter().rev() {
            next = self.emit_unwind_cleanups(id, next)?;
        }

        if normal_path {
            self.build_landing_pad(next, catch)
        } else {
            self.get_landing_pad(start, next, catch)
        }
    }

    /// Block that continues unwinding out of the function.
    fn resume_block(&mut self) -> CompileResult<BlockId> {
        if let Some(block) = self.resume_block {
            return Ok(block);
        }
        let block = self.builder.create_block("resume")?;
        self.emit_detached(block, |b| b.emit_resume())?;
        self.resume_block = Some(block);
        Ok(block)
    }

    /// Block reached when cleanup code itself throws during unwinding.
    fn terminate_block(&mut self) -> CompileResult<BlockId> {
        if let Some(block) = self.terminate_block {
            return Ok(block);
        }
        let terminate = self.builder.require_function(runtime::TERMINATE)?;
        let block = self.builder.create_block("terminate")?;
        self.emit_detached(block, |b| {
            b.emit_call(terminate, &[])?;
            b.emit_unreachable()
        })?;
        self.terminate_block = Some(block);
        Ok(block)
    }

    // Control flow

    /// Run every cleanup and return.
    pub fn emit_return(&mut self) -> CompileResult<()> {
        self.close_all_cleanups()?;
        self.builder.emit_return()?;
        self.builder.set_insert_block(None);
        Ok(())
    }

    /// Throw a new exception of `class`.
    pub fn emit_throw(&mut self, class: &str) -> CompileResult<()> {
        let info = self.builder.class_info(class);
        let new_fn = self.builder.require_function(runtime::EXCEPTION_NEW)?;
        let exception = self.builder.emit_call(new_fn, &[info])?;

        let throw_fn = self.builder.require_function(runtime::THROW)?;
        self.emit_call(throw_fn, &[exception])?;
        self.builder.emit_unreachable()?;
        self.builder.set_insert_block(None);
        Ok(())
    }

    /// Start a loop; its body gets its own frame.
    pub fn begin_loop(&mut self) -> CompileResult<FrameId> {
        let header = self.builder.create_block("loop")?;
        let exit = self.builder.create_block("loop.end")?;
        if self.builder.has_open_block() {
            self.builder.emit_branch(header)?;
        }
        self.builder.set_insert_block(Some(header));

        let frame = self.push_frame();
        self.loops.push(LoopRegion {
            header,
            exit,
            frame,
        });
        Ok(frame)
    }

    /// Close the loop body, take the back edge, and invalidate the cached
    /// unwind blocks of the body and its enclosing frames.
    pub fn end_loop(&mut self) -> CompileResult<()> {
        let region = self
            .loops
            .pop()
            .ok_or_else(|| CompileError::frame_stack("end of loop outside a loop"))?;
        if self.current != Some(region.frame) {
            return Err(CompileError::frame_stack("unbalanced frames in loop body"));
        }

        if self.builder.has_open_block() {
            self.close(region.frame)?;
            self.builder.emit_branch(region.header)?;
        }
        self.leave_frame(region.frame);
        self.clear_cached_cleanups(region.frame);
        self.builder.set_insert_block(Some(region.exit));
        Ok(())
    }

    /// Leave the innermost loop, running the cleanups of every frame inside it.
    pub fn emit_break(&mut self) -> CompileResult<()> {
        let region = *self
            .loops
            .last()
            .ok_or_else(|| CompileError::frame_stack("break outside a loop"))?;

        let mut cursor = self.current;
        while let Some(id) = cursor {
            self.close(id)?;
            if id == region.frame {
                break;
            }
            cursor = self.frame(id).parent();
        }

        self.builder.emit_branch(region.exit)?;
        self.builder.set_insert_block(None);
        Ok(())
    }

    // Try statements

    /// Start a try statement: declares the implicit exception variables and
    /// enters the body frame.
    pub fn begin_try(&mut self) -> CompileResult<TryId> {
        self.require_frame()?;
        self.namespace.push_scope();
        let scope = self.namespace.depth() - 1;
        let selector = self.builder.emit_alloca(EXCEPTION_SELECTOR_VAR)?;
        let object = self.builder.emit_alloca(EXCEPTION_OBJECT_VAR)?;
        self.namespace.define(EXCEPTION_SELECTOR_VAR, selector);
        self.namespace.define(EXCEPTION_OBJECT_VAR, object);

        let dispatch = self.builder.create_block("catch.dispatch")?;
        let end = self.builder.create_block("try.end")?;
        let outer_frame = self.current;
        let body_frame = self.push_frame();

        let id = TryId(self.tries.len() as u32);
        self.tries.push(TryRegion {
            body_frame,
            outer_frame,
            dispatch,
            end,
            catch_data: CatchData::new(),
            scope,
            in_catch: false,
        });
        debug!("Begin try {} (body frame {})", id.0, body_frame.0);
        Ok(id)
    }

    fn innermost_try(&self) -> CompileResult<TryId> {
        match self.tries.len() {
            0 => Err(CompileError::frame_stack("catch outside a try statement")),
            len => Ok(TryId(len as u32 - 1)),
        }
    }

    /// Leave the try body or the previous catch clause.
    fn finish_try_section(&mut self, id: TryId) -> CompileResult<()> {
        let region = &self.tries[id.0 as usize];
        let (end, in_catch, body, outer) =
            (region.end, region.in_catch, region.body_frame, region.outer_frame);

        let frame = self.require_frame()?;
        let balanced = if in_catch {
            self.frame(frame).parent() == outer
        } else {
            frame == body
        };
        if !balanced {
            return Err(CompileError::frame_stack("unbalanced frames in try statement"));
        }

        self.pop_frame()?;
        if self.builder.has_open_block() {
            self.builder.emit_branch(end)?;
        }
        Ok(())
    }

    /// Start a catch clause for `class`.
    pub fn begin_catch(&mut self, class: &str) -> CompileResult<BlockId> {
        let id = self.innermost_try()?;
        self.finish_try_section(id)?;

        let block = self.builder.create_block("catch")?;
        let info = self.builder.class_info(class);
        let region = &mut self.tries[id.0 as usize];
        region.catch_data.add_clause(CatchClause {
            class: class.to_string(),
            info,
            block,
        })?;
        region.in_catch = true;

        self.builder.set_insert_block(Some(block));
        self.push_frame();
        debug!("Begin catch {} of try {}", class, id.0);
        Ok(block)
    }

    /// Finish the try statement: completes every incomplete selector created
    /// for its landing pads and builds the type dispatch.
    pub fn end_try(&mut self) -> CompileResult<()> {
        let id = self.innermost_try()?;
        self.finish_try_section(id)?;

        let Some(mut region) = self.tries.pop() else {
            return Err(CompileError::frame_stack("try stack is empty"));
        };
        let completed = region.catch_data.complete(&mut *self.builder)?;
        for _ in 0..completed {
            self.session.record_selector_completed();
        }
        debug!(
            "End try {}: {} selectors, {} clauses",
            id.0,
            completed,
            region.catch_data.clauses().len()
        );

        self.emit_dispatch(&region)?;
        self.namespace.pop_scope();
        self.builder.set_insert_block(Some(region.end));
        Ok(())
    }

    fn emit_dispatch(&mut self, region: &TryRegion) -> CompileResult<()> {
        self.builder.set_insert_block(Some(region.dispatch));
        if region.catch_data.selectors().is_empty() {
            // Nothing in the body can throw.
            return self.builder.emit_unreachable();
        }

        let selector_slot = self.lookup_scoped(region.scope, EXCEPTION_SELECTOR_VAR)?;
        let selector = self.builder.emit_load(selector_slot)?;
        let typeid_fn = self.builder.require_function(runtime::TYPEID_FUNCTION)?;

        for clause in region.catch_data.clauses() {
            let typeid = self.builder.emit_call(typeid_fn, &[clause.info])?;
            let matches = self.builder.emit_icmp_eq(selector, typeid)?;
            let next = self.builder.create_block("catch.next")?;
            self.builder.emit_cond_branch(matches, clause.block, next)?;
            self.builder.set_insert_block(Some(next));
        }

        // No clause matched: hand the exception to the enclosing handlers.
        let object_slot = self.lookup_scoped(region.scope, EXCEPTION_OBJECT_VAR)?;
        let exception = self.builder.emit_load(object_slot)?;
        let rethrow = self.builder.require_function(runtime::RETHROW)?;
        self.emit_call(rethrow, &[exception])?;
        self.builder.emit_unreachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_shadowing() {
        let mut ns = Namespace::default();
        ns.push_scope();
        ns.define("x", Value::Null);
        ns.push_scope();
        ns.define("x", Value::Func(FuncId(1)));
        assert_eq!(ns.lookup("x"), Some(Value::Func(FuncId(1))));
        ns.pop_scope();
        assert_eq!(ns.lookup("x"), Some(Value::Null));
        assert_eq!(ns.lookup("y"), None);
        assert_eq!(ns.depth(), 1);
    }
}
