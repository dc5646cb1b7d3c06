//! Concrete [`Builder`] emitting into an in-memory [`Module`].

use super::Builder;
use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{self, runtime, Block, BlockId, FuncId, Function, Inst, InstId, Module, Value};
use log::{debug, trace};

/// Backend over the in-memory IR.
pub struct IrBuilder<'arena> {
    session: &'arena CompilationSession<'arena>,
    module: Module<'arena>,
    /// Function currently being emitted.
    func: Option<FuncId>,
    /// Single insertion cursor.
    insert: Option<BlockId>,
    suppress_cleanups: bool,
}

impl<'arena> IrBuilder<'arena> {
    /// Create a builder for a fresh module with the exception runtime declared.
    pub fn new(session: &'arena CompilationSession<'arena>, module_name: &str) -> Self {
        Self::with_module(session, Module::with_runtime(session, module_name))
    }

    pub fn with_module(session: &'arena CompilationSession<'arena>, module: Module<'arena>) -> Self {
        Self {
            session,
            module,
            func: None,
            insert: None,
            suppress_cleanups: false,
        }
    }

    pub fn session(&self) -> &'arena CompilationSession<'arena> {
        self.session
    }

    pub fn module(&self) -> &Module<'arena> {
        &self.module
    }

    pub fn into_module(self) -> Module<'arena> {
        self.module
    }

    pub fn set_suppress_cleanups(&mut self, suppress: bool) {
        self.suppress_cleanups = suppress;
    }

    /// Function currently being emitted, if any.
    pub fn current_function(&self) -> Option<&Function<'arena>> {
        self.func.map(|id| self.module.function(id))
    }

    fn func(&self) -> CompileResult<&Function<'arena>> {
        self.current_function().ok_or(CompileError::NoFunction)
    }

    fn func_mut(&mut self) -> CompileResult<&mut Function<'arena>> {
        let id = self.func.ok_or(CompileError::NoFunction)?;
        Ok(self.module.function_mut(id))
    }

    fn check_callee(&self, callee: FuncId) -> CompileResult<()> {
        if (callee.0 as usize) < self.module.functions.len() {
            Ok(())
        } else {
            Err(CompileError::InvalidValue {
                reason: format!("unknown function id {}", callee.0),
            })
        }
    }

    fn check_block(&self, block: BlockId) -> CompileResult<()> {
        self.func()?.block(block).map(|_| ())
    }

    /// Append an instruction at the insertion point.
    fn push_inst(&mut self, inst: Inst<'arena>) -> CompileResult<InstId> {
        let block = self.insert.ok_or(CompileError::NoInsertPoint)?;
        let func = self.func_mut()?;
        func.block(block)?;
        if func.is_terminated(block) {
            return Err(CompileError::BlockTerminated {
                block: func.block_label(block),
            });
        }

        let id = InstId(func.insts.len() as u32);
        trace!("{}: %{} = {}", func.block_label(block), id.0, inst.opcode());
        func.insts.push(inst);
        func.blocks[block.0 as usize].insts.push(id);
        Ok(id)
    }

    fn push_value(&mut self, inst: Inst<'arena>) -> CompileResult<Value> {
        self.push_inst(inst).map(Value::Inst)
    }
}

impl Builder for IrBuilder<'_> {
    fn begin_function(&mut self, name: &str) -> CompileResult<FuncId> {
        if let Some(open) = self.current_function() {
            return Err(CompileError::InvalidValue {
                reason: format!("cannot begin {} while {} is still open", name, open.name),
            });
        }
        let id = self.module.define_function(self.session, name)?;
        debug!("Begin function {}", name);
        self.func = Some(id);
        self.session.set_current_function(Some(name));

        let entry = self.create_block("entry")?;
        self.insert = Some(entry);
        Ok(id)
    }

    fn end_function(&mut self) -> CompileResult<()> {
        let func = self.func()?;
        ir::verify_function(func)?;
        debug!("End function {} ({} blocks)", func.name, func.blocks.len());
        self.session
            .record_function_compiled(func.name, func.blocks.len());

        self.func = None;
        self.insert = None;
        self.session.set_current_function(None);
        Ok(())
    }

    fn insert_block(&self) -> Option<BlockId> {
        self.insert
    }

    fn set_insert_block(&mut self, block: Option<BlockId>) {
        self.insert = block;
    }

    fn create_block(&mut self, name: &str) -> CompileResult<BlockId> {
        let name = self.session.intern_str(name);
        let func = self.func_mut()?;
        let id = BlockId(func.blocks.len() as u32);
        func.blocks.push(Block {
            name,
            insts: Vec::new(),
        });
        self.session.record_block_created();
        Ok(id)
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.current_function()
            .is_some_and(|func| func.is_terminated(block))
    }

    fn declare_function(&mut self, name: &str) -> FuncId {
        self.module.declare_function(self.session, name)
    }

    fn lookup_function(&self, name: &str) -> Option<FuncId> {
        self.module.lookup_function(name)
    }

    fn class_info(&mut self, class: &str) -> Value {
        let name = format!("{}.info", class);
        Value::Global(self.module.get_or_insert_global(self.session, &name))
    }

    fn personality(&mut self) -> CompileResult<Value> {
        let personality = self.require_function(runtime::PERSONALITY)?;
        self.func_mut()?.personality = Some(personality);
        Ok(Value::Func(personality))
    }

    fn emit_alloca(&mut self, name: &str) -> CompileResult<Value> {
        let name = self.session.intern_str(name);
        self.push_value(Inst::Alloca { name })
    }

    fn emit_call(&mut self, callee: FuncId, args: &[Value]) -> CompileResult<Value> {
        self.check_callee(callee)?;
        self.push_value(Inst::Call {
            callee,
            args: args.to_vec(),
        })
    }

    fn emit_invoke(
        &mut self,
        callee: FuncId,
        args: &[Value],
        normal: BlockId,
        unwind: BlockId,
    ) -> CompileResult<Value> {
        self.check_callee(callee)?;
        self.check_block(normal)?;
        self.check_block(unwind)?;
        self.push_value(Inst::Invoke {
            callee,
            args: args.to_vec(),
            normal,
            unwind,
        })
    }

    fn emit_pointer_cast(&mut self, value: Value) -> CompileResult<Value> {
        self.push_value(Inst::PtrCast { value })
    }

    fn emit_incomplete_selector(
        &mut self,
        selector: FuncId,
        exception: Value,
        personality: Value,
    ) -> CompileResult<Value> {
        self.check_callee(selector)?;
        self.push_value(Inst::Selector {
            callee: selector,
            exception,
            personality,
            clauses: None,
        })
    }

    fn complete_selector(&mut self, selector: Value, clauses: &[Value]) -> CompileResult<()> {
        let Value::Inst(id) = selector else {
            return Err(CompileError::InvalidValue {
                reason: format!("{:?} is not a selector", selector),
            });
        };
        let func = self.func_mut()?;
        match func.insts.get_mut(id.0 as usize) {
            Some(Inst::Selector { clauses: slot, .. }) => {
                if slot.is_some() {
                    return Err(CompileError::SelectorAlreadyComplete);
                }
                *slot = Some(clauses.to_vec());
                Ok(())
            }
            _ => Err(CompileError::InvalidValue {
                reason: format!("%{} is not a selector", id.0),
            }),
        }
    }

    fn emit_load(&mut self, slot: Value) -> CompileResult<Value> {
        self.push_value(Inst::Load { slot })
    }

    fn emit_store(&mut self, value: Value, slot: Value) -> CompileResult<()> {
        self.push_inst(Inst::Store { value, slot }).map(|_| ())
    }

    fn emit_icmp_eq(&mut self, lhs: Value, rhs: Value) -> CompileResult<Value> {
        self.push_value(Inst::ICmpEq { lhs, rhs })
    }

    fn emit_branch(&mut self, target: BlockId) -> CompileResult<()> {
        self.check_block(target)?;
        self.push_inst(Inst::Br { target }).map(|_| ())
    }

    fn emit_cond_branch(
        &mut self,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> CompileResult<()> {
        self.check_block(then_block)?;
        self.check_block(else_block)?;
        self.push_inst(Inst::CondBr {
            cond,
            then_block,
            else_block,
        })
        .map(|_| ())
    }

    fn emit_return(&mut self) -> CompileResult<()> {
        self.push_inst(Inst::Ret).map(|_| ())
    }

    fn emit_resume(&mut self) -> CompileResult<()> {
        self.push_inst(Inst::Resume).map(|_| ())
    }

    fn emit_unreachable(&mut self) -> CompileResult<()> {
        self.push_inst(Inst::Unreachable).map(|_| ())
    }

    fn suppress_cleanups(&self) -> bool {
        self.suppress_cleanups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_second_terminator_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut builder = IrBuilder::new(&session, "m");

        builder.begin_function("f").unwrap();
        let next = builder.create_block("next").unwrap();
        builder.emit_branch(next).unwrap();

        let err = builder.emit_branch(next).unwrap_err();
        assert_eq!(
            err,
            CompileError::BlockTerminated {
                block: "entry".to_string()
            }
        );
    }

    #[test]
    fn test_emit_without_function() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut builder = IrBuilder::new(&session, "m");

        assert_eq!(builder.emit_return(), Err(CompileError::NoInsertPoint));
        assert_eq!(builder.create_block("b"), Err(CompileError::NoFunction));
    }

    #[test]
    fn test_selector_completed_once() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut builder = IrBuilder::new(&session, "m");
        builder.begin_function("f").unwrap();

        let selector_fn = builder.require_function(runtime::SELECTOR_FUNCTION).unwrap();
        let personality = builder.personality().unwrap();
        let sel = builder
            .emit_incomplete_selector(selector_fn, Value::Null, personality)
            .unwrap();
        let info = builder.class_info("Error");

        builder.complete_selector(sel, &[info]).unwrap();
        assert_eq!(
            builder.complete_selector(sel, &[info]),
            Err(CompileError::SelectorAlreadyComplete)
        );

        builder.emit_return().unwrap();
        builder.end_function().unwrap();
        let text = builder.module().to_string();
        assert!(text.contains("define @f personality @__exception_personality"));
        assert!(text.contains("[@Error.info]"));
    }

    #[test]
    fn test_end_function_verifies() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut builder = IrBuilder::new(&session, "m");
        builder.begin_function("f").unwrap();

        let err = builder.end_function().unwrap_err();
        assert!(matches!(err, CompileError::Verification { .. }));
    }
}
