//! Recording backend used as a test double.
//!
//! `MockBuilder` performs no real code generation: every operation is logged
//! as a line of text and blocks/values are handed out from counters. Like the
//! mock backends front-end tests run against, it suppresses cleanups unless
//! told otherwise.

use super::Builder;
use crate::core::{CompileError, CompileResult};
use crate::ir::{runtime, BlockId, FuncId, InstId, Value};
use hashbrown::{HashMap, HashSet};

#[derive(Debug)]
pub struct MockBuilder {
    /// Emitted operations, in order.
    pub ops: Vec<String>,
    functions: Vec<String>,
    function_index: HashMap<String, FuncId>,
    blocks: u32,
    values: u32,
    terminated: HashSet<BlockId>,
    insert: Option<BlockId>,
    in_function: bool,
    suppress_cleanups: bool,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            ops: Vec::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            blocks: 0,
            values: 0,
            terminated: HashSet::new(),
            insert: None,
            in_function: false,
            suppress_cleanups: true,
        };
        for name in runtime::ALL {
            builder.declare_function(name);
        }
        builder
    }

    pub fn set_suppress_cleanups(&mut self, suppress: bool) {
        self.suppress_cleanups = suppress;
    }

    /// Operations whose text starts with `prefix`.
    pub fn ops_matching(&self, prefix: &str) -> Vec<&str> {
        self.ops
            .iter()
            .filter(|op| op.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    fn name(&self, func: FuncId) -> &str {
        self.functions
            .get(func.0 as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    fn record(&mut self, op: String) -> CompileResult<()> {
        let block = self.insert.ok_or(CompileError::NoInsertPoint)?;
        if self.terminated.contains(&block) {
            return Err(CompileError::BlockTerminated {
                block: format!("b{}", block.0),
            });
        }
        self.ops.push(op);
        Ok(())
    }

    fn record_value(&mut self, op: String) -> CompileResult<Value> {
        self.record(op)?;
        self.values += 1;
        Ok(Value::Inst(InstId(self.values - 1)))
    }

    fn terminate(&mut self, op: String) -> CompileResult<()> {
        self.record(op)?;
        if let Some(block) = self.insert {
            self.terminated.insert(block);
        }
        Ok(())
    }
}

impl Builder for MockBuilder {
    fn begin_function(&mut self, name: &str) -> CompileResult<FuncId> {
        let id = self.declare_function(name);
        self.in_function = true;
        let entry = self.create_block("entry")?;
        self.insert = Some(entry);
        Ok(id)
    }

    fn end_function(&mut self) -> CompileResult<()> {
        if !self.in_function {
            return Err(CompileError::NoFunction);
        }
        self.in_function = false;
        self.insert = None;
        Ok(())
    }

    fn insert_block(&self) -> Option<BlockId> {
        self.insert
    }

    fn set_insert_block(&mut self, block: Option<BlockId>) {
        self.insert = block;
    }

    fn create_block(&mut self, name: &str) -> CompileResult<BlockId> {
        if !self.in_function {
            return Err(CompileError::NoFunction);
        }
        self.blocks += 1;
        let id = BlockId(self.blocks - 1);
        self.ops.push(format!("block b{} {}", id.0, name));
        Ok(id)
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.terminated.contains(&block)
    }

    fn declare_function(&mut self, name: &str) -> FuncId {
        if let Some(&id) = self.function_index.get(name) {
            return id;
        }
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(name.to_string());
        self.function_index.insert(name.to_string(), id);
        id
    }

    fn lookup_function(&self, name: &str) -> Option<FuncId> {
        self.function_index.get(name).copied()
    }

    fn class_info(&mut self, _class: &str) -> Value {
        Value::Null
    }

    fn personality(&mut self) -> CompileResult<Value> {
        self.require_function(runtime::PERSONALITY).map(Value::Func)
    }

    fn emit_alloca(&mut self, name: &str) -> CompileResult<Value> {
        self.record_value(format!("alloca {}", name))
    }

    fn emit_call(&mut self, callee: FuncId, args: &[Value]) -> CompileResult<Value> {
        let op = format!("call {} {}", self.name(callee), args.len());
        self.record_value(op)
    }

    fn emit_invoke(
        &mut self,
        callee: FuncId,
        args: &[Value],
        normal: BlockId,
        unwind: BlockId,
    ) -> CompileResult<Value> {
        let op = format!(
            "invoke {} {} b{} b{}",
            self.name(callee),
            args.len(),
            normal.0,
            unwind.0
        );
        self.terminate(op)?;
        self.values += 1;
        Ok(Value::Inst(InstId(self.values - 1)))
    }

    fn emit_pointer_cast(&mut self, _value: Value) -> CompileResult<Value> {
        self.record_value("ptrcast".to_string())
    }

    fn emit_incomplete_selector(
        &mut self,
        selector: FuncId,
        _exception: Value,
        _personality: Value,
    ) -> CompileResult<Value> {
        let op = format!("selector {}", self.name(selector));
        self.record_value(op)
    }

    fn complete_selector(&mut self, _selector: Value, clauses: &[Value]) -> CompileResult<()> {
        self.ops.push(format!("complete selector {}", clauses.len()));
        Ok(())
    }

    fn emit_load(&mut self, _slot: Value) -> CompileResult<Value> {
        self.record_value("load".to_string())
    }

    fn emit_store(&mut self, _value: Value, _slot: Value) -> CompileResult<()> {
        self.record("store".to_string())
    }

    fn emit_icmp_eq(&mut self, _lhs: Value, _rhs: Value) -> CompileResult<Value> {
        self.record_value("icmp".to_string())
    }

    fn emit_branch(&mut self, target: BlockId) -> CompileResult<()> {
        self.terminate(format!("br b{}", target.0))
    }

    fn emit_cond_branch(
        &mut self,
        _cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> CompileResult<()> {
        self.terminate(format!("condbr b{} b{}", then_block.0, else_block.0))
    }

    fn emit_return(&mut self) -> CompileResult<()> {
        self.terminate("ret".to_string())
    }

    fn emit_resume(&mut self) -> CompileResult<()> {
        self.terminate("resume".to_string())
    }

    fn emit_unreachable(&mut self) -> CompileResult<()> {
        self.terminate("unreachable".to_string())
    }

    fn suppress_cleanups(&self) -> bool {
        self.suppress_cleanups
    }
}
