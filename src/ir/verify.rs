//! Structural verification of finished functions.
//!
//! A function is well formed when every block ends in exactly one terminator,
//! every branch target exists, and no catch selector is left incomplete.

use super::{Function, Inst, Module, Value};
use crate::core::{CompileError, CompileResult};

fn fail(func: &Function, reason: String) -> CompileError {
    CompileError::Verification {
        function: func.name.to_string(),
        reason,
    }
}

/// Verify a single function definition. Declarations always verify.
pub fn verify_function(func: &Function) -> CompileResult<()> {
    if func.declaration {
        return Ok(());
    }
    if func.blocks.is_empty() {
        return Err(fail(func, "function has no blocks".to_string()));
    }

    let block_count = func.blocks.len() as u32;
    let inst_count = func.insts.len() as u32;

    for (idx, block) in func.blocks.iter().enumerate() {
        let label = func.block_label(super::BlockId(idx as u32));
        let Some((last, body)) = block.insts.split_last() else {
            return Err(fail(func, format!("block {} is empty", label)));
        };

        if !func.inst(*last).is_terminator() {
            return Err(fail(func, format!("block {} has no terminator", label)));
        }
        if let Some(inner) = body.iter().find(|id| func.inst(**id).is_terminator()) {
            return Err(fail(
                func,
                format!("block {} has terminator %{} before its end", label, inner.0),
            ));
        }

        for inst_id in &block.insts {
            let inst = func.inst(*inst_id);
            if let Some(target) = inst.successors().into_iter().find(|b| b.0 >= block_count) {
                return Err(fail(
                    func,
                    format!("%{} branches to unknown block {}", inst_id.0, target.0),
                ));
            }
            if let Inst::Selector { clauses: None, .. } = inst {
                return Err(fail(
                    func,
                    format!("catch selector %{} in block {} was never completed", inst_id.0, label),
                ));
            }
            if let Some(bad) = operands(inst)
                .into_iter()
                .find(|v| matches!(v, Value::Inst(id) if id.0 >= inst_count))
            {
                return Err(fail(func, format!("%{} uses unknown value {:?}", inst_id.0, bad)));
            }
        }
    }

    Ok(())
}

/// Verify every function definition in the module.
pub fn verify_module(module: &Module) -> CompileResult<()> {
    module.functions.iter().try_for_each(verify_function)
}

fn operands(inst: &Inst) -> Vec<Value> {
    match inst {
        Inst::Call { args, .. } | Inst::Invoke { args, .. } => args.clone(),
        Inst::PtrCast { value } => vec![*value],
        Inst::Selector {
            exception,
            personality,
            clauses,
            ..
        } => {
            let mut ops = vec![*exception, *personality];
            if let Some(clauses) = clauses {
                ops.extend(clauses.iter().copied());
            }
            ops
        }
        Inst::Load { slot } => vec![*slot],
        Inst::Store { value, slot } => vec![*value, *slot],
        Inst::ICmpEq { lhs, rhs } => vec![*lhs, *rhs],
        Inst::CondBr { cond, .. } => vec![*cond],
        _ => Vec::new(),
    }
}
