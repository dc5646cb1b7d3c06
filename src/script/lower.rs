//! Lowering of scope scripts through the compilation context.

use super::{ScriptFunction, Stmt, DEFAULT_RELEASE};
use crate::context::Context;
use crate::core::CompileResult;
use log::debug;

pub fn lower_function(ctx: &mut Context<'_, '_>, func: &ScriptFunction) -> CompileResult<()> {
    debug!("Lowering function {} (line {})", func.name, func.line);
    ctx.begin_function(&func.name)?;
    lower_block(ctx, &func.body)?;
    ctx.end_function()
}

fn lower_block(ctx: &mut Context<'_, '_>, stmts: &[Stmt]) -> CompileResult<()> {
    for stmt in stmts {
        lower_stmt(ctx, stmt)?;
    }
    Ok(())
}

fn lower_stmt(ctx: &mut Context<'_, '_>, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
        Stmt::Declare { var, release } => {
            ctx.ensure_insert_block()?;
            ctx.declare_variable(var, release.as_deref().unwrap_or(DEFAULT_RELEASE))?;
        }
        Stmt::Call { callee } => {
            ctx.ensure_insert_block()?;
            ctx.call_function(callee, &[])?;
        }
        Stmt::Throw { class } => {
            ctx.ensure_insert_block()?;
            ctx.emit_throw(class)?;
        }
        Stmt::Return => {
            ctx.ensure_insert_block()?;
            ctx.emit_return()?;
        }
        Stmt::Break => {
            ctx.ensure_insert_block()?;
            ctx.emit_break()?;
        }
        Stmt::Scope(body) => {
            ctx.push_frame();
            lower_block(ctx, body)?;
            ctx.pop_frame()?;
        }
        Stmt::Loop(body) => {
            ctx.begin_loop()?;
            lower_block(ctx, body)?;
            ctx.end_loop()?;
        }
        Stmt::Try { body, catches } => {
            ctx.ensure_insert_block()?;
            ctx.begin_try()?;
            lower_block(ctx, body)?;
            for arm in catches {
                ctx.begin_catch(&arm.class)?;
                lower_block(ctx, &arm.body)?;
            }
            ctx.end_try()?;
        }
    }
    Ok(())
}
