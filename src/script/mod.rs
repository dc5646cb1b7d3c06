//! Scope script: a small text language for exercising scope and unwind lowering.
//!
//! A script lists functions whose bodies are made of scoped statements. It
//! is lowered through [`crate::context::Context`] exactly as a front end
//! would drive it, which makes it convenient for writing compiler tests
//! without a real front end.
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! func example {
//!   declare a release_a
//!   scope {
//!     declare b
//!     call may_throw
//!   }
//!   try {
//!     throw Error
//!   } catch Error {
//!     call handle
//!   }
//!   loop {
//!     break
//!   }
//!   return
//! }
//! ```
//!
//! `declare VAR` without a release function releases through
//! [`DEFAULT_RELEASE`].

use crate::builder::IrBuilder;
use crate::context::Context;
use crate::core::{CompilationSession, CompileResult};
use crate::ir::Module;

pub mod check;
pub mod lower;
pub mod parser;

pub use check::{CheckDirective, RunDirective, TestRunner, TestSpec};

/// Release function used by `declare` when none is named.
pub const DEFAULT_RELEASE: &str = "release";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub functions: Vec<ScriptFunction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFunction {
    pub name: String,
    pub body: Vec<Stmt>,
    /// Line of the `func` header.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Declare {
        var: String,
        release: Option<String>,
    },
    Call {
        callee: String,
    },
    Throw {
        class: String,
    },
    Return,
    Break,
    Scope(Vec<Stmt>),
    Loop(Vec<Stmt>),
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchArm>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchArm {
    pub class: String,
    pub body: Vec<Stmt>,
}

impl Script {
    pub fn parse(text: &str) -> CompileResult<Self> {
        parser::parse_script(text)
    }

    pub fn function(&self, name: &str) -> Option<&ScriptFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Options controlling how a script is compiled.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Forwarded to the backend's suppress-cleanups toggle.
    pub suppress_cleanups: bool,
}

/// Parse and lower `source` into a fresh module.
pub fn compile_script<'arena>(
    session: &'arena CompilationSession<'arena>,
    module_name: &str,
    source: &str,
    options: CompileOptions,
) -> CompileResult<Module<'arena>> {
    let script = Script::parse(source)?;

    let mut builder = IrBuilder::new(session, module_name);
    builder.set_suppress_cleanups(options.suppress_cleanups);
    {
        let mut ctx = Context::new(&mut builder, session);
        for func in &script.functions {
            lower::lower_function(&mut ctx, func)?;
        }
    }
    Ok(builder.into_module())
}
