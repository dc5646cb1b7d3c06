//! unwindgen - scope-exit and exception-unwind lowering.
//!
//! unwindgen is the part of a native code generation backend that turns
//! lexical scopes with cleanup obligations and try/catch statements into
//! explicit control flow: cleanups are emitted inline, most recently
//! constructed first, on every normal scope exit, and exceptions crossing a
//! scope boundary are routed through lazily built landing pads and cached
//! unwind chains that end in a catch dispatch or a resume.
//!
//! # Primary Usage
//!
//! ```ignore
//! use unwindgen::builder::IrBuilder;
//! use unwindgen::context::Context;
//! use unwindgen::core::CompilationSession;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut builder = IrBuilder::new(&session, "module");
//! let mut ctx = Context::new(&mut builder, &session);
//!
//! ctx.begin_function("f")?;
//! ctx.declare_variable("a", "release")?;
//! ctx.call_function("may_throw", &[])?;
//! ctx.end_function()?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (errors, arena session)
//! - [`ir`] - In-memory target IR, printer and verifier
//! - [`builder`] - Abstract code generation contract and its backends
//! - [`cleanup`] - Cleanup frames, unwind chains, landing pads, catch selectors
//! - [`context`] - Compilation context driving the cleanup core
//! - [`script`] - Scope script language and FileCheck-style test harness

pub mod builder;
pub mod cleanup;
pub mod context;
pub mod core;
pub mod ir;
pub mod script;

pub use builder::{Builder, IrBuilder, MockBuilder};
pub use cleanup::{CallCleanup, CleanupAction, CleanupFrame, FrameId};
pub use context::{Context, TryId};
pub use self::core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use ir::Module;
pub use script::{compile_script, CompileOptions, Script};
