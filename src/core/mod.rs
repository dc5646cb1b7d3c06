//! Core unwindgen infrastructure.
//!
//! Shared building blocks used by the IR, the builder implementations and the
//! cleanup lowering:
//!
//! ## Session Management (`session`)
//! - Arena-based string interning using `bumpalo`
//! - Statistics describing how much unwind machinery was materialized
//!
//! ## Errors (`error`)
//! - `CompileError`, the internal-compiler-error taxonomy
//! - `CompileResult<T>`

pub mod error;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats};
