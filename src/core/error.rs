// This module defines error types for unwindgen using the thiserror crate. CompileError
// covers the internal-compiler-error class of failures raised while lowering scope exits:
// missing runtime primitives (the exception retrieval intrinsic, the selector function,
// the personality), missing implicit scope variables, insertion point misuse, attempts to
// append after a block terminator, cleanup actions that leave their unwind block open,
// double completion of a catch selector, frame stack misuse, and IR verification
// failures. Script errors are the only user-facing variant; they come from the scope
// script parser used by tests and the unwindc driver. CompileResult<T> is the
// convenience alias used throughout the crate.

//! Error types for the unwindgen backend.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Main error type for scope and unwind lowering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Missing runtime primitive: {name}")]
    MissingIntrinsic {
        name: String,
    },

    #[error("Implicit scope variable not declared: {name}")]
    MissingScopeVariable {
        name: String,
    },

    #[error("No insertion point set")]
    NoInsertPoint,

    #[error("No function is being compiled")]
    NoFunction,

    #[error("Unknown block: {block}")]
    UnknownBlock {
        block: u32,
    },

    #[error("Block {block} already ends in a terminator")]
    BlockTerminated {
        block: String,
    },

    #[error("Cleanup action left unwind block {block} without a terminator")]
    UnterminatedCleanup {
        block: String,
    },

    #[error("Catch selector was already completed")]
    SelectorAlreadyComplete,

    #[error("Invalid value: {reason}")]
    InvalidValue {
        reason: String,
    },

    #[error("Cleanup frame stack error: {reason}")]
    FrameStack {
        reason: String,
    },

    #[error("Verification of {function} failed: {reason}")]
    Verification {
        function: String,
        reason: String,
    },

    #[error("Script error at line {line}: {reason}")]
    Script {
        line: usize,
        reason: String,
    },
}

impl CompileError {
    pub(crate) fn frame_stack(reason: impl Into<String>) -> Self {
        CompileError::FrameStack {
            reason: reason.into(),
        }
    }

    /// Whether this error is an internal compiler error rather than a problem
    /// with the input handed to the backend.
    pub fn is_internal(&self) -> bool {
        !matches!(self, CompileError::Script { .. })
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompileError::MissingIntrinsic {
            name: "llvm.eh.exception".to_string(),
        };
        assert_eq!(err.to_string(), "Missing runtime primitive: llvm.eh.exception");
        assert!(err.is_internal());

        let err = CompileError::Script {
            line: 3,
            reason: "expected '{'".to_string(),
        };
        assert!(!err.is_internal());
        assert!(err.to_string().contains("line 3"));
    }
}
