/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compilation pipeline errors with serialization support
///
/// Compilation errors are values: once a compile task fails, the error is
/// captured into the cache slot for the key and observed by every current
/// and future caller of that key.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CompileError {
    #[error("compilation unit must be referenced by exactly one entrypoint symbol, got {0}")]
    #[diagnostic(
        code(compile::invalid_entrypoints),
        help("Pass a single entrypoint symbol in the compile request.")
    )]
    InvalidEntrypoints(usize),

    #[error("entrypoint symbol `{0}` not found in compilation unit")]
    #[diagnostic(
        code(compile::unknown_entrypoint),
        help("Check that the unit defines the requested symbol.")
    )]
    UnknownEntrypoint(String),

    #[error("compiler frontend failed: {0}")]
    #[diagnostic(
        code(compile::frontend),
        help("Inspect the frontend diagnostics for the failing unit.")
    )]
    Frontend(String),
}

/// Dispatch and execution errors with serialization support
///
/// Execution errors are carried per result slot; an error on one output
/// never suppresses a successful value on another.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ExecError {
    #[error("operand {index} conversion failed: {reason}")]
    #[diagnostic(
        code(exec::operand_conversion),
        help("The buffer layout does not match its metadata.")
    )]
    OperandConversion { index: usize, reason: String },

    #[error("operand {index} is not yet available")]
    #[diagnostic(
        code(exec::operand_unavailable),
        help("Await the producing computation before passing the buffer as an operand.")
    )]
    OperandUnavailable { index: usize },

    #[error("executable expects {expected} operands, got {actual}")]
    #[diagnostic(
        code(exec::arity_mismatch),
        help("The operand list must match the compiled function signature.")
    )]
    ArityMismatch { expected: usize, actual: usize },

    #[error("executable did not populate declared result {index}")]
    #[diagnostic(
        code(exec::unpopulated_result),
        help("The artifact broke its invocation contract. This is a bug in the kernel, not a runtime failure.")
    )]
    UnpopulatedResult { index: usize },

    #[error("kernel execution failed: {0}")]
    #[diagnostic(code(exec::kernel), help("Inspect the kernel diagnostics for the failing output."))]
    Kernel(String),

    #[error("specialization failed: {0}")]
    #[diagnostic(
        code(exec::specialization),
        help("The executable could not be specialized to the operand shapes.")
    )]
    Specialization(String),
}

/// Common result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Common result type for dispatch operations
pub type ExecResult<T> = Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::InvalidEntrypoints(3);
        assert!(err.to_string().contains("exactly one entrypoint"));
    }

    #[test]
    fn test_exec_error_is_clonable_for_broadcast() {
        let err = ExecError::OperandUnavailable { index: 1 };
        let copies = vec![err.clone(), err.clone(), err];
        assert!(copies.iter().all(|e| matches!(
            e,
            ExecError::OperandUnavailable { index: 1 }
        )));
    }

    #[test]
    fn test_error_serialization_tagging() {
        let err = ExecError::ArityMismatch {
            expected: 2,
            actual: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("arity_mismatch"));
        let back: ExecError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
