//! Diagnostic taxonomy for the CORE.
//!
//! Every transform returns either a transformed program or one of these
//! fatal diagnostics — there are no partial transforms (if any function in
//! a program fails a precondition, the whole program rejects).

use thiserror::Error;

/// A fatal diagnostic raised by a CORE transform or analysis.
///
/// "Safety refusal" (LICM declining to hoist, LVN declining to fold a
/// division by zero) is deliberately *not* represented here: those paths
/// return `Ok` with the original instruction preserved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrilError {
    #[error("duplicate function name `{name}`")]
    DuplicateFunction { name: String },

    #[error("program has no function named `main`")]
    MissingMain,

    #[error("function `{function}` redefines label `{label}`")]
    DuplicateLabel { function: String, label: String },

    #[error("function `{function}` branches to undefined label `{label}`")]
    UndefinedLabel { function: String, label: String },

    #[error("function `{function}`: `speculate` at instruction {index} has no matching `commit`")]
    UnmatchedSpeculate { function: String, index: usize },

    #[error("function `{function}`: `commit` at instruction {index} has no matching `speculate`")]
    UnmatchedCommit { function: String, index: usize },

    #[error(
        "trace stop index {index} out of range for function `{function}` of length {length}"
    )]
    TraceStopIndexOutOfRange {
        function: String,
        index: i64,
        length: usize,
    },

    #[error("trace injection requested but `__trace_meta_main` is missing")]
    MissingTraceMeta,

    #[error("trace injection requires a function named `{name}`")]
    MissingTraceFunction { name: String },

    #[error("`__trace_meta_main` has no `__trace_stop_index` constant")]
    MissingTraceStopIndex,

    #[error("block `{block}` in function `{function}` has {count} immediate dominators, expected at most one")]
    MultipleImmediateDominators {
        function: String,
        block: String,
        count: usize,
    },

    #[error("SSA well-formedness violated in function `{function}`: {reason}")]
    IllFormedSsa { function: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BrilError>;
