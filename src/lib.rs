//! The CORE of a compiler middle-end for a small teaching IR: per-function
//! control-flow graphs, dominance, a generic dataflow framework (liveness,
//! reaching definitions, available expressions), local value numbering,
//! trivial dead-code elimination, SSA construction/destruction via
//! get/set shadow variables, loop-invariant code motion, trace injection,
//! and a CFG linearizer.
//!
//! This crate is a library only: the textual/JSON front end, the
//! interpreter, CLI argument parsing, and test-suite file I/O are all
//! external collaborators (§1). Every transform here is a plain function
//! from a `Program` (or `Function`) to a `Result<...>` — never a mutation
//! visible to the caller, and never partial: if any function in a program
//! fails a precondition, the whole program is rejected (§7).

pub mod cfg;
pub mod dataflow;
pub mod error;
pub mod ir;
pub mod opt;
pub mod ssa;
pub mod trace;
pub mod validate;

pub use error::{BrilError, Result};
pub use ir::{Function, Instr, Program};
