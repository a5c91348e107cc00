//! Optimizations built on top of the CFG/dataflow/SSA primitives: local
//! value numbering with trivial dead-code elimination (§4.5–4.6), and
//! loop-invariant code motion (§4.8).

pub mod licm;
pub mod lvn;
pub mod tdce;
