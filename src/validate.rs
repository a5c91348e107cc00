//! Whole-program malformed-input checks (§7) that sit above a single
//! function's CFG: duplicate function names, a missing `main` where one is
//! required, and unbalanced `speculate`/`commit` markers. Per-function
//! checks that naturally fall out of CFG construction (duplicate labels,
//! branches to undefined labels) live in `cfg::build_cfg` instead — there's
//! no reason to re-walk a function twice to find the same defect.

use crate::error::{BrilError, Result};
use crate::ir::{EffectOp, InstrKind, Program};
use std::collections::HashSet;

/// Reject a program with two functions sharing a name, or any function
/// whose `speculate`/`commit` markers don't nest to zero.
pub fn validate_program(program: &Program) -> Result<()> {
    let mut seen = HashSet::new();
    for func in &program.functions {
        if !seen.insert(func.name.as_str()) {
            return Err(BrilError::DuplicateFunction { name: func.name.clone() });
        }
    }

    for func in &program.functions {
        let mut open: Option<usize> = None;
        for (index, instr) in func.instrs.iter().enumerate() {
            if let InstrKind::Effect { op, .. } = &instr.kind {
                match op {
                    EffectOp::Speculate => {
                        if open.is_some() {
                            return Err(BrilError::UnmatchedSpeculate { function: func.name.clone(), index });
                        }
                        open = Some(index);
                    }
                    EffectOp::Commit => {
                        if open.take().is_none() {
                            return Err(BrilError::UnmatchedCommit { function: func.name.clone(), index });
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(index) = open {
            return Err(BrilError::UnmatchedSpeculate { function: func.name.clone(), index });
        }
    }

    Ok(())
}

/// Used by entry points (trace injection, any future driver) that require
/// a `main` function to exist.
pub fn require_main(program: &Program) -> Result<()> {
    if program.find_function("main").is_none() {
        return Err(BrilError::MissingMain);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EffectOp, Function, Instr};

    fn func(name: &str, instrs: Vec<Instr>) -> Function {
        Function { name: name.to_string(), args: vec![], ret_type: None, instrs }
    }

    #[test]
    fn duplicate_function_names_rejected() {
        let program = Program {
            functions: vec![
                func("main", vec![Instr::effect(EffectOp::Ret, vec![], vec![])]),
                func("main", vec![Instr::effect(EffectOp::Ret, vec![], vec![])]),
            ],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(matches!(err, BrilError::DuplicateFunction { .. }));
    }

    #[test]
    fn balanced_speculate_commit_accepted() {
        let program = Program {
            functions: vec![func(
                "main",
                vec![
                    Instr::effect(EffectOp::Speculate, vec![], vec![]),
                    Instr::effect(EffectOp::Commit, vec![], vec![]),
                    Instr::effect(EffectOp::Ret, vec![], vec![]),
                ],
            )],
        };
        assert!(validate_program(&program).is_ok());
    }

    #[test]
    fn speculate_without_commit_rejected() {
        let program = Program {
            functions: vec![func(
                "main",
                vec![
                    Instr::effect(EffectOp::Speculate, vec![], vec![]),
                    Instr::effect(EffectOp::Ret, vec![], vec![]),
                ],
            )],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(matches!(err, BrilError::UnmatchedSpeculate { .. }));
    }

    #[test]
    fn commit_without_speculate_rejected() {
        let program = Program {
            functions: vec![func(
                "main",
                vec![
                    Instr::effect(EffectOp::Commit, vec![], vec![]),
                    Instr::effect(EffectOp::Ret, vec![], vec![]),
                ],
            )],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(matches!(err, BrilError::UnmatchedCommit { .. }));
    }

    #[test]
    fn missing_main_reported_when_required() {
        let program = Program { functions: vec![func("helper", vec![])] };
        let err = require_main(&program).unwrap_err();
        assert!(matches!(err, BrilError::MissingMain));
    }
}
