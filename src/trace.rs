//! Trace injection (§4.9): splice a recorded fast-path trace into `main`
//! as a speculated region, falling back to the original body on abort.
//!
//! Grounded directly on
//! `examples/original_source/lesson12/trace_inject.py`: the reserved
//! names, the stop-index lookup from `__trace_meta_main`, and the
//! `speculate; <trace>; commit; jmp cont; label __trace_abort; <original
//! main>` shape are all the same transform, just type-checked.

use crate::error::{BrilError, Result};
use crate::ir::{EffectOp, Instr, Program};

pub const TRACE_FUNC_NAME: &str = "__trace_main";
pub const TRACE_META_FUNC_NAME: &str = "__trace_meta_main";
pub const ABORT_LABEL: &str = "__trace_abort";
pub const CONTINUATION_LABEL: &str = "__trace_continuation";

/// Read `__trace_stop_index` out of `__trace_meta_main`'s body — a single
/// `const` assignment per §4.9's input contract.
fn stop_index_from_meta(program: &Program) -> Result<i64> {
    let meta = program
        .find_function(TRACE_META_FUNC_NAME)
        .ok_or(BrilError::MissingTraceMeta)?;

    for instr in &meta.instrs {
        if let crate::ir::InstrKind::Const { dest, value, .. } = &instr.kind {
            if dest == "__trace_stop_index" {
                return value.as_int().ok_or(BrilError::MissingTraceStopIndex);
            }
        }
    }
    Err(BrilError::MissingTraceStopIndex)
}

/// Inject `__trace_main` into `main`, guarded by `speculate`/`commit`, with
/// `__trace_abort` resuming the original body on rollback.
///
/// Validates `0 <= stop_index <= main.instrs.len()` (§4.9 step 1); reuses
/// an existing label at that position as the continuation point rather
/// than inserting a redundant fresh one.
pub fn inject_trace(program: &Program) -> Result<Program> {
    let main = program
        .find_function("main")
        .ok_or_else(|| BrilError::MissingTraceFunction { name: "main".to_string() })?
        .clone();
    let trace = program
        .find_function(TRACE_FUNC_NAME)
        .ok_or_else(|| BrilError::MissingTraceFunction { name: TRACE_FUNC_NAME.to_string() })?
        .clone();

    let stop_index = stop_index_from_meta(program)?;
    if stop_index < 0 || stop_index as usize > main.instrs.len() {
        return Err(BrilError::TraceStopIndexOutOfRange {
            function: main.name.clone(),
            index: stop_index,
            length: main.instrs.len(),
        });
    }
    let stop_index = stop_index as usize;

    let mut main_instrs = main.instrs.clone();
    let cont_label = match main_instrs.get(stop_index).and_then(|i| i.label_name()) {
        Some(existing) => existing.to_string(),
        None => {
            main_instrs.insert(stop_index, Instr::label(CONTINUATION_LABEL));
            CONTINUATION_LABEL.to_string()
        }
    };
    tracing::debug!(function = %main.name, continuation = %cont_label, "resolved trace continuation label");

    let mut new_instrs = Vec::with_capacity(trace.instrs.len() + main_instrs.len() + 4);
    new_instrs.push(Instr::effect(EffectOp::Speculate, Vec::new(), Vec::new()));
    new_instrs.extend(trace.instrs.iter().cloned());
    new_instrs.push(Instr::effect(EffectOp::Commit, Vec::new(), Vec::new()));
    new_instrs.push(Instr::jmp(cont_label));
    new_instrs.push(Instr::label(ABORT_LABEL));
    new_instrs.extend(main_instrs);

    let new_main = crate::ir::Function { instrs: new_instrs, ..main };

    let functions = program
        .functions
        .iter()
        .filter(|f| f.name != TRACE_FUNC_NAME && f.name != TRACE_META_FUNC_NAME)
        .map(|f| if f.name == "main" { new_main.clone() } else { f.clone() })
        .collect();

    Ok(Program { functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Literal, Type};

    fn program_with_trace(stop_index: i64) -> Program {
        let main = Function {
            name: "main".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("x", Type::Int, Literal::Int(1)),
                Instr::const_("y", Type::Int, Literal::Int(2)),
                Instr::effect(EffectOp::Print, vec!["y".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let trace = Function {
            name: TRACE_FUNC_NAME.into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::value(crate::ir::ValueOp::Eq, "guard_ok".into(), Type::Bool, vec!["x".into(), "x".into()]),
                Instr::effect(EffectOp::Guard, vec!["guard_ok".into()], vec![ABORT_LABEL.into()]),
                Instr::const_("z", Type::Int, Literal::Int(3)),
            ],
        };
        let meta = Function {
            name: TRACE_META_FUNC_NAME.into(),
            args: vec![],
            ret_type: None,
            instrs: vec![Instr::const_("__trace_stop_index", Type::Int, Literal::Int(stop_index))],
        };
        Program { functions: vec![main, trace, meta] }
    }

    #[test]
    fn splices_trace_with_speculate_commit_abort() {
        let program = program_with_trace(2);
        let out = inject_trace(&program).unwrap();
        assert_eq!(out.functions.len(), 1);
        let main = out.find_function("main").unwrap();

        assert!(matches!(
            main.instrs[0].kind,
            crate::ir::InstrKind::Effect { op: EffectOp::Speculate, .. }
        ));
        assert!(main.instrs.iter().any(|i| i.dest() == Some("guard_ok")));
        assert!(main.instrs.iter().any(|i| matches!(
            &i.kind,
            crate::ir::InstrKind::Effect { op: EffectOp::Commit, .. }
        )));
        assert!(main.instrs.iter().any(|i| i.label_name() == Some(ABORT_LABEL)));
        // Original body (x, y, print, ret) still present after the abort label.
        let abort_pos = main.instrs.iter().position(|i| i.label_name() == Some(ABORT_LABEL)).unwrap();
        assert!(main.instrs[abort_pos..].iter().any(|i| i.dest() == Some("x")));
        assert!(main.instrs[abort_pos..].iter().any(|i| i.dest() == Some("y")));
    }

    #[test]
    fn trace_and_meta_functions_are_removed() {
        let program = program_with_trace(2);
        let out = inject_trace(&program).unwrap();
        assert!(out.find_function(TRACE_FUNC_NAME).is_none());
        assert!(out.find_function(TRACE_META_FUNC_NAME).is_none());
    }

    #[test]
    fn reuses_existing_label_as_continuation() {
        let mut program = program_with_trace(2);
        {
            let main = program.functions.iter_mut().find(|f| f.name == "main").unwrap();
            main.instrs.insert(2, Instr::label("already_here"));
        }
        let out = inject_trace(&program).unwrap();
        let main = out.find_function("main").unwrap();
        let jmp = main.instrs.iter().find(|i| i.labels().first().map(String::as_str) == Some("already_here"));
        assert!(jmp.is_some());
        assert!(!main.instrs.iter().any(|i| i.label_name() == Some(CONTINUATION_LABEL)));
    }

    #[test]
    fn rejects_out_of_range_stop_index() {
        let program = program_with_trace(999);
        let err = inject_trace(&program).unwrap_err();
        assert!(matches!(err, BrilError::TraceStopIndexOutOfRange { .. }));
    }

    #[test]
    fn rejects_missing_meta_function() {
        let mut program = program_with_trace(2);
        program.functions.retain(|f| f.name != TRACE_META_FUNC_NAME);
        let err = inject_trace(&program).unwrap_err();
        assert!(matches!(err, BrilError::MissingTraceMeta));
    }
}
