//! Available-expressions analysis: a forward, intersection-merge ("must")
//! instance. The universe is the set of pure expressions syntactically
//! present in the function — there is no way to represent "all possible
//! expressions" generically, so `seed` enumerates it once up front and
//! every non-boundary block starts there, matching the bottom/top seeding
//! the original analysis uses (boundary = empty, everywhere else = universe).

use crate::cfg::Cfg;
use crate::dataflow::{solve, BlockFacts, DataflowFact, Direction};
use crate::ir::{Instr, InstrKind, ValueOp};
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

pub type ExprKey = (ValueOp, Vec<String>);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvailableExprs(pub HashSet<ExprKey>);

impl DataflowFact for AvailableExprs {
    fn seed(cfg: &Cfg) -> Self {
        let mut universe = HashSet::new();
        for node in cfg.graph.node_weights() {
            for instr in &node.instrs {
                if let Some(key) = expr_key(instr) {
                    universe.insert(key);
                }
            }
        }
        AvailableExprs(universe)
    }

    fn boundary(_cfg: &Cfg) -> Self {
        AvailableExprs(HashSet::new())
    }

    fn merge(facts: &[&Self]) -> Self {
        let mut iter = facts.iter();
        let Some(first) = iter.next() else { return AvailableExprs(HashSet::new()) };
        let mut out = first.0.clone();
        for f in iter {
            out = out.intersection(&f.0).cloned().collect();
        }
        AvailableExprs(out)
    }

    fn transfer(&self, instr: &Instr) -> Self {
        let mut out = self.0.clone();
        if let Some(dest) = instr.dest() {
            out.retain(|(_, args)| !args.iter().any(|a| a == dest));
        }
        if let Some(key) = expr_key(instr) {
            out.insert(key);
        }
        AvailableExprs(out)
    }
}

fn expr_key(instr: &Instr) -> Option<ExprKey> {
    match &instr.kind {
        InstrKind::Value { op, args, .. } if op.is_pure_expr() => Some((*op, args.clone())),
        _ => None,
    }
}

pub fn analyze(cfg: &Cfg) -> HashMap<NodeIndex, BlockFacts<AvailableExprs>> {
    solve(cfg, Direction::Forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Literal, Type};

    #[test]
    fn redefining_operand_kills_availability() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("a", Type::Int, Literal::Int(1)),
                Instr::const_("b", Type::Int, Literal::Int(2)),
                Instr::value(ValueOp::Add, "sum", Type::Int, vec!["a".into(), "b".into()]),
                Instr::const_("a", Type::Int, Literal::Int(3)),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let facts = analyze(&cfg);
        let entry = cfg.entry().unwrap();
        let key = (ValueOp::Add, vec!["a".to_string(), "b".to_string()]);
        assert!(facts[&entry].before[3].0.contains(&key));
        assert!(!facts[&entry].before[4].0.contains(&key));
    }
}
