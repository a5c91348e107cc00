//! Live-variable analysis: a backward, union-merge instance of the
//! dataflow framework.

use crate::cfg::Cfg;
use crate::dataflow::{solve, BlockFacts, DataflowFact, Direction};
use crate::ir::Instr;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveVars(pub HashSet<String>);

impl DataflowFact for LiveVars {
    fn seed(_cfg: &Cfg) -> Self {
        LiveVars(HashSet::new())
    }

    fn boundary(_cfg: &Cfg) -> Self {
        LiveVars(HashSet::new())
    }

    fn merge(facts: &[&Self]) -> Self {
        let mut out = HashSet::new();
        for f in facts {
            out.extend(f.0.iter().cloned());
        }
        LiveVars(out)
    }

    fn transfer(&self, instr: &Instr) -> Self {
        let mut out = self.0.clone();
        if let Some(dest) = instr.dest() {
            out.remove(dest);
        }
        for used in instr.uses() {
            out.insert(used.to_string());
        }
        LiveVars(out)
    }
}

pub fn analyze(cfg: &Cfg) -> HashMap<NodeIndex, BlockFacts<LiveVars>> {
    solve(cfg, Direction::Backward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Literal, Type, ValueOp};

    #[test]
    fn dead_store_is_not_live_out() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("a", Type::Int, Literal::Int(1)),
                Instr::const_("unused", Type::Int, Literal::Int(2)),
                Instr::value(ValueOp::Id, "r", Type::Int, vec!["a".into()]),
                Instr::effect(EffectOp::Print, vec!["r".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let facts = analyze(&cfg);
        let entry = cfg.entry().unwrap();
        let block = &facts[&entry];
        // live before the `print r` is {r}; `unused` never shows up anywhere.
        assert!(block.before[3].0.contains("r"));
        assert!(!block.before[0].0.contains("unused"));
    }
}
