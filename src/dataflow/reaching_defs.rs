//! Reaching-definitions analysis: a forward, union-merge instance, and the
//! `_def_id` annotation pass LICM (§4.8) reads to decide hoist safety.

use crate::cfg::Cfg;
use crate::dataflow::{solve, BlockFacts, DataflowFact, Direction};
use crate::ir::Instr;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReachingDefs(pub HashSet<String>);

impl ReachingDefs {
    /// The variable name a def-site id like `x@bb3:2` names.
    pub fn var_of(def_id: &str) -> &str {
        def_id.split('@').next().unwrap_or(def_id)
    }
}

impl DataflowFact for ReachingDefs {
    fn seed(_cfg: &Cfg) -> Self {
        ReachingDefs(HashSet::new())
    }

    fn boundary(_cfg: &Cfg) -> Self {
        ReachingDefs(HashSet::new())
    }

    fn merge(facts: &[&Self]) -> Self {
        let mut out = HashSet::new();
        for f in facts {
            out.extend(f.0.iter().cloned());
        }
        ReachingDefs(out)
    }

    fn transfer(&self, instr: &Instr) -> Self {
        match (instr.dest(), &instr.def_id) {
            (Some(dest), Some(def_id)) => {
                let mut out: HashSet<String> =
                    self.0.iter().filter(|d| Self::var_of(d) != dest).cloned().collect();
                out.insert(def_id.clone());
                ReachingDefs(out)
            }
            _ => self.clone(),
        }
    }
}

/// Stamp every instruction with a unique `_def_id` of the form
/// `{var}@{block}:{index}`, the side channel LICM's hoist-safety check
/// reads back out of `Instr::def_id`.
pub fn annotate_def_sites(cfg: &mut Cfg) {
    let nodes: Vec<NodeIndex> = cfg.graph.node_indices().collect();
    for node in nodes {
        let block_name = cfg.block(node).name.clone();
        let block = cfg.block_mut(node);
        for (idx, instr) in block.instrs.iter_mut().enumerate() {
            if let Some(dest) = instr.dest() {
                instr.def_id = Some(format!("{dest}@{block_name}:{idx}"));
            }
        }
    }
}

pub fn analyze(cfg: &Cfg) -> HashMap<NodeIndex, BlockFacts<ReachingDefs>> {
    solve(cfg, Direction::Forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Literal, Type};

    #[test]
    fn later_def_replaces_earlier_reaching_def() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("x", Type::Int, Literal::Int(1)),
                Instr::const_("x", Type::Int, Literal::Int(2)),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let mut cfg = build_cfg(&f).unwrap();
        annotate_def_sites(&mut cfg);
        let facts = analyze(&cfg);
        let entry = cfg.entry().unwrap();
        let at_ret = &facts[&entry].before[2];
        assert_eq!(at_ret.0.len(), 1);
        assert!(at_ret.0.iter().next().unwrap().starts_with("x@"));
        assert!(at_ret.0.iter().next().unwrap().ends_with(":1"));
    }
}
