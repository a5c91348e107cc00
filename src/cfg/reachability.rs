//! Reachability queries over a `Cfg`, used by TDCE's unreachable-block
//! pruning and by the linearizer's fallback ordering.

use crate::cfg::analysis::find_entry;
use crate::cfg::Cfg;
use petgraph::graph::NodeIndex;
use std::collections::{HashSet, VecDeque};

/// All blocks reachable from the entry, via BFS.
pub fn find_reachable(cfg: &Cfg) -> HashSet<NodeIndex> {
    let mut reachable = HashSet::new();
    let Some(entry) = find_entry(cfg) else { return reachable };

    let mut queue = VecDeque::new();
    queue.push_back(entry);
    reachable.insert(entry);

    while let Some(node) = queue.pop_front() {
        for succ in cfg.successors(node) {
            if reachable.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    reachable
}

pub fn find_unreachable(cfg: &Cfg) -> HashSet<NodeIndex> {
    let reachable = find_reachable(cfg);
    cfg.graph.node_indices().filter(|n| !reachable.contains(n)).collect()
}

pub fn is_reachable_from_entry(cfg: &Cfg, node: NodeIndex) -> bool {
    find_reachable(cfg).contains(&node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Instr};

    #[test]
    fn unreachable_label_is_pruned() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::effect(EffectOp::Ret, vec![], vec![]),
                Instr::label("dead"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let unreachable = find_unreachable(&cfg);
        assert_eq!(unreachable.len(), 1);
        let dead = cfg.node_by_name("dead").unwrap();
        assert!(unreachable.contains(&dead));
        assert!(!is_reachable_from_entry(&cfg, dead));
    }
}
