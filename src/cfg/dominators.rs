//! Dominator tree construction and queries (§4.3).
//!
//! A node `d` dominates node `n` if every path from the entry to `n` passes
//! through `d`. We lean on petgraph's Lengauer-Tarjan-derived
//! `simple_fast`, which gives a unique immediate dominator per reachable
//! node by construction — the "multiple immediate dominators" error exists
//! to make that invariant loud if it's ever violated (e.g. by a future
//! from-scratch dominance implementation), not because this path can
//! currently produce it.

use crate::cfg::analysis::find_entry;
use crate::cfg::Cfg;
use crate::error::{BrilError, Result};
use petgraph::algo::dominators::simple_fast;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Dominator tree for one function's CFG.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeIndex,
    immediate_dominator: HashMap<NodeIndex, Option<NodeIndex>>,
    children: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl DominatorTree {
    /// Compute the dominator tree of `cfg`. Returns `None` if the CFG is
    /// empty (no entry).
    pub fn new(cfg: &Cfg) -> Result<Option<Self>> {
        let Some(entry) = find_entry(cfg) else { return Ok(None) };
        let dominators = simple_fast(&cfg.graph, entry);

        let mut immediate_dominator = HashMap::new();
        let mut children: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();

        for node in cfg.graph.node_indices() {
            if !is_reachable(&dominators, entry, node) {
                continue;
            }
            let idom = dominators.immediate_dominator(node);
            immediate_dominator.insert(node, idom);
            if let Some(parent) = idom {
                children.entry(parent).or_default().push(node);
            }
        }

        Ok(Some(Self { root: entry, immediate_dominator, children }))
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn immediate_dominator(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.immediate_dominator.get(&node).copied().flatten()
    }

    pub fn dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(idom) = self.immediate_dominator(current) {
            if idom == a {
                return true;
            }
            current = idom;
        }
        false
    }

    pub fn strictly_dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        self.children.get(&node).map_or(&[], |v| v.as_slice())
    }

    /// The full dominator set of `node`, including itself: `{n} ∪ dom(idom(n))`.
    pub fn dominators(&self, node: NodeIndex) -> Dominators<'_> {
        Dominators { tree: self, current: Some(node) }
    }

    pub fn dom_set(&self, node: NodeIndex) -> HashSet<NodeIndex> {
        self.dominators(node).collect()
    }

    pub fn common_dominator(&self, a: NodeIndex, b: NodeIndex) -> Option<NodeIndex> {
        let a_doms: HashSet<NodeIndex> = self.dominators(a).collect();
        self.dominators(b).find(|d| a_doms.contains(d))
    }

    pub fn depth(&self, node: NodeIndex) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(idom) = self.immediate_dominator(current) {
            depth += 1;
            current = idom;
        }
        depth
    }
}

fn is_reachable(
    dominators: &petgraph::algo::dominators::Dominators<NodeIndex>,
    entry: NodeIndex,
    node: NodeIndex,
) -> bool {
    node == entry || dominators.immediate_dominator(node).is_some()
}

/// Slow, obviously-correct oracle for "`a` dominates `b`" (§4.3: "a slow
/// oracle (all entry→b paths contain a?) must be provided for verification
/// tests"). `a` dominates `b` iff every path from `entry` to `b` passes
/// through `a`, which is equivalent to: `b` is unreachable from `entry` in
/// the graph with `a` deleted (trivially true when `a == b`, and vacuously
/// true when `b` is unreachable from `entry` at all).
pub fn dominates_naive(cfg: &Cfg, entry: NodeIndex, a: NodeIndex, b: NodeIndex) -> bool {
    if a == b {
        return true;
    }
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut stack = vec![entry];
    while let Some(node) = stack.pop() {
        if node == a || !visited.insert(node) {
            continue;
        }
        if node == b {
            return false;
        }
        for succ in cfg.successors(node) {
            stack.push(succ);
        }
    }
    true
}

/// Guard used by callers that need to turn "more than one candidate idom"
/// into the §4.3 hard error instead of silently picking one.
pub fn assert_unique_idom(
    function: &str,
    block: &str,
    candidates: &HashSet<NodeIndex>,
) -> Result<()> {
    if candidates.len() > 1 {
        tracing::warn!(function, block, count = candidates.len(), "multiple immediate dominator candidates");
        return Err(BrilError::MultipleImmediateDominators {
            function: function.to_string(),
            block: block.to_string(),
            count: candidates.len(),
        });
    }
    Ok(())
}

pub struct Dominators<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeIndex>,
}

impl<'a> Iterator for Dominators<'a> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = self.tree.immediate_dominator(node);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Instr, Literal, Type};

    fn diamond() -> Function {
        Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("c", Type::Bool, Literal::Bool(true)),
                Instr::effect(EffectOp::Br, vec!["c".into()], vec!["t".into(), "e".into()]),
                Instr::label("t"),
                Instr::jmp("j"),
                Instr::label("e"),
                Instr::jmp("j"),
                Instr::label("j"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        }
    }

    #[test]
    fn entry_has_no_idom() {
        let cfg = build_cfg(&diamond()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap().unwrap();
        assert_eq!(tree.immediate_dominator(tree.root()), None);
    }

    #[test]
    fn join_idom_is_entry() {
        let cfg = build_cfg(&diamond()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap().unwrap();
        let join = cfg.node_by_name("j").unwrap();
        assert_eq!(tree.immediate_dominator(join), Some(tree.root()));
        assert!(tree.dominates(tree.root(), join));
    }

    #[test]
    fn branch_arms_do_not_dominate_each_other() {
        let cfg = build_cfg(&diamond()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap().unwrap();
        let t = cfg.node_by_name("t").unwrap();
        let e = cfg.node_by_name("e").unwrap();
        assert!(!tree.dominates(t, e));
        assert!(!tree.dominates(e, t));
    }

    #[test]
    fn empty_cfg_has_no_tree() {
        let f = Function { name: "empty".into(), args: vec![], ret_type: None, instrs: vec![] };
        let cfg = build_cfg(&f).unwrap();
        assert!(DominatorTree::new(&cfg).unwrap().is_none());
    }

    fn loop_with_branch() -> Function {
        Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("i", Type::Int, Literal::Int(0)),
                Instr::label("head"),
                Instr::value(ValueOp::Lt, "cond", Type::Bool, vec!["i".into(), "i".into()]),
                Instr::effect(EffectOp::Br, vec!["cond".into()], vec!["body".into(), "done".into()]),
                Instr::label("body"),
                Instr::value(ValueOp::Lt, "inner", Type::Bool, vec!["i".into(), "i".into()]),
                Instr::effect(EffectOp::Br, vec!["inner".into()], vec!["left".into(), "right".into()]),
                Instr::label("left"),
                Instr::jmp("latch"),
                Instr::label("right"),
                Instr::jmp("latch"),
                Instr::label("latch"),
                Instr::jmp("head"),
                Instr::label("done"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        }
    }

    /// Cross-check `DominatorTree::dominates` against the slow oracle
    /// (§4.3) over every ordered pair of reachable blocks, for both a
    /// diamond and a CFG with a loop and a nested branch.
    #[test]
    fn dominator_tree_agrees_with_naive_oracle() {
        for func in [diamond(), loop_with_branch()] {
            let cfg = build_cfg(&func).unwrap();
            let tree = DominatorTree::new(&cfg).unwrap().unwrap();
            let entry = cfg.entry().unwrap();
            let reachable: Vec<NodeIndex> = cfg.graph.node_indices().filter(|&n| tree.immediate_dominator(n).is_some() || n == entry).collect();

            for &a in &reachable {
                for &b in &reachable {
                    assert_eq!(
                        tree.dominates(a, b),
                        dominates_naive(&cfg, entry, a, b),
                        "disagreement on ({:?}, {:?}) in function `{}`",
                        cfg.block(a).name,
                        cfg.block(b).name,
                        func.name,
                    );
                }
            }
        }
    }
}
