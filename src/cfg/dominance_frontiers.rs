//! Dominance frontier computation (§4.3).
//!
//! `DF(n)` is the set of nodes `v` such that `n` dominates some predecessor
//! of `v` but does not strictly dominate `v` itself — the join points where
//! `n`'s dominated region meets control from elsewhere. This is exactly
//! what SSA construction (§4.7) uses to place phi placeholders.
//!
//! Computed with the standard Cytron et al. local+up rule driven off the
//! immediate-dominator map directly; no tree recursion is needed; at no
//! point do we recurse over the dominator tree itself.

use crate::cfg::dominators::DominatorTree;
use crate::cfg::Cfg;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct DominanceFrontiers {
    frontier: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

impl DominanceFrontiers {
    pub fn new(cfg: &Cfg, dom_tree: &DominatorTree) -> Self {
        let mut frontier: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
        for node in cfg.graph.node_indices() {
            frontier.entry(node).or_default();
        }

        for node in cfg.graph.node_indices() {
            let preds: Vec<_> = cfg.predecessors(node).collect();
            if preds.len() < 2 {
                continue;
            }
            let idom = match dom_tree.immediate_dominator(node) {
                Some(i) => i,
                None => continue,
            };
            for pred in preds {
                let mut runner = pred;
                while runner != idom {
                    frontier.entry(runner).or_default().insert(node);
                    match dom_tree.immediate_dominator(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }

        Self { frontier }
    }

    pub fn frontier(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.frontier.get(&node).into_iter().flatten().copied()
    }

    /// The iterated dominance frontier of a set of definition sites: the
    /// fixpoint of repeatedly adding `DF(n)` for every `n` already in the
    /// set, used to place `get`/`set` phi surrogates (§4.7).
    pub fn iterated_frontier(&self, seeds: &HashSet<NodeIndex>) -> HashSet<NodeIndex> {
        let mut result = HashSet::new();
        let mut worklist: Vec<NodeIndex> = seeds.iter().copied().collect();
        let mut seen: HashSet<NodeIndex> = seeds.clone();

        while let Some(node) = worklist.pop() {
            for df_node in self.frontier(node) {
                if result.insert(df_node) && seen.insert(df_node) {
                    worklist.push(df_node);
                }
            }
        }
        result
    }
}
