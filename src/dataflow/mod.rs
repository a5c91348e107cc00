//! A generic dataflow analysis framework (§4.4), instantiated below for
//! liveness, reaching definitions, and available expressions.
//!
//! Mirrors the shape of the original course's `DataFlowFact` base class: a
//! lattice value with a merge operator, a per-instruction transfer
//! function, and a direction. The solver itself is a single FIFO-worklist
//! fixpoint loop shared by every instance — only `seed`, `boundary`,
//! `merge`, and `transfer` vary per analysis.

pub mod available_exprs;
pub mod liveness;
pub mod reaching_defs;

use crate::cfg::analysis::find_exits;
use crate::cfg::Cfg;
use crate::ir::Instr;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// One dataflow lattice value plus its transfer function.
///
/// `seed` doubles as both the initial value assigned to every non-boundary
/// block before the first iteration, and the identity returned when a
/// block's predecessor/successor set (at the boundary) is empty — for
/// union-style (liveness, reaching defs) analyses this is the empty set;
/// for the intersection-style available-expressions analysis it's the
/// universe of expressions appearing in the function.
pub trait DataflowFact: Clone + PartialEq {
    fn seed(cfg: &Cfg) -> Self;
    fn boundary(cfg: &Cfg) -> Self;
    fn merge(facts: &[&Self]) -> Self;
    fn transfer(&self, instr: &Instr) -> Self;
}

#[derive(Debug, Clone)]
pub struct BlockFacts<F> {
    pub in_fact: F,
    pub out_fact: F,
    /// `before[i]` holds immediately before `instrs[i]` executes, for
    /// either direction.
    pub before: Vec<F>,
}

pub fn solve<F: DataflowFact>(cfg: &Cfg, direction: Direction) -> HashMap<NodeIndex, BlockFacts<F>> {
    let nodes: Vec<NodeIndex> = cfg.graph.node_indices().collect();
    let seed = F::seed(cfg);
    let boundary_value = F::boundary(cfg);

    let mut in_fact: HashMap<NodeIndex, F> = nodes.iter().map(|&n| (n, seed.clone())).collect();
    let mut out_fact: HashMap<NodeIndex, F> = nodes.iter().map(|&n| (n, seed.clone())).collect();

    let boundary_nodes: HashSet<NodeIndex> = match direction {
        Direction::Forward => cfg.entry().into_iter().collect(),
        Direction::Backward => find_exits(cfg).into_iter().collect(),
    };
    for &b in &boundary_nodes {
        match direction {
            Direction::Forward => { in_fact.insert(b, boundary_value.clone()); }
            Direction::Backward => { out_fact.insert(b, boundary_value.clone()); }
        }
    }

    let mut worklist: VecDeque<NodeIndex> = nodes.iter().copied().collect();
    let mut queued: HashSet<NodeIndex> = nodes.iter().copied().collect();

    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);

        match direction {
            Direction::Forward => {
                if !boundary_nodes.contains(&node) {
                    let preds: Vec<NodeIndex> = cfg.predecessors(node).collect();
                    let facts: Vec<&F> = preds.iter().map(|p| &out_fact[p]).collect();
                    let merged = if facts.is_empty() { seed.clone() } else { F::merge(&facts) };
                    in_fact.insert(node, merged);
                }
                let mut cur = in_fact[&node].clone();
                for instr in &cfg.block(node).instrs {
                    cur = cur.transfer(instr);
                }
                if cur != out_fact[&node] {
                    out_fact.insert(node, cur);
                    for succ in cfg.successors(node) {
                        if queued.insert(succ) {
                            worklist.push_back(succ);
                        }
                    }
                }
            }
            Direction::Backward => {
                if !boundary_nodes.contains(&node) {
                    let succs: Vec<NodeIndex> = cfg.successors(node).collect();
                    let facts: Vec<&F> = succs.iter().map(|s| &in_fact[s]).collect();
                    let merged = if facts.is_empty() { seed.clone() } else { F::merge(&facts) };
                    out_fact.insert(node, merged);
                }
                let mut cur = out_fact[&node].clone();
                for instr in cfg.block(node).instrs.iter().rev() {
                    cur = cur.transfer(instr);
                }
                if cur != in_fact[&node] {
                    in_fact.insert(node, cur);
                    for pred in cfg.predecessors(node) {
                        if queued.insert(pred) {
                            worklist.push_back(pred);
                        }
                    }
                }
            }
        }
    }

    let mut result = HashMap::new();
    for &node in &nodes {
        let instrs = &cfg.block(node).instrs;
        let before = match direction {
            Direction::Forward => {
                let mut cur = in_fact[&node].clone();
                let mut out = Vec::with_capacity(instrs.len());
                for instr in instrs {
                    out.push(cur.clone());
                    cur = cur.transfer(instr);
                }
                out
            }
            Direction::Backward => {
                let mut cur = out_fact[&node].clone();
                let mut rev = Vec::with_capacity(instrs.len());
                for instr in instrs.iter().rev() {
                    cur = cur.transfer(instr);
                    rev.push(cur.clone());
                }
                rev.reverse();
                rev
            }
        };
        result.insert(
            node,
            BlockFacts { in_fact: in_fact[&node].clone(), out_fact: out_fact[&node].clone(), before },
        );
    }
    result
}
