//! Control-flow graph construction (§4.1).
//!
//! A `Cfg` is built fresh from a `Function` by every transform that needs
//! one; nothing here holds a CFG across transforms. Nodes own their
//! instructions (cloned out of the function body); `Cfg::linearize` is the
//! only way back to a flat instruction list.

pub mod analysis;
pub mod dominance_frontiers;
pub mod dominators;
pub mod edge;
pub mod linearize;
pub mod loops;
pub mod reachability;

pub use dominance_frontiers::DominanceFrontiers;
pub use dominators::DominatorTree;
pub use edge::EdgeKind;
pub use loops::NaturalLoop;

use crate::error::{BrilError, Result};
use crate::ir::{EffectOp, Function, Instr};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// One basic block: an optional entry label, a straight-line instruction
/// body, and (implicitly, via the graph's edges) its successors.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub name: String,
    /// `true` if this block began with an explicit `label` instruction in
    /// the source function (as opposed to a synthetic name assigned to an
    /// unlabeled leader).
    pub has_source_label: bool,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|i| i.is_terminator())
    }
}

/// A function's control-flow graph.
///
/// `order` tracks textual/emission order independently of petgraph's
/// (append-only) internal node storage, so preheader insertion (LICM, SSA)
/// can splice a block in ahead of another without renumbering anything.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub func_name: String,
    pub graph: DiGraph<BasicBlock, EdgeKind>,
    pub order: Vec<NodeIndex>,
    pub name_to_node: HashMap<String, NodeIndex>,
}

impl Cfg {
    pub fn entry(&self) -> Option<NodeIndex> {
        self.order.first().copied()
    }

    pub fn block(&self, node: NodeIndex) -> &BasicBlock {
        &self.graph[node]
    }

    pub fn block_mut(&mut self, node: NodeIndex) -> &mut BasicBlock {
        &mut self.graph[node]
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_node.get(name).copied()
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, petgraph::Direction::Outgoing)
    }

    pub fn predecessors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, petgraph::Direction::Incoming)
    }

    pub fn blocks_in_order(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.order.iter().copied()
    }

    /// Insert `block` into textual order immediately before `before`,
    /// returning the new node's index. Used by LICM and SSA construction to
    /// splice in preheaders. Graph edges are *not* touched here — callers
    /// rebuild them with `recompute_edges` once terminators settle.
    pub fn insert_before(&mut self, before: NodeIndex, block: BasicBlock) -> NodeIndex {
        let name = block.name.clone();
        let idx = self.graph.add_node(block);
        let pos = self.order.iter().position(|&n| n == before).unwrap_or(self.order.len());
        self.order.insert(pos, idx);
        self.name_to_node.insert(name, idx);
        idx
    }

    /// Drop and rebuild every edge from each block's terminator (or implied
    /// fallthrough). Call after mutating a terminator's `labels`, or after
    /// inserting/removing blocks.
    pub fn recompute_edges(&mut self) {
        let edges: Vec<_> = self.graph.edge_indices().collect();
        for e in edges {
            self.graph.remove_edge(e);
        }
        for (pos, &node) in self.order.iter().enumerate() {
            let next = self.order.get(pos + 1).copied();
            let term = self.graph[node].terminator().cloned();
            match term {
                None => {
                    if let Some(next) = next {
                        self.graph.add_edge(node, next, EdgeKind::Fallthrough);
                    }
                }
                Some(instr) => {
                    if let crate::ir::InstrKind::Effect { op, labels, .. } = &instr.kind {
                        match op {
                            EffectOp::Jmp => {
                                if let Some(&target) = labels.first().and_then(|l| self.name_to_node.get(l)) {
                                    self.graph.add_edge(node, target, EdgeKind::Jump);
                                }
                            }
                            EffectOp::Br => {
                                if let (Some(t), Some(f)) = (labels.first(), labels.get(1)) {
                                    if let Some(&tn) = self.name_to_node.get(t) {
                                        self.graph.add_edge(node, tn, EdgeKind::True);
                                    }
                                    if let Some(&fn_) = self.name_to_node.get(f) {
                                        self.graph.add_edge(node, fn_, EdgeKind::False);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    /// Flatten back to a straight-line instruction list by walking `order`
    /// directly, with no chain-placement reordering. Transforms use
    /// `cfg::linearize::linearize` instead (§4.2): this is the simpler
    /// primitive it and ad hoc tests build on.
    pub fn into_instrs(self) -> Vec<Instr> {
        let mut out = Vec::new();
        for node in self.order {
            let block = self.graph[node].clone();
            if block.has_source_label || self.graph.neighbors_directed(node, petgraph::Direction::Incoming).next().is_some() {
                out.push(Instr::label(block.name.clone()));
            }
            out.extend(block.instrs);
        }
        out
    }
}

/// Build a CFG from a function's instruction list (leaders algorithm).
///
/// A new block starts at: the first instruction, any `label`, and any
/// instruction immediately following a terminator (`jmp`/`br`/`ret`).
pub fn build_cfg(func: &Function) -> Result<Cfg> {
    let mut graph = DiGraph::new();
    let mut order = Vec::new();
    let mut name_to_node = HashMap::new();
    let mut anon_counter = 0usize;

    let mut current_name: Option<String> = None;
    let mut current_has_label = false;
    let mut current: Vec<Instr> = Vec::new();

    let mut flush = |name: Option<String>,
                     has_label: bool,
                     instrs: Vec<Instr>,
                     graph: &mut DiGraph<BasicBlock, EdgeKind>,
                     order: &mut Vec<NodeIndex>,
                     name_to_node: &mut HashMap<String, NodeIndex>,
                     anon_counter: &mut usize|
     -> Result<()> {
        if instrs.is_empty() && name.is_none() {
            return Ok(());
        }
        let name = name.unwrap_or_else(|| {
            let n = format!("b{}", *anon_counter);
            *anon_counter += 1;
            n
        });
        if name_to_node.contains_key(&name) {
            return Err(BrilError::DuplicateLabel { function: String::new(), label: name });
        }
        let node = graph.add_node(BasicBlock { name: name.clone(), has_source_label: has_label, instrs });
        name_to_node.insert(name, node);
        order.push(node);
        Ok(())
    };

    for instr in &func.instrs {
        if let Some(label) = instr.label_name() {
            flush(
                current_name.take(),
                current_has_label,
                std::mem::take(&mut current),
                &mut graph,
                &mut order,
                &mut name_to_node,
                &mut anon_counter,
            )
            .map_err(|e| tag_function(e, &func.name))?;
            current_name = Some(label.to_string());
            current_has_label = true;
            continue;
        }
        current.push(instr.clone());
        if instr.is_terminator() {
            flush(
                current_name.take(),
                current_has_label,
                std::mem::take(&mut current),
                &mut graph,
                &mut order,
                &mut name_to_node,
                &mut anon_counter,
            )
            .map_err(|e| tag_function(e, &func.name))?;
            current_has_label = false;
        }
    }
    flush(
        current_name.take(),
        current_has_label,
        current,
        &mut graph,
        &mut order,
        &mut name_to_node,
        &mut anon_counter,
    )
    .map_err(|e| tag_function(e, &func.name))?;

    let mut cfg = Cfg { func_name: func.name.clone(), graph, order, name_to_node };

    for node in cfg.order.clone() {
        if let Some(crate::ir::InstrKind::Effect { op, labels, .. }) =
            cfg.block(node).terminator().map(|i| i.kind.clone())
        {
            if matches!(op, EffectOp::Jmp | EffectOp::Br) {
                for label in &labels {
                    if !cfg.name_to_node.contains_key(label) {
                        return Err(BrilError::UndefinedLabel {
                            function: func.name.clone(),
                            label: label.clone(),
                        });
                    }
                }
            }
        }
    }

    cfg.recompute_edges();
    tracing::debug!(function = %func.name, blocks = cfg.order.len(), "built CFG");
    Ok(cfg)
}

fn tag_function(err: BrilError, name: &str) -> BrilError {
    match err {
        BrilError::DuplicateLabel { label, .. } => {
            BrilError::DuplicateLabel { function: name.to_string(), label }
        }
        other => other,
    }
}
