//! Entry/exit detection and simple graph queries over a `Cfg`.

use crate::cfg::Cfg;
use crate::ir::EffectOp;
use petgraph::graph::NodeIndex;

/// The entry block is always the first block in textual order.
pub fn find_entry(cfg: &Cfg) -> Option<NodeIndex> {
    cfg.entry()
}

/// Exit blocks: blocks whose terminator is `ret`, or blocks with no
/// terminator and no successor (falls off the end of the function).
pub fn find_exits(cfg: &Cfg) -> Vec<NodeIndex> {
    cfg.order.iter().copied().filter(|&n| is_exit_block(cfg, n)).collect()
}

pub fn is_exit_block(cfg: &Cfg, node: NodeIndex) -> bool {
    match cfg.block(node).terminator() {
        Some(instr) => matches!(&instr.kind, crate::ir::InstrKind::Effect { op: EffectOp::Ret, .. }),
        None => cfg.successors(node).next().is_none(),
    }
}

pub fn in_degree(cfg: &Cfg, node: NodeIndex) -> usize {
    cfg.predecessors(node).count()
}

pub fn out_degree(cfg: &Cfg, node: NodeIndex) -> usize {
    cfg.successors(node).count()
}

pub fn is_merge_point(cfg: &Cfg, node: NodeIndex) -> bool {
    in_degree(cfg, node) > 1
}

pub fn is_branch_point(cfg: &Cfg, node: NodeIndex) -> bool {
    out_degree(cfg, node) > 1
}
