//! Loop-invariant code motion (§4.8): find natural loops, give each one a
//! preheader, and hoist instructions whose operands are all ready before
//! the loop runs.
//!
//! Grounded on `examples/original_source/lesson8/licm.py`: preheader
//! insertion, the reaching-definitions bridge used to decide hoist
//! readiness, and the fixpoint loop over a growing hoistable set all follow
//! that implementation's shape, adapted to this crate's CFG/dominance
//! types instead of dict-of-dicts.

use crate::cfg::analysis::find_exits;
use crate::cfg::dominators::DominatorTree;
use crate::cfg::loops::NaturalLoop;
use crate::cfg::{build_cfg, loops, BasicBlock, Cfg};
use crate::dataflow::reaching_defs::{self, ReachingDefs};
use crate::error::Result;
use crate::ir::{Function, InstrKind, Program, ValueOp};
use crate::ssa;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Options recognized by the LICM driver (§6): `via_ssa` runs the pass
/// inside SSA form and converts back out, matching `licm.py`'s `--ssa`
/// flag (§4.8 "Optional SSA mode").
#[derive(Debug, Clone, Copy, Default)]
pub struct LicmOptions {
    pub via_ssa: bool,
}

/// A hoist candidate: a loop-body instruction location, identified the same
/// way reaching-definitions identifies def sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstrLoc {
    block: NodeIndex,
    index: usize,
}

fn is_pure_for_licm(kind: &InstrKind) -> bool {
    match kind {
        InstrKind::Const { .. } => true,
        InstrKind::Value { op, .. } => op.is_pure_for_licm(),
        _ => false,
    }
}

fn single_def_block(cfg: &Cfg, body: &HashSet<NodeIndex>, dest: &str) -> bool {
    let mut count = 0;
    for &node in body {
        for instr in &cfg.block(node).instrs {
            if instr.dest() == Some(dest) {
                count += 1;
                if count > 1 {
                    return false;
                }
            }
        }
    }
    count == 1
}

fn block_dominates_all(dom_tree: &DominatorTree, block: NodeIndex, targets: &[NodeIndex]) -> bool {
    targets.iter().all(|&t| dom_tree.dominates(block, t))
}

/// Collect the hoistable set for one natural loop, iterating to fixpoint:
/// an instruction becomes hoistable once every argument's reaching
/// definitions are either outside the loop, or a single inside definition
/// that is itself already hoistable (§4.8 step 2).
fn collect_hoistable(
    cfg: &Cfg,
    natural_loop: &NaturalLoop,
    dom_tree: &DominatorTree,
    reaching: &std::collections::HashMap<NodeIndex, crate::dataflow::BlockFacts<ReachingDefs>>,
) -> Vec<InstrLoc> {
    let exits: Vec<NodeIndex> = natural_loop
        .exit_edges(cfg)
        .into_iter()
        .map(|(inside, _outside)| inside)
        .collect();

    let mut hoistable: HashSet<InstrLoc> = HashSet::new();
    let mut hoistable_dests: HashSet<String> = HashSet::new();

    loop {
        let mut changed = false;
        let mut body_nodes: Vec<NodeIndex> = natural_loop.body.iter().copied().collect();
        body_nodes.sort_by_key(|&n| cfg.block(n).name.clone());

        for &node in &body_nodes {
            let before = &reaching[&node].before;
            for (index, instr) in cfg.block(node).instrs.iter().enumerate() {
                let loc = InstrLoc { block: node, index };
                if hoistable.contains(&loc) {
                    continue;
                }
                if instr.is_terminator() {
                    continue;
                }
                let Some(dest) = instr.dest() else { continue };
                if !is_pure_for_licm(&instr.kind) {
                    continue;
                }

                let fact = &before[index];
                let mut ready = true;
                for arg in instr.uses() {
                    let defs: Vec<&str> = fact
                        .0
                        .iter()
                        .filter(|d| ReachingDefs::var_of(d) == arg)
                        .map(String::as_str)
                        .collect();
                    if defs.is_empty() {
                        continue;
                    }
                    let inside_defs: Vec<&str> = defs
                        .iter()
                        .filter(|d| {
                            let block_name = d.split('@').nth(1).and_then(|s| s.split(':').next()).unwrap_or("");
                            natural_loop.body.iter().any(|&n| cfg.block(n).name == block_name)
                        })
                        .copied()
                        .collect();
                    if inside_defs.is_empty() {
                        continue;
                    }
                    if inside_defs.len() == 1 && hoistable_dests.contains(arg) {
                        continue;
                    }
                    ready = false;
                    break;
                }
                if !ready {
                    continue;
                }

                if !single_def_block(cfg, &natural_loop.body, dest) {
                    continue;
                }
                if !block_dominates_all(dom_tree, node, &exits) {
                    continue;
                }

                hoistable.insert(loc);
                hoistable_dests.insert(dest.to_string());
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let mut result: Vec<InstrLoc> = hoistable.into_iter().collect();
    result.sort_by_key(|loc| (cfg.block(loc.block).name.clone(), loc.index));
    result
}

fn preheader_name(cfg: &Cfg, header: NodeIndex) -> String {
    let header_name = cfg.block(header).name.clone();
    let mut suffix = None;
    loop {
        let candidate = match suffix {
            None => format!("{header_name}.preheader"),
            Some(n) => format!("{header_name}.preheader.{n}"),
        };
        if !cfg.name_to_node.contains_key(&candidate) {
            return candidate;
        }
        suffix = Some(suffix.map_or(1, |n| n + 1));
    }
}

/// Insert a preheader for `natural_loop`, retargeting every outside
/// predecessor of the header to it. Returns `None` (and leaves the CFG
/// untouched) if the loop has no outside predecessor — hoisting there would
/// land in unreachable code (§4.8 step 1).
fn insert_preheader(cfg: &mut Cfg, natural_loop: &NaturalLoop) -> Option<NodeIndex> {
    let outside_preds = natural_loop.outside_predecessors(cfg);
    if outside_preds.is_empty() {
        return None;
    }

    let header = natural_loop.header;
    let name = preheader_name(cfg, header);
    let block = BasicBlock {
        name: name.clone(),
        has_source_label: true,
        instrs: vec![crate::ir::Instr::jmp(cfg.block(header).name.clone())],
    };
    let pre = cfg.insert_before(header, block);

    for pred in outside_preds {
        let header_name = cfg.block(header).name.clone();
        let has_terminator = cfg.block(pred).terminator().is_some();
        let block = cfg.block_mut(pred);
        if has_terminator {
            let term_idx = block.instrs.len() - 1;
            if let Some(labels) = block.instrs[term_idx].labels_mut() {
                for l in labels.iter_mut() {
                    if *l == header_name {
                        *l = name.clone();
                    }
                }
            }
        } else {
            block.instrs.push(crate::ir::Instr::jmp(name.clone()));
        }
    }

    cfg.recompute_edges();
    Some(pre)
}

/// Move `locs` (already sorted by `(block, index)`, §4.8 step 3's
/// "ascending order of `(block, index)`") into `preheader`, just before its
/// terminator.
fn hoist_into(cfg: &mut Cfg, preheader: NodeIndex, locs: &[InstrLoc]) {
    let mut by_block: std::collections::HashMap<NodeIndex, Vec<usize>> = std::collections::HashMap::new();
    for loc in locs {
        by_block.entry(loc.block).or_default().push(loc.index);
    }

    let mut taken: std::collections::HashMap<(NodeIndex, usize), crate::ir::Instr> = std::collections::HashMap::new();
    for (&block, indices) in by_block.iter() {
        let mut descending = indices.clone();
        descending.sort_unstable_by(|a, b| b.cmp(a));
        let instrs = &mut cfg.block_mut(block).instrs;
        for &idx in &descending {
            taken.insert((block, idx), instrs.remove(idx));
        }
    }

    let ordered: Vec<crate::ir::Instr> =
        locs.iter().filter_map(|loc| taken.remove(&(loc.block, loc.index))).collect();

    let pre_block = cfg.block_mut(preheader);
    let insert_at = if pre_block.instrs.last().map(|i| i.is_terminator()).unwrap_or(false) {
        pre_block.instrs.len() - 1
    } else {
        pre_block.instrs.len()
    };
    for (offset, instr) in ordered.into_iter().enumerate() {
        pre_block.instrs.insert(insert_at + offset, instr);
    }
}

fn licm_on_cfg(cfg: &mut Cfg) -> Result<usize> {
    let mut total_hoisted = 0;
    loop {
        let dom_tree = match DominatorTree::new(cfg)? {
            Some(t) => t,
            None => return Ok(total_hoisted),
        };
        let natural_loops = loops::detect_natural_loops(cfg, &dom_tree);
        if natural_loops.is_empty() {
            return Ok(total_hoisted);
        }

        let mut any_hoisted = false;
        for natural_loop in &natural_loops {
            reaching_defs::annotate_def_sites(cfg);
            let reaching = reaching_defs::analyze(cfg);
            let hoistable = collect_hoistable(cfg, natural_loop, &dom_tree, &reaching);
            if hoistable.is_empty() {
                continue;
            }

            let Some(pre) = insert_preheader(cfg, natural_loop) else {
                tracing::debug!(header = %cfg.block(natural_loop.header).name, "skipping loop with no outside predecessor");
                continue;
            };
            tracing::debug!(
                header = %cfg.block(natural_loop.header).name,
                hoisted = hoistable.len(),
                "hoisting loop-invariant instructions"
            );
            hoist_into(cfg, pre, &hoistable);
            total_hoisted += hoistable.len();
            any_hoisted = true;
            // Reaching definitions and the dominator tree are now stale
            // (a preheader block exists, instructions moved); bail out to
            // the outer loop to recompute both before processing another
            // natural loop found in this pass.
            break;
        }

        if !any_hoisted {
            return Ok(total_hoisted);
        }
    }
}

/// Run LICM on one function, outside of SSA.
pub fn licm_function(func: &Function) -> Result<Function> {
    let mut cfg = build_cfg(func)?;
    licm_on_cfg(&mut cfg)?;
    cfg.recompute_edges();
    let mut out = Function { instrs: crate::cfg::linearize::linearize(&cfg), ..func.clone() };
    out.clear_def_ids();
    Ok(out)
}

/// Run LICM by first converting to SSA, running the pass there, then
/// converting back (§4.8 "Optional SSA mode"; `licm.py`'s `main(prog,
/// use_ssa=True)`).
pub fn licm_function_via_ssa(func: &Function) -> Result<Function> {
    let ssa_func = ssa::to_ssa(func)?;
    let optimized = licm_function(&ssa_func)?;
    ssa::from_ssa(&optimized)
}

pub fn licm_function_with(func: &Function, opts: LicmOptions) -> Result<Function> {
    if opts.via_ssa {
        licm_function_via_ssa(func)
    } else {
        licm_function(func)
    }
}

pub fn licm_program(program: &Program, opts: LicmOptions) -> Result<Program> {
    let functions = program.functions.iter().map(|f| licm_function_with(f, opts)).collect::<Result<Vec<_>>>()?;
    Ok(Program { functions })
}

/// `true` if `op` is one of the value ops LICM will ever consider hoisting.
/// Exposed for tests that want to construct loop-invariant fixtures.
pub fn is_hoistable_op(op: ValueOp) -> bool {
    op.is_pure_for_licm()
}
