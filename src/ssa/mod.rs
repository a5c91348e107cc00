//! SSA construction and destruction (§4.7), built on `get`/`set` shadow
//! variables rather than classical phi nodes: a join block that needs a
//! merged value for some source variable `v` gets a `get shadow, type`
//! instruction at its head (`shadow` is a fresh SSA name), and every
//! predecessor on the dominance frontier that can reach it gets a
//! `set shadow, <current value of v on that path>` spliced in right before
//! its terminator. Interpreted directly, `get`/`set` behave like a single
//! implicit slot threaded along whichever edge control actually took.

use crate::cfg::analysis::find_entry;
use crate::cfg::dominance_frontiers::DominanceFrontiers;
use crate::cfg::dominators::DominatorTree;
use crate::cfg::{build_cfg, BasicBlock, Cfg};
use crate::dataflow::liveness;
use crate::error::{BrilError, Result};
use crate::ir::{Function, Instr, InstrKind, Type};
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Generates `{var}.{n}` SSA names, unique per variable across a function.
struct NameGen {
    counters: HashMap<String, u32>,
}

impl NameGen {
    fn new() -> Self {
        NameGen { counters: HashMap::new() }
    }

    fn fresh(&mut self, var: &str) -> String {
        let n = self.counters.entry(var.to_string()).or_insert(0);
        let name = format!("{var}.{n}");
        *n += 1;
        name
    }
}

fn var_type(func: &Function, var: &str) -> Option<Type> {
    func.args
        .iter()
        .find(|p| p.name == var)
        .map(|p| p.typ.clone())
        .or_else(|| func.instrs.iter().find(|i| i.dest() == Some(var)).and_then(|i| i.typ().cloned()))
}

/// If the function's entry block is itself targeted by a back-edge (a loop
/// whose header is the entry), give it a synthetic preheader so the entry
/// can carry a phi without conflating "value coming from the caller" with
/// "value coming from a loop iteration" — the caller's initial parameter
/// values land in the preheader instead.
fn ensure_entry_preheader(cfg: &mut Cfg) {
    let Some(entry) = find_entry(cfg) else { return };
    if cfg.predecessors(entry).next().is_none() {
        return;
    }
    let entry_name = cfg.block(entry).name.clone();
    let mut suffix = None;
    let name = loop {
        let candidate = match suffix {
            None => format!("{entry_name}.ssa_preheader"),
            Some(n) => format!("{entry_name}.ssa_preheader.{n}"),
        };
        if !cfg.name_to_node.contains_key(&candidate) {
            break candidate;
        }
        suffix = Some(suffix.map_or(1, |n| n + 1));
    };
    let pre = BasicBlock { name: name.clone(), has_source_label: true, instrs: vec![Instr::jmp(entry_name)] };
    cfg.insert_before(entry, pre);
    cfg.recompute_edges();
}

/// Convert a function to SSA form.
pub fn to_ssa(func: &Function) -> Result<Function> {
    let mut cfg = build_cfg(func)?;
    ensure_entry_preheader(&mut cfg);

    let dom_tree = DominatorTree::new(&cfg)?
        .ok_or_else(|| BrilError::IllFormedSsa { function: func.name.clone(), reason: "empty function".into() })?;
    let df = DominanceFrontiers::new(&cfg, &dom_tree);
    let live = liveness::analyze(&cfg);

    let mut vars: HashSet<String> = func.args.iter().map(|p| p.name.clone()).collect();
    for node in cfg.graph.node_indices() {
        for instr in &cfg.block(node).instrs {
            if let Some(d) = instr.dest() {
                vars.insert(d.to_string());
            }
        }
    }

    // def sites per variable, seeded with the (possibly newly created)
    // entry/preheader block for function parameters.
    let mut def_sites: HashMap<String, HashSet<NodeIndex>> = HashMap::new();
    let param_home = find_entry(&cfg).unwrap();
    for p in &func.args {
        def_sites.entry(p.name.clone()).or_default().insert(param_home);
    }
    for node in cfg.graph.node_indices() {
        for instr in &cfg.block(node).instrs {
            if let Some(d) = instr.dest() {
                def_sites.entry(d.to_string()).or_default().insert(node);
            }
        }
    }

    // Phi placement: iterated dominance frontier, pruned by liveness.
    let mut needs_phi: HashMap<NodeIndex, Vec<String>> = HashMap::new();
    let mut vars_sorted: Vec<&String> = vars.iter().collect();
    vars_sorted.sort();
    for var in vars_sorted {
        let Some(sites) = def_sites.get(var) else { continue };
        for block in df.iterated_frontier(sites) {
            if live[&block].in_fact.0.contains(var) {
                needs_phi.entry(block).or_default().push(var.clone());
            }
        }
    }

    let mut namegen = NameGen::new();
    // block -> (original var -> fresh shadow name), insertion order matters
    // for determinism, so keep a parallel Vec too.
    let mut phis_in_block: HashMap<NodeIndex, Vec<(String, String)>> = HashMap::new();

    // Fresh-name allocation order must be deterministic (§5/§6), so visit
    // phi blocks sorted by name rather than `needs_phi`'s HashMap order.
    let mut phi_blocks: Vec<NodeIndex> = needs_phi.keys().copied().collect();
    phi_blocks.sort_by_key(|&n| cfg.block(n).name.clone());

    for node in phi_blocks {
        let vars = needs_phi.get_mut(&node).unwrap();
        vars.sort();
        let mut pairs = Vec::new();
        for var in vars.iter() {
            var_type(func, var).ok_or_else(|| BrilError::IllFormedSsa {
                function: func.name.clone(),
                reason: format!("no type information for `{var}`"),
            })?;
            let fresh = namegen.fresh(var);
            pairs.push((var.clone(), fresh.clone()));
        }
        let block = cfg.block_mut(node);
        for (var, fresh) in pairs.iter().rev() {
            let typ = var_type(func, var).unwrap();
            block.instrs.insert(0, Instr::get(fresh.clone(), typ));
        }
        phis_in_block.insert(node, pairs);
    }
    tracing::debug!(function = %func.name, phi_blocks = phis_in_block.len(), "inserted SSA phi placeholders");

    rename(&mut cfg, func, &dom_tree, &phis_in_block, &mut namegen)?;

    cfg.recompute_edges();
    Ok(Function { instrs: crate::cfg::linearize::linearize(&cfg), ..func.clone() })
}

enum Frame {
    Enter(NodeIndex),
    Exit(HashMap<String, usize>),
}

fn rename(
    cfg: &mut Cfg,
    func: &Function,
    dom_tree: &DominatorTree,
    phis_in_block: &HashMap<NodeIndex, Vec<(String, String)>>,
    namegen: &mut NameGen,
) -> Result<()> {
    let mut stacks: HashMap<String, Vec<String>> = HashMap::new();
    for p in &func.args {
        stacks.entry(p.name.clone()).or_default().push(p.name.clone());
    }

    let root = dom_tree.root();
    let mut frames = vec![Frame::Enter(root)];

    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Exit(pushed) => {
                for (var, count) in pushed {
                    let stack = stacks.get_mut(&var).unwrap();
                    for _ in 0..count {
                        stack.pop();
                    }
                }
            }
            Frame::Enter(node) => {
                let mut pushed: HashMap<String, usize> = HashMap::new();
                let phi_names: HashSet<&str> =
                    phis_in_block.get(&node).map(|v| v.iter().map(|(_, f)| f.as_str()).collect()).unwrap_or_default();

                let instrs_len = cfg.block(node).instrs.len();
                for i in 0..instrs_len {
                    let instr = cfg.block_mut(node).instrs[i].clone();
                    let is_phi_get = matches!(&instr.kind, InstrKind::Get { dest, .. } if phi_names.contains(dest.as_str()));

                    let renamed = if is_phi_get {
                        instr
                    } else {
                        rename_uses(&instr, &stacks)
                    };

                    let final_instr = if let Some(dest) = renamed.dest() {
                        if is_phi_get {
                            let var = phis_in_block[&node].iter().find(|(_, f)| f == dest).unwrap().0.clone();
                            stacks.entry(var.clone()).or_default().push(dest.to_string());
                            *pushed.entry(var).or_insert(0) += 1;
                            renamed
                        } else {
                            let fresh = namegen.fresh(dest);
                            let mut r = renamed;
                            let original = dest.to_string();
                            r.set_dest(fresh.clone());
                            stacks.entry(original.clone()).or_default().push(fresh);
                            *pushed.entry(original).or_insert(0) += 1;
                            r
                        }
                    } else {
                        renamed
                    };

                    cfg.block_mut(node).instrs[i] = final_instr;
                }

                // Feed successors' phis from this block's current values.
                let successors: Vec<NodeIndex> = cfg.successors(node).collect();
                for succ in successors {
                    let Some(pairs) = phis_in_block.get(&succ) else { continue };
                    for (var, shadow) in pairs {
                        let value_name = match stacks.get(var).and_then(|s| s.last()) {
                            Some(name) => name.clone(),
                            None => {
                                let typ = var_type(func, var).ok_or_else(|| BrilError::IllFormedSsa {
                                    function: func.name.clone(),
                                    reason: format!("no type information for `{var}`"),
                                })?;
                                let tmp = namegen.fresh(&format!("{var}.undef"));
                                insert_before_terminator(cfg.block_mut(node), Instr::undef(tmp.clone(), typ));
                                tmp
                            }
                        };
                        insert_before_terminator(cfg.block_mut(node), Instr::set(shadow.clone(), value_name));
                    }
                }

                frames.push(Frame::Exit(pushed));
                let mut children: Vec<NodeIndex> = dom_tree.children(node).to_vec();
                children.sort_by_key(|&c| cfg.block(c).name.clone());
                for child in children {
                    frames.push(Frame::Enter(child));
                }
            }
        }
    }

    Ok(())
}

fn rename_uses(instr: &Instr, stacks: &HashMap<String, Vec<String>>) -> Instr {
    let lookup = |name: &str| -> String { stacks.get(name).and_then(|s| s.last()).cloned().unwrap_or_else(|| name.to_string()) };

    let mut out = instr.clone();
    match &mut out.kind {
        InstrKind::Value { args, .. } | InstrKind::Effect { args, .. } => {
            for a in args.iter_mut() {
                *a = lookup(a);
            }
        }
        InstrKind::Set { shadow: _, src } => {
            *src = lookup(src);
        }
        _ => {}
    }
    out
}

fn insert_before_terminator(block: &mut crate::cfg::BasicBlock, instr: Instr) {
    if block.instrs.last().map(|i| i.is_terminator()).unwrap_or(false) {
        let idx = block.instrs.len() - 1;
        block.instrs.insert(idx, instr);
    } else {
        block.instrs.push(instr);
    }
}

/// Destroy SSA form: every `set shadow, src` becomes a plain `id shadow,
/// src` copy and every `get` is dropped — the copies alone reconstruct the
/// merged value once `shadow` is read as an ordinary (non-SSA) variable.
pub fn from_ssa(func: &Function) -> Result<Function> {
    let mut shadow_types: HashMap<String, Type> = HashMap::new();
    for instr in &func.instrs {
        if let InstrKind::Get { dest, typ, .. } = &instr.kind {
            shadow_types.insert(dest.clone(), typ.clone());
        }
    }

    let mut out = Vec::with_capacity(func.instrs.len());
    for instr in &func.instrs {
        match &instr.kind {
            InstrKind::Get { .. } => continue,
            InstrKind::Set { shadow, src, .. } => {
                let typ = shadow_types.get(shadow).cloned().ok_or_else(|| BrilError::IllFormedSsa {
                    function: func.name.clone(),
                    reason: format!("`set {shadow}` has no matching `get` to recover its type"),
                })?;
                out.push(Instr::value(crate::ir::ValueOp::Id, shadow.clone(), typ, vec![src.clone()]));
            }
            _ => out.push(instr.clone()),
        }
    }

    Ok(Function { instrs: out, ..func.clone() })
}

/// Well-formedness check (§4.7): every destination is assigned at most
/// once in the function, and every use is dominated by its definition
/// (`get`s count as defined at their block's entry).
///
/// The dominance check only looks at *data* uses — a `set shadow, src`
/// reads `src`, but `shadow` there is a write target under a different
/// name, not a read; a `set` feeding a join's `get` routinely sits in a
/// block that does not dominate the `get`'s block at all (that's the
/// whole point of a phi), so counting `shadow` as a use here would reject
/// exactly the programs this function is meant to accept.
pub fn is_ssa(func: &Function) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    for instr in &func.instrs {
        if let Some(dest) = instr.dest() {
            if !seen.insert(dest) {
                return false;
            }
        }
    }

    let Ok(cfg) = build_cfg(func) else { return false };
    let dom_tree = match DominatorTree::new(&cfg) {
        Ok(Some(t)) => t,
        Ok(None) => return true,
        Err(_) => return false,
    };

    // `-1` sentinel marks a `get`'s definition as preceding every real
    // instruction in its block (block-entry position).
    let mut def_site: HashMap<&str, (NodeIndex, i64)> = HashMap::new();
    for node in cfg.graph.node_indices() {
        for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
            if let InstrKind::Get { dest, .. } = &instr.kind {
                def_site.insert(dest.as_str(), (node, -1));
            } else if let Some(dest) = instr.dest() {
                def_site.insert(dest, (node, idx as i64));
            }
        }
    }

    for node in cfg.graph.node_indices() {
        for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
            for used in data_uses(instr) {
                // Function parameters have no recorded def site and are
                // live from entry; nothing to check for them.
                let Some(&(def_node, def_idx)) = def_site.get(used) else { continue };
                let dominated = if def_node == node {
                    def_idx < idx as i64
                } else {
                    dom_tree.strictly_dominates(def_node, node)
                };
                if !dominated {
                    return false;
                }
            }
        }
    }

    true
}

/// Variables genuinely read by `instr`, excluding `set shadow, src`'s
/// `shadow` — see `is_ssa`'s doc comment for why that one doesn't count.
fn data_uses(instr: &Instr) -> Vec<&str> {
    match &instr.kind {
        InstrKind::Value { args, .. } | InstrKind::Effect { args, .. } => {
            args.iter().map(String::as_str).collect()
        }
        InstrKind::Set { src, .. } => vec![src.as_str()],
        _ => Vec::new(),
    }
}
