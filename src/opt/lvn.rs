//! Local value numbering (§4.5): constant folding, algebraic identities,
//! copy propagation, and common-subexpression elimination, scoped to one
//! basic block at a time.

use crate::cfg::build_cfg;
use crate::error::Result;
use crate::ir::{Function, Instr, InstrKind, Literal, Program, ValueOp};
use std::collections::HashMap;

/// A value-numbering key: either a folded constant or a canonicalized
/// operation over other value numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Value {
    Const(Literal),
    Op(ValueOp, Vec<u32>),
}

struct Table {
    /// value number -> (key, canonical variable holding it)
    entries: Vec<(Value, String)>,
    by_value: HashMap<Value, u32>,
    var_to_num: HashMap<String, u32>,
}

impl Table {
    fn new() -> Self {
        Table { entries: Vec::new(), by_value: HashMap::new(), var_to_num: HashMap::new() }
    }

    /// Value number of a variable whose definition LVN hasn't seen in this
    /// block (e.g. a block argument, or a destination reused across an
    /// unsupported instruction) — each such name gets its own number,
    /// keyed by the variable name so repeat reads line up.
    fn num_for_var(&mut self, var: &str) -> u32 {
        if let Some(&n) = self.var_to_num.get(var) {
            return n;
        }
        let key = Value::Op(ValueOp::Id, vec![u32::MAX - self.entries.len() as u32]);
        let n = self.entries.len() as u32;
        self.entries.push((key, var.to_string()));
        self.var_to_num.insert(var.to_string(), n);
        n
    }

    fn canonical_var(&self, num: u32) -> &str {
        &self.entries[num as usize].1
    }

    fn insert(&mut self, value: Value, dest: &str) -> u32 {
        let n = self.entries.len() as u32;
        self.entries.push((value.clone(), dest.to_string()));
        self.by_value.insert(value, n);
        self.var_to_num.insert(dest.to_string(), n);
        n
    }

    fn lookup(&self, value: &Value) -> Option<u32> {
        self.by_value.get(value).copied()
    }
}

fn canonicalize_args(op: ValueOp, mut nums: Vec<u32>) -> Vec<u32> {
    if op.is_commutative() {
        nums.sort_unstable();
    }
    nums
}

/// Result of applying an algebraic identity (§4.5(d)): either the
/// expression collapses to a known constant, or it's equivalent to one of
/// its own operands (a copy).
enum Identity {
    Const(Literal),
    SameAs(u32),
}

/// `x+0=x`, `x-0=x`, `0*x=0`, `1*x=x`, `0 and x=0`, `1 and x=x`, `1 or x=1`,
/// `0 or x=x` — checked before allocating a fresh value number, using
/// whichever operands LVN already knows to be constant (the other operand
/// need not be).
fn apply_identity(op: ValueOp, arg_nums: &[u32], literal_of: &HashMap<u32, Literal>) -> Option<Identity> {
    if arg_nums.len() != 2 {
        return None;
    }
    let lhs = literal_of.get(&arg_nums[0]).and_then(Literal::as_int);
    let rhs = literal_of.get(&arg_nums[1]).and_then(Literal::as_int);
    match op {
        ValueOp::Add => {
            if rhs == Some(0) {
                return Some(Identity::SameAs(arg_nums[0]));
            }
            if lhs == Some(0) {
                return Some(Identity::SameAs(arg_nums[1]));
            }
        }
        ValueOp::Sub => {
            if rhs == Some(0) {
                return Some(Identity::SameAs(arg_nums[0]));
            }
        }
        ValueOp::Mul => {
            if lhs == Some(0) || rhs == Some(0) {
                return Some(Identity::Const(Literal::Int(0)));
            }
            if lhs == Some(1) {
                return Some(Identity::SameAs(arg_nums[1]));
            }
            if rhs == Some(1) {
                return Some(Identity::SameAs(arg_nums[0]));
            }
        }
        ValueOp::And => {
            let lhs_b = literal_of.get(&arg_nums[0]).and_then(Literal::as_bool);
            let rhs_b = literal_of.get(&arg_nums[1]).and_then(Literal::as_bool);
            if lhs_b == Some(false) || rhs_b == Some(false) {
                return Some(Identity::Const(Literal::Bool(false)));
            }
            if lhs_b == Some(true) {
                return Some(Identity::SameAs(arg_nums[1]));
            }
            if rhs_b == Some(true) {
                return Some(Identity::SameAs(arg_nums[0]));
            }
        }
        ValueOp::Or => {
            let lhs_b = literal_of.get(&arg_nums[0]).and_then(Literal::as_bool);
            let rhs_b = literal_of.get(&arg_nums[1]).and_then(Literal::as_bool);
            if lhs_b == Some(true) || rhs_b == Some(true) {
                return Some(Identity::Const(Literal::Bool(true)));
            }
            if lhs_b == Some(false) {
                return Some(Identity::SameAs(arg_nums[1]));
            }
            if rhs_b == Some(false) {
                return Some(Identity::SameAs(arg_nums[0]));
            }
        }
        _ => {}
    }
    None
}

fn try_fold(op: ValueOp, args: &[Literal]) -> Option<Literal> {
    use Literal::{Bool, Int};
    match (op, args) {
        (ValueOp::Add, [Int(a), Int(b)]) => Some(Int(a.wrapping_add(*b))),
        (ValueOp::Sub, [Int(a), Int(b)]) => Some(Int(a.wrapping_sub(*b))),
        (ValueOp::Mul, [Int(a), Int(b)]) => Some(Int(a.wrapping_mul(*b))),
        // §7 safety refusal: a literal division by zero is left unfolded
        // rather than panicking or fabricating a value.
        (ValueOp::Div, [Int(_), Int(0)]) => None,
        (ValueOp::Div, [Int(a), Int(b)]) => Some(Int(a / b)),
        (ValueOp::And, [Bool(a), Bool(b)]) => Some(Bool(*a && *b)),
        (ValueOp::Or, [Bool(a), Bool(b)]) => Some(Bool(*a || *b)),
        (ValueOp::Not, [Bool(a)]) => Some(Bool(!a)),
        (ValueOp::Eq, [Int(a), Int(b)]) => Some(Bool(a == b)),
        (ValueOp::Eq, [Bool(a), Bool(b)]) => Some(Bool(a == b)),
        (ValueOp::Lt, [Int(a), Int(b)]) => Some(Bool(a < b)),
        (ValueOp::Le, [Int(a), Int(b)]) => Some(Bool(a <= b)),
        (ValueOp::Gt, [Int(a), Int(b)]) => Some(Bool(a > b)),
        (ValueOp::Ge, [Int(a), Int(b)]) => Some(Bool(a >= b)),
        (ValueOp::Id, [v]) => Some(*v),
        _ => None,
    }
}

fn lvn_block(instrs: &[Instr]) -> Vec<Instr> {
    let mut table = Table::new();
    let mut out = Vec::with_capacity(instrs.len());
    let mut literal_of: HashMap<u32, Literal> = HashMap::new();

    for instr in instrs {
        match &instr.kind {
            InstrKind::Const { dest, typ, value, extra } => {
                let key = Value::Const(*value);
                if let Some(existing) = table.lookup(&key) {
                    table.var_to_num.insert(dest.clone(), existing);
                    let canon = table.canonical_var(existing).to_string();
                    out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
                } else {
                    let n = table.insert(key, dest);
                    literal_of.insert(n, *value);
                    out.push(Instr {
                        kind: InstrKind::Const {
                            dest: dest.clone(),
                            typ: typ.clone(),
                            value: *value,
                            extra: extra.clone(),
                        },
                        def_id: None,
                    });
                }
            }
            InstrKind::Value { op: ValueOp::Id, dest, typ, args, .. } => {
                // `id d x` (§4.5.2): propagate vn(x) to d directly rather than
                // allocating a fresh value number — d and x become the same
                // value, emitted via the existing canonical variable.
                let num = table.num_for_var(&args[0]);
                table.var_to_num.insert(dest.clone(), num);
                let canon = table.canonical_var(num).to_string();
                out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
            }
            InstrKind::Value { op, dest, typ, args, extra } => {
                let arg_nums: Vec<u32> = args.iter().map(|a| table.num_for_var(a)).collect();
                let folded = if arg_nums.iter().all(|n| literal_of.contains_key(n)) {
                    let lits: Vec<Literal> = arg_nums.iter().map(|n| literal_of[n]).collect();
                    try_fold(*op, &lits)
                } else {
                    None
                };

                if let Some(lit) = folded {
                    let key = Value::Const(lit);
                    if let Some(existing) = table.lookup(&key) {
                        table.var_to_num.insert(dest.clone(), existing);
                        let canon = table.canonical_var(existing).to_string();
                        out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
                    } else {
                        let n = table.insert(key, dest);
                        literal_of.insert(n, lit);
                        out.push(Instr::const_(dest.clone(), typ.clone(), lit));
                    }
                    continue;
                }

                if let Some(identity) = apply_identity(*op, &arg_nums, &literal_of) {
                    match identity {
                        Identity::Const(lit) => {
                            let key = Value::Const(lit);
                            if let Some(existing) = table.lookup(&key) {
                                table.var_to_num.insert(dest.clone(), existing);
                                let canon = table.canonical_var(existing).to_string();
                                out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
                            } else {
                                let n = table.insert(key, dest);
                                literal_of.insert(n, lit);
                                out.push(Instr::const_(dest.clone(), typ.clone(), lit));
                            }
                        }
                        Identity::SameAs(num) => {
                            table.var_to_num.insert(dest.clone(), num);
                            let canon = table.canonical_var(num).to_string();
                            out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
                        }
                    }
                    continue;
                }

                let canon_args = canonicalize_args(*op, arg_nums.clone());
                let key = Value::Op(*op, canon_args);

                if let Some(existing) = table.lookup(&key) {
                    table.var_to_num.insert(dest.clone(), existing);
                    let canon = table.canonical_var(existing).to_string();
                    out.push(Instr::value(ValueOp::Id, dest.clone(), typ.clone(), vec![canon]));
                } else {
                    table.insert(key, dest);
                    let resolved_args: Vec<String> =
                        arg_nums.iter().map(|&num| table.canonical_var(num).to_string()).collect();
                    out.push(Instr {
                        kind: InstrKind::Value {
                            op: *op,
                            dest: dest.clone(),
                            typ: typ.clone(),
                            args: resolved_args,
                            extra: extra.clone(),
                        },
                        def_id: None,
                    });
                }
            }
            InstrKind::Effect { op, dest, typ, args, labels, funcs, extra } => {
                let resolved_args: Vec<String> = args
                    .iter()
                    .map(|a| {
                        let n = table.num_for_var(a);
                        table.canonical_var(n).to_string()
                    })
                    .collect();
                if let Some(dest) = dest {
                    // `call`s with a destination: fresh, un-deduplicated
                    // value (calls are never pure).
                    table.var_to_num.remove(dest);
                    table.num_for_var(dest);
                }
                out.push(Instr {
                    kind: InstrKind::Effect {
                        op: *op,
                        dest: dest.clone(),
                        typ: typ.clone(),
                        args: resolved_args,
                        labels: labels.clone(),
                        funcs: funcs.clone(),
                        extra: extra.clone(),
                    },
                    def_id: None,
                });
            }
            InstrKind::Label { .. } | InstrKind::Get { .. } | InstrKind::Set { .. } | InstrKind::Undef { .. } => {
                if let Some(dest) = instr.dest() {
                    table.var_to_num.remove(dest);
                    table.num_for_var(dest);
                }
                out.push(instr.clone());
            }
        }
    }

    out
}

pub fn lvn_function(func: &Function) -> Result<Function> {
    let cfg = build_cfg(func)?;
    let mut cfg = cfg;
    let mut removed_total = 0usize;
    for node in cfg.graph.node_indices().collect::<Vec<_>>() {
        let before = cfg.block(node).instrs.len();
        let new_instrs = lvn_block(&cfg.block(node).instrs);
        let after = new_instrs.len();
        removed_total += before.saturating_sub(after);
        cfg.block_mut(node).instrs = new_instrs;
    }
    cfg.recompute_edges();
    tracing::debug!(function = %func.name, folded_or_deduped = removed_total, "ran local value numbering");
    Ok(Function { instrs: crate::cfg::linearize::linearize(&cfg), ..func.clone() })
}

pub fn lvn_program(program: &Program) -> Result<Program> {
    let functions = program.functions.iter().map(lvn_function).collect::<Result<Vec<_>>>()?;
    Ok(Program { functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EffectOp, Literal, Type};

    #[test]
    fn folds_constant_arithmetic() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("a", Type::Int, Literal::Int(2)),
                Instr::const_("b", Type::Int, Literal::Int(3)),
                Instr::value(ValueOp::Add, "sum", Type::Int, vec!["a".into(), "b".into()]),
                Instr::effect(EffectOp::Print, vec!["sum".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = lvn_function(&f).unwrap();
        let sum_instr = out.instrs.iter().find(|i| i.dest() == Some("sum")).unwrap();
        assert!(matches!(sum_instr.kind, InstrKind::Const { value: Literal::Int(5), .. }));
    }

    #[test]
    fn refuses_to_fold_division_by_zero() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("a", Type::Int, Literal::Int(2)),
                Instr::const_("z", Type::Int, Literal::Int(0)),
                Instr::value(ValueOp::Div, "q", Type::Int, vec!["a".into(), "z".into()]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = lvn_function(&f).unwrap();
        let q_instr = out.instrs.iter().find(|i| i.dest() == Some("q")).unwrap();
        assert!(matches!(q_instr.kind, InstrKind::Value { op: ValueOp::Div, .. }));
    }

    #[test]
    fn deduplicates_identical_expression() {
        let f = Function {
            name: "f".into(),
            args: vec![param_p()],
            ret_type: None,
            instrs: vec![
                Instr::value(ValueOp::Add, "x", Type::Int, vec!["p".into(), "p".into()]),
                Instr::value(ValueOp::Add, "y", Type::Int, vec!["p".into(), "p".into()]),
                Instr::effect(EffectOp::Print, vec!["x".into(), "y".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = lvn_function(&f).unwrap();
        let y_instr = out.instrs.iter().find(|i| i.dest() == Some("y")).unwrap();
        assert!(matches!(y_instr.kind, InstrKind::Value { op: ValueOp::Id, .. }));
    }

    #[test]
    fn add_zero_identity_becomes_copy() {
        let f = Function {
            name: "f".into(),
            args: vec![param_p()],
            ret_type: None,
            instrs: vec![
                Instr::const_("zero", Type::Int, Literal::Int(0)),
                Instr::value(ValueOp::Add, "y", Type::Int, vec!["p".into(), "zero".into()]),
                Instr::effect(EffectOp::Print, vec!["y".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = lvn_function(&f).unwrap();
        let y_instr = out.instrs.iter().find(|i| i.dest() == Some("y")).unwrap();
        match &y_instr.kind {
            InstrKind::Value { op: ValueOp::Id, args, .. } => assert_eq!(args, &vec!["p".to_string()]),
            other => panic!("expected `y = id p`, got {other:?}"),
        }
    }

    #[test]
    fn mul_by_zero_identity_becomes_constant() {
        let f = Function {
            name: "f".into(),
            args: vec![param_p()],
            ret_type: None,
            instrs: vec![
                Instr::const_("zero", Type::Int, Literal::Int(0)),
                Instr::value(ValueOp::Mul, "y", Type::Int, vec!["p".into(), "zero".into()]),
                Instr::effect(EffectOp::Print, vec!["y".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = lvn_function(&f).unwrap();
        let y_instr = out.instrs.iter().find(|i| i.dest() == Some("y")).unwrap();
        assert!(matches!(y_instr.kind, InstrKind::Const { value: Literal::Int(0), .. }));
    }

    fn param_p() -> crate::ir::Param {

        crate::ir::Param { name: "p".to_string(), typ: Type::Int }
    }
}
