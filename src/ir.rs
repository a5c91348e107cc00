//! The IR's data model: programs, functions, types, and instructions.
//!
//! The wire format (§6) is an untyped JSON document. Per the design notes,
//! we give it a proper sum type here — `Instr::kind` tags each instruction
//! as a `Label`, `Const`, `Value` op, `Effect` op, or one of the SSA phi
//! surrogates (`get`/`set`/`undef`) — while still round-tripping any unknown
//! keys present on an instruction through `extra`, and stripping the `_`
//! prefixed scratch keys (just `_def_id` today) before emission.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt;

pub type JsonMap = Map<String, Json>;

/// A program is an ordered list of functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
}

/// A function: name, ordered parameters, optional return type, ordered body.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<Param>,
    pub ret_type: Option<Type>,
    pub instrs: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Ptr(Box<Type>),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Ptr(inner) => write!(f, "ptr<{inner}>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

impl Literal {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            Literal::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(n) => Some(*n),
            Literal::Bool(_) => None,
        }
    }
}

/// Opcodes valid on a `Value` instruction (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOp {
    Id,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Not,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ValueOp {
    pub fn name(self) -> &'static str {
        match self {
            ValueOp::Id => "id",
            ValueOp::Add => "add",
            ValueOp::Sub => "sub",
            ValueOp::Mul => "mul",
            ValueOp::Div => "div",
            ValueOp::And => "and",
            ValueOp::Or => "or",
            ValueOp::Not => "not",
            ValueOp::Eq => "eq",
            ValueOp::Lt => "lt",
            ValueOp::Le => "le",
            ValueOp::Gt => "gt",
            ValueOp::Ge => "ge",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "id" => ValueOp::Id,
            "add" => ValueOp::Add,
            "sub" => ValueOp::Sub,
            "mul" => ValueOp::Mul,
            "div" => ValueOp::Div,
            "and" => ValueOp::And,
            "or" => ValueOp::Or,
            "not" => ValueOp::Not,
            "eq" => ValueOp::Eq,
            "lt" => ValueOp::Lt,
            "le" => ValueOp::Le,
            "gt" => ValueOp::Gt,
            "ge" => ValueOp::Ge,
            _ => return None,
        })
    }

    /// Commutative for the purposes of LVN key normalization (§4.5(c)).
    pub fn is_commutative(self) -> bool {
        matches!(self, ValueOp::Add | ValueOp::Mul | ValueOp::Eq | ValueOp::And | ValueOp::Or)
    }

    pub fn is_unary(self) -> bool {
        matches!(self, ValueOp::Id | ValueOp::Not)
    }

    /// Pure for LICM purposes (§4.8): `div` excluded deliberately.
    pub fn is_pure_for_licm(self) -> bool {
        !matches!(self, ValueOp::Div)
    }

    /// Pure for available-expressions purposes (§4.4): narrower set.
    pub fn is_pure_expr(self) -> bool {
        matches!(
            self,
            ValueOp::Add
                | ValueOp::Sub
                | ValueOp::Mul
                | ValueOp::Div
                | ValueOp::And
                | ValueOp::Or
                | ValueOp::Eq
                | ValueOp::Lt
                | ValueOp::Gt
        )
    }
}

/// Opcodes valid on an `Effect` instruction (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectOp {
    Jmp,
    Br,
    Ret,
    Print,
    Call,
    Speculate,
    Commit,
    Guard,
}

impl EffectOp {
    pub fn name(self) -> &'static str {
        match self {
            EffectOp::Jmp => "jmp",
            EffectOp::Br => "br",
            EffectOp::Ret => "ret",
            EffectOp::Print => "print",
            EffectOp::Call => "call",
            EffectOp::Speculate => "speculate",
            EffectOp::Commit => "commit",
            EffectOp::Guard => "guard",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "jmp" => EffectOp::Jmp,
            "br" => EffectOp::Br,
            "ret" => EffectOp::Ret,
            "print" => EffectOp::Print,
            "call" => EffectOp::Call,
            "speculate" => EffectOp::Speculate,
            "commit" => EffectOp::Commit,
            "guard" => EffectOp::Guard,
            _ => return None,
        })
    }

    /// `br`/`jmp`/`ret` end a basic block (§4.1 `TERMINATORS`).
    pub fn is_terminator(self) -> bool {
        matches!(self, EffectOp::Br | EffectOp::Jmp | EffectOp::Ret)
    }
}

/// One instruction, tagged by shape (§3). `def_id` is the reaching-definitions
/// scratch annotation (`_def_id` on the wire); it never round-trips through
/// `to_json` and must be `None` by the time a function is handed back to a
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    pub def_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Label {
        name: String,
        extra: JsonMap,
    },
    Const {
        dest: String,
        typ: Type,
        value: Literal,
        extra: JsonMap,
    },
    Value {
        op: ValueOp,
        dest: String,
        typ: Type,
        args: Vec<String>,
        extra: JsonMap,
    },
    Effect {
        op: EffectOp,
        dest: Option<String>,
        typ: Option<Type>,
        args: Vec<String>,
        labels: Vec<String>,
        funcs: Vec<String>,
        extra: JsonMap,
    },
    Get {
        dest: String,
        typ: Type,
        extra: JsonMap,
    },
    Set {
        shadow: String,
        src: String,
        extra: JsonMap,
    },
    Undef {
        dest: String,
        typ: Type,
        extra: JsonMap,
    },
}

impl Instr {
    pub fn label(name: impl Into<String>) -> Self {
        Instr {
            kind: InstrKind::Label { name: name.into(), extra: JsonMap::new() },
            def_id: None,
        }
    }

    pub fn const_(dest: impl Into<String>, typ: Type, value: Literal) -> Self {
        Instr {
            kind: InstrKind::Const { dest: dest.into(), typ, value, extra: JsonMap::new() },
            def_id: None,
        }
    }

    pub fn value(op: ValueOp, dest: impl Into<String>, typ: Type, args: Vec<String>) -> Self {
        Instr {
            kind: InstrKind::Value { op, dest: dest.into(), typ, args, extra: JsonMap::new() },
            def_id: None,
        }
    }

    pub fn effect(op: EffectOp, args: Vec<String>, labels: Vec<String>) -> Self {
        Instr {
            kind: InstrKind::Effect {
                op,
                dest: None,
                typ: None,
                args,
                labels,
                funcs: Vec::new(),
                extra: JsonMap::new(),
            },
            def_id: None,
        }
    }

    pub fn jmp(label: impl Into<String>) -> Self {
        Instr::effect(EffectOp::Jmp, Vec::new(), vec![label.into()])
    }

    pub fn get(dest: impl Into<String>, typ: Type) -> Self {
        Instr { kind: InstrKind::Get { dest: dest.into(), typ, extra: JsonMap::new() }, def_id: None }
    }

    pub fn set(shadow: impl Into<String>, src: impl Into<String>) -> Self {
        Instr {
            kind: InstrKind::Set { shadow: shadow.into(), src: src.into(), extra: JsonMap::new() },
            def_id: None,
        }
    }

    pub fn undef(dest: impl Into<String>, typ: Type) -> Self {
        Instr { kind: InstrKind::Undef { dest: dest.into(), typ, extra: JsonMap::new() }, def_id: None }
    }

    pub fn is_label(&self) -> bool {
        matches!(self.kind, InstrKind::Label { .. })
    }

    pub fn label_name(&self) -> Option<&str> {
        match &self.kind {
            InstrKind::Label { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The opcode name, if this instruction carries one (labels don't).
    pub fn op_name(&self) -> Option<&'static str> {
        match &self.kind {
            InstrKind::Label { .. } => None,
            InstrKind::Const { .. } => Some("const"),
            InstrKind::Value { op, .. } => Some(op.name()),
            InstrKind::Effect { op, .. } => Some(op.name()),
            InstrKind::Get { .. } => Some("get"),
            InstrKind::Set { .. } => Some("set"),
            InstrKind::Undef { .. } => Some("undef"),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(&self.kind, InstrKind::Effect { op, .. } if op.is_terminator())
    }

    /// The variable this instruction defines, if any.
    ///
    /// `set` has no destination of its own (its shadow-variable slot is
    /// carried in `args` on the wire and is treated, deliberately, as a use
    /// — see `uses()`): the `get` at the join is what defines the shadow
    /// variable.
    pub fn dest(&self) -> Option<&str> {
        match &self.kind {
            InstrKind::Label { .. } => None,
            InstrKind::Const { dest, .. } => Some(dest),
            InstrKind::Value { dest, .. } => Some(dest),
            InstrKind::Effect { dest, .. } => dest.as_deref(),
            InstrKind::Get { dest, .. } => Some(dest),
            InstrKind::Set { .. } => None,
            InstrKind::Undef { dest, .. } => Some(dest),
        }
    }

    pub fn set_dest(&mut self, new_dest: String) {
        match &mut self.kind {
            InstrKind::Const { dest, .. }
            | InstrKind::Value { dest, .. }
            | InstrKind::Get { dest, .. }
            | InstrKind::Undef { dest, .. } => *dest = new_dest,
            InstrKind::Effect { dest, .. } => *dest = Some(new_dest),
            InstrKind::Label { .. } | InstrKind::Set { .. } => {}
        }
    }

    /// Variables this instruction reads, per the generic `args`-based
    /// definition used throughout the original pipeline (every analysis and
    /// transform in §4 builds on this one helper). For `set shadow, src`,
    /// BOTH `shadow` and `src` count as uses — not because `shadow` is
    /// data-read, but because this is exactly the mechanism that keeps a
    /// `get` alive under TDCE's global pass (§4.6): `shadow` showing up as a
    /// "use" is what puts the `get`'s destination in the live set.
    pub fn uses(&self) -> Vec<&str> {
        match &self.kind {
            InstrKind::Label { .. }
            | InstrKind::Const { .. }
            | InstrKind::Get { .. }
            | InstrKind::Undef { .. } => Vec::new(),
            InstrKind::Value { args, .. } => args.iter().map(String::as_str).collect(),
            InstrKind::Effect { args, .. } => args.iter().map(String::as_str).collect(),
            InstrKind::Set { shadow, src, .. } => vec![shadow.as_str(), src.as_str()],
        }
    }

    pub fn args(&self) -> &[String] {
        match &self.kind {
            InstrKind::Value { args, .. } => args,
            InstrKind::Effect { args, .. } => args,
            _ => &[],
        }
    }

    pub fn args_mut(&mut self) -> Option<&mut Vec<String>> {
        match &mut self.kind {
            InstrKind::Value { args, .. } => Some(args),
            InstrKind::Effect { args, .. } => Some(args),
            _ => None,
        }
    }

    pub fn labels(&self) -> &[String] {
        match &self.kind {
            InstrKind::Effect { labels, .. } => labels,
            _ => &[],
        }
    }

    pub fn labels_mut(&mut self) -> Option<&mut Vec<String>> {
        match &mut self.kind {
            InstrKind::Effect { labels, .. } => Some(labels),
            _ => None,
        }
    }

    pub fn typ(&self) -> Option<&Type> {
        match &self.kind {
            InstrKind::Const { typ, .. } => Some(typ),
            InstrKind::Value { typ, .. } => Some(typ),
            InstrKind::Effect { typ, .. } => typ.as_ref(),
            InstrKind::Get { typ, .. } => Some(typ),
            InstrKind::Undef { typ, .. } => Some(typ),
            InstrKind::Label { .. } | InstrKind::Set { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------
// Wire format (de)serialization.
//
// The JSON shape is an untyped map with overlapping optional keys; we
// deserialize into this intermediate struct first and then classify it,
// which is the natural Rust analogue of the design note's "sum type with a
// side-band map for unknown keys".
// ---------------------------------------------------------------------

#[derive(Serialize, Deserialize, Default)]
struct RawInstr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dest: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    typ: Option<Type>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    funcs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Json>,
    #[serde(flatten)]
    extra: JsonMap,
}

impl Serialize for Type {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Type::Int => serializer.serialize_str("int"),
            Type::Bool => serializer.serialize_str("bool"),
            Type::Ptr(inner) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("ptr", inner.as_ref())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Json::deserialize(deserializer)?;
        Type::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl Type {
    fn from_json(value: &Json) -> std::result::Result<Type, String> {
        match value {
            Json::String(s) if s == "int" => Ok(Type::Int),
            Json::String(s) if s == "bool" => Ok(Type::Bool),
            Json::Object(map) => {
                let inner = map.get("ptr").ok_or_else(|| "expected `ptr` key".to_string())?;
                Ok(Type::Ptr(Box::new(Type::from_json(inner)?)))
            }
            other => Err(format!("invalid type literal: {other}")),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Type::Int => Json::String("int".to_string()),
            Type::Bool => Json::String("bool".to_string()),
            Type::Ptr(inner) => {
                let mut map = JsonMap::new();
                map.insert("ptr".to_string(), inner.to_json());
                Json::Object(map)
            }
        }
    }
}

impl Literal {
    fn from_json(value: &Json, typ: Option<&Type>) -> std::result::Result<Literal, String> {
        match (value, typ) {
            (Json::Bool(b), _) => Ok(Literal::Bool(*b)),
            (Json::Number(n), Some(Type::Bool)) => {
                Ok(Literal::Bool(n.as_i64().map(|v| v != 0).unwrap_or(false)))
            }
            (Json::Number(n), _) => n
                .as_i64()
                .map(Literal::Int)
                .ok_or_else(|| format!("const value {n} is not a 64-bit integer")),
            (other, _) => Err(format!("unsupported const literal: {other}")),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Literal::Int(n) => Json::Number((*n).into()),
            Literal::Bool(b) => Json::Bool(*b),
        }
    }
}

/// Keys the `Instr` model understands natively; anything else lands in `extra`.
const KNOWN_KEYS: &[&str] = &["label", "op", "dest", "type", "args", "labels", "funcs", "value"];

fn strip_scratch_keys(map: &mut JsonMap) {
    map.retain(|k, _| !k.starts_with('_'));
}

impl Instr {
    pub fn from_json(value: Json) -> std::result::Result<Instr, String> {
        let mut raw: RawInstr = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let def_id = match raw.extra.remove("_def_id") {
            Some(Json::String(s)) => Some(s),
            _ => None,
        };

        if let Some(name) = raw.label.take() {
            return Ok(Instr { kind: InstrKind::Label { name, extra: raw.extra }, def_id });
        }

        let op = raw.op.ok_or_else(|| "instruction missing `op` and `label`".to_string())?;

        if op == "const" {
            let dest = raw.dest.ok_or("const missing dest")?;
            let typ = raw.typ.ok_or("const missing type")?;
            let value = raw.value.ok_or("const missing value")?;
            let value = Literal::from_json(&value, Some(&typ))?;
            return Ok(Instr {
                kind: InstrKind::Const { dest, typ, value, extra: raw.extra },
                def_id,
            });
        }
        if op == "get" {
            let dest = raw.dest.ok_or("get missing dest")?;
            let typ = raw.typ.ok_or("get missing type")?;
            return Ok(Instr { kind: InstrKind::Get { dest, typ, extra: raw.extra }, def_id });
        }
        if op == "undef" {
            let dest = raw.dest.ok_or("undef missing dest")?;
            let typ = raw.typ.ok_or("undef missing type")?;
            return Ok(Instr { kind: InstrKind::Undef { dest, typ, extra: raw.extra }, def_id });
        }
        if op == "set" {
            if raw.args.len() != 2 {
                return Err(format!("set expects exactly two args, got {}", raw.args.len()));
            }
            let src = raw.args.pop().unwrap();
            let shadow = raw.args.pop().unwrap();
            return Ok(Instr { kind: InstrKind::Set { shadow, src, extra: raw.extra }, def_id });
        }
        if let Some(value_op) = ValueOp::from_name(&op) {
            let dest = raw.dest.ok_or_else(|| format!("{op} missing dest"))?;
            let typ = raw.typ.ok_or_else(|| format!("{op} missing type"))?;
            return Ok(Instr {
                kind: InstrKind::Value { op: value_op, dest, typ, args: raw.args, extra: raw.extra },
                def_id,
            });
        }
        if let Some(effect_op) = EffectOp::from_name(&op) {
            return Ok(Instr {
                kind: InstrKind::Effect {
                    op: effect_op,
                    dest: raw.dest,
                    typ: raw.typ,
                    args: raw.args,
                    labels: raw.labels,
                    funcs: raw.funcs,
                    extra: raw.extra,
                },
                def_id,
            });
        }

        Err(format!("unrecognized opcode `{op}`"))
    }

    pub fn to_json(&self) -> Json {
        let mut map = JsonMap::new();
        let extra = match &self.kind {
            InstrKind::Label { name, extra } => {
                map.insert("label".to_string(), Json::String(name.clone()));
                extra
            }
            InstrKind::Const { dest, typ, value, extra } => {
                map.insert("op".to_string(), Json::String("const".to_string()));
                map.insert("dest".to_string(), Json::String(dest.clone()));
                map.insert("type".to_string(), typ.to_json());
                map.insert("value".to_string(), value.to_json());
                extra
            }
            InstrKind::Value { op, dest, typ, args, extra } => {
                map.insert("op".to_string(), Json::String(op.name().to_string()));
                map.insert("dest".to_string(), Json::String(dest.clone()));
                map.insert("type".to_string(), typ.to_json());
                if !args.is_empty() {
                    map.insert("args".to_string(), json_strings(args));
                }
                extra
            }
            InstrKind::Effect { op, dest, typ, args, labels, funcs, extra } => {
                map.insert("op".to_string(), Json::String(op.name().to_string()));
                if let Some(dest) = dest {
                    map.insert("dest".to_string(), Json::String(dest.clone()));
                }
                if let Some(typ) = typ {
                    map.insert("type".to_string(), typ.to_json());
                }
                if !args.is_empty() {
                    map.insert("args".to_string(), json_strings(args));
                }
                if !labels.is_empty() {
                    map.insert("labels".to_string(), json_strings(labels));
                }
                if !funcs.is_empty() {
                    map.insert("funcs".to_string(), json_strings(funcs));
                }
                extra
            }
            InstrKind::Get { dest, typ, extra } => {
                map.insert("op".to_string(), Json::String("get".to_string()));
                map.insert("dest".to_string(), Json::String(dest.clone()));
                map.insert("type".to_string(), typ.to_json());
                extra
            }
            InstrKind::Set { shadow, src, extra } => {
                map.insert("op".to_string(), Json::String("set".to_string()));
                map.insert(
                    "args".to_string(),
                    json_strings(&[shadow.clone(), src.clone()]),
                );
                extra
            }
            InstrKind::Undef { dest, typ, extra } => {
                map.insert("op".to_string(), Json::String("undef".to_string()));
                map.insert("dest".to_string(), Json::String(dest.clone()));
                map.insert("type".to_string(), typ.to_json());
                extra
            }
        };
        let mut extra = extra.clone();
        strip_scratch_keys(&mut extra);
        for (k, v) in extra {
            if !KNOWN_KEYS.contains(&k.as_str()) {
                map.insert(k, v);
            }
        }
        Json::Object(map)
    }
}

fn json_strings(items: &[String]) -> Json {
    Json::Array(items.iter().cloned().map(Json::String).collect())
}

impl Param {
    fn from_json(value: &Json) -> std::result::Result<Param, String> {
        let name = value
            .get("name")
            .and_then(Json::as_str)
            .ok_or("param missing name")?
            .to_string();
        let typ = value.get("type").ok_or("param missing type")?;
        let typ = Type::from_json(typ)?;
        Ok(Param { name, typ })
    }

    fn to_json(&self) -> Json {
        let mut map = JsonMap::new();
        map.insert("name".to_string(), Json::String(self.name.clone()));
        map.insert("type".to_string(), self.typ.to_json());
        Json::Object(map)
    }
}

impl Function {
    pub fn from_json(value: &Json) -> std::result::Result<Function, String> {
        let obj = value.as_object().ok_or("function must be a JSON object")?;
        let name = obj
            .get("name")
            .and_then(Json::as_str)
            .ok_or("function missing name")?
            .to_string();
        let args = match obj.get("args") {
            Some(Json::Array(items)) => items
                .iter()
                .map(Param::from_json)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        let ret_type = match obj.get("type") {
            Some(t) => Some(Type::from_json(t)?),
            None => None,
        };
        let instrs = match obj.get("instrs") {
            Some(Json::Array(items)) => items
                .iter()
                .cloned()
                .map(Instr::from_json)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        Ok(Function { name, args, ret_type, instrs })
    }

    pub fn to_json(&self) -> Json {
        let mut map = JsonMap::new();
        map.insert("name".to_string(), Json::String(self.name.clone()));
        if !self.args.is_empty() {
            map.insert(
                "args".to_string(),
                Json::Array(self.args.iter().map(Param::to_json).collect()),
            );
        }
        if let Some(ret_type) = &self.ret_type {
            map.insert("type".to_string(), ret_type.to_json());
        }
        map.insert(
            "instrs".to_string(),
            Json::Array(self.instrs.iter().map(Instr::to_json).collect()),
        );
        Json::Object(map)
    }

    /// Clear the `_def_id` scratch annotation from every instruction.
    pub fn clear_def_ids(&mut self) {
        for instr in &mut self.instrs {
            instr.def_id = None;
        }
    }
}

impl Program {
    pub fn from_json(value: &Json) -> std::result::Result<Program, String> {
        let functions = value
            .get("functions")
            .and_then(Json::as_array)
            .ok_or("program missing `functions` array")?
            .iter()
            .map(Function::from_json)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Program { functions })
    }

    pub fn to_json(&self) -> Json {
        let mut map = JsonMap::new();
        map.insert(
            "functions".to_string(),
            Json::Array(self.functions.iter().map(Function::to_json).collect()),
        );
        Json::Object(map)
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_small_program() {
        let raw = json!({
            "functions": [{
                "name": "main",
                "args": [{"name": "n", "type": "int"}],
                "instrs": [
                    {"op": "const", "dest": "a", "type": "int", "value": 1},
                    {"op": "add", "dest": "b", "type": "int", "args": ["a", "n"]},
                    {"label": "loop"},
                    {"op": "print", "args": ["b"]},
                    {"op": "ret"}
                ]
            }]
        });
        let program = Program::from_json(&raw).unwrap();
        let main = program.find_function("main").unwrap();
        assert_eq!(main.args, vec![Param { name: "n".into(), typ: Type::Int }]);
        assert_eq!(main.instrs.len(), 5);
        assert!(matches!(main.instrs[0].kind, InstrKind::Const { value: Literal::Int(1), .. }));
        assert_eq!(main.instrs[2].label_name(), Some("loop"));

        let back = Program::from_json(&program.to_json()).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn pointer_type_round_trips() {
        let typ = Type::Ptr(Box::new(Type::Int));
        assert_eq!(Type::from_json(&typ.to_json()).unwrap(), typ);
    }

    #[test]
    fn label_instruction_round_trips() {
        let raw = json!({"label": "loop"});
        let instr = Instr::from_json(raw).unwrap();
        assert_eq!(instr.label_name(), Some("loop"));
        assert_eq!(instr.to_json(), json!({"label": "loop"}));
    }

    #[test]
    fn unknown_keys_flow_through_to_emission() {
        let raw = json!({
            "op": "const",
            "dest": "x",
            "type": "int",
            "value": 1,
            "pos": {"line": 3, "col": 5}
        });
        let instr = Instr::from_json(raw).unwrap();
        let out = instr.to_json();
        assert_eq!(out.get("pos"), Some(&json!({"line": 3, "col": 5})));
    }

    #[test]
    fn scratch_keys_are_stripped_before_emission() {
        let raw = json!({
            "op": "const",
            "dest": "x",
            "type": "int",
            "value": 1,
            "_def_id": "x@b0:0"
        });
        let instr = Instr::from_json(raw).unwrap();
        assert_eq!(instr.def_id.as_deref(), Some("x@b0:0"));
        let out = instr.to_json();
        assert!(out.get("_def_id").is_none());
    }

    #[test]
    fn set_instruction_round_trips_as_two_args() {
        let raw = json!({"op": "set", "args": ["w", "v"]});
        let instr = Instr::from_json(raw).unwrap();
        assert!(matches!(&instr.kind, InstrKind::Set { shadow, src, .. } if shadow == "w" && src == "v"));
        let out = instr.to_json();
        assert_eq!(out.get("args"), Some(&json!(["w", "v"])));
    }

    #[test]
    fn rejects_unrecognized_opcode() {
        let raw = json!({"op": "nonsense"});
        assert!(Instr::from_json(raw).is_err());
    }
}
