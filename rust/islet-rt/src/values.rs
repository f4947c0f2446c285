//! Runtime values for interpreted code.
//!
//! Values are owned trees: assigning a list to a second name copies it, so
//! no two bindings (and no two interpreter contexts) ever share mutable
//! state.

use indexmap::IndexMap;
use islet_compiler::compiler::ast::FunctionDef;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Deepest list/dict nesting a stored value may reach. Matches the nesting
/// `serde_json` accepts, so `json.loads` output always fits.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Runtime values in the interpreter.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<Key, Value>),
    Function(Arc<FunctionValue>),
    Builtin(Builtin),
    /// A module loaded into the owning context, referenced by name.
    Module(String),
}

/// Hashable subset of values usable as dict keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
}

/// A `def` together with its default values, evaluated once at definition time.
#[derive(Debug)]
pub struct FunctionValue {
    pub def: Arc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    /// Names the body declares `global`.
    pub globals: Arc<HashSet<String>>,
}

/// Native callables: global builtins and module functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Global(&'static str),
    Module(&'static str, &'static str),
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Global(name) | Builtin::Module(_, name) => name,
        }
    }
}

impl Key {
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::None => Some(Key::None),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            _ => true,
        }
    }

    /// Name of the value's type as interpreted code sees it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self { Value::Int(n) => Some(*n), Value::Bool(b) => Some(*b as i64), _ => None }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Value::Str(s) => Some(s), _ => None }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self { Value::List(l) => Some(l), _ => None }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<Key, Value>> {
        match self { Value::Dict(d) => Some(d), _ => None }
    }

    /// Plain data values can cross the host boundary; callables and modules cannot.
    pub fn is_data(&self) -> bool {
        match self {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => true,
            Value::List(items) => items.iter().all(Value::is_data),
            Value::Dict(map) => map.values().all(Value::is_data),
            Value::Function(_) | Value::Builtin(_) | Value::Module(_) => false,
        }
    }

    /// Container nesting: 0 for scalars, 1 for a flat list or dict.
    ///
    /// Walks with an explicit stack, so arbitrarily deep host values are safe.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0usize)];
        while let Some((value, level)) = pending.pop() {
            match value {
                Value::List(items) => {
                    deepest = deepest.max(level + 1);
                    pending.extend(items.iter().map(|v| (v, level + 1)));
                }
                Value::Dict(map) => {
                    deepest = deepest.max(level + 1);
                    pending.extend(map.values().map(|v| (v, level + 1)));
                }
                _ => {}
            }
        }
        deepest
    }

    /// Approximate heap footprint in bytes, used for memory accounting.
    pub fn approx_size(&self) -> usize {
        const SLOT: usize = std::mem::size_of::<Value>();
        match self {
            Value::Str(s) => SLOT + s.len(),
            Value::List(items) => SLOT + items.iter().map(Value::approx_size).sum::<usize>(),
            Value::Dict(map) => {
                SLOT + map.iter().map(|(k, v)| k.approx_size() + v.approx_size()).sum::<usize>()
            }
            Value::Module(name) => SLOT + name.len(),
            _ => SLOT,
        }
    }

    /// `str(value)`: strings print bare, containers print their items' reprs.
    pub fn display_pretty(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(l) => {
                let items: Vec<String> = l.iter().map(|v| v.repr()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Dict(m) => {
                let items: Vec<String> =
                    m.iter().map(|(k, v)| format!("{}: {}", k.to_value().repr(), v.repr())).collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.def.name),
            Value::Builtin(b) => format!("<built-in function {}>", b.name()),
            Value::Module(name) => format!("<module '{}'>", name),
        }
    }
}

impl Key {
    pub fn approx_size(&self) -> usize {
        match self {
            Key::Str(s) => std::mem::size_of::<Key>() + s.len(),
            _ => std::mem::size_of::<Key>(),
        }
    }
}

/// Structural equality; functions compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_pretty())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Int(n) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(s) }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self { Value::List(items.into_iter().map(Into::into).collect()) }
}

/// Floats always show a fractional part or an exponent, like `1.0` and `1e+20`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let s = format!("{:e}", f);
        return match s.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => s,
        };
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => { out.push('\\'); out.push(c); }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Dict(IndexMap::new()).is_truthy());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_repr_and_display() {
        let mut d = IndexMap::new();
        d.insert(Key::Str("a".into()), Value::List(vec![Value::Int(1), Value::Str("b".into())]));
        d.insert(Key::Int(2), Value::None);
        let v = Value::Dict(d);
        assert_eq!(v.repr(), "{'a': [1, 'b'], 2: None}");
        assert_eq!(Value::Str("hi".into()).display_pretty(), "hi");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
        assert_eq!(Value::Bool(true).to_string(), "True");
    }

    #[test]
    fn test_size_grows_with_content() {
        let small = Value::Str("a".into()).approx_size();
        let big = Value::Str("a".repeat(1000)).approx_size();
        assert!(big >= small + 999);
        let list = Value::from(vec![1i64, 2, 3]);
        assert!(list.approx_size() > Value::Int(1).approx_size() * 3);
    }

    #[test]
    fn test_is_data() {
        assert!(Value::from(vec!["a", "b"]).is_data());
        assert!(!Value::List(vec![Value::Module("math".into())]).is_data());
    }
}
