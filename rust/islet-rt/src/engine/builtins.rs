//! Global builtin functions.

use super::ops::{self, hash_key};
use super::{Args, Engine, Unwind};
use crate::fault::{Fault, FaultKind};
use crate::values::{Builtin, Key, Value};
use islet_compiler::compiler::ast::BinOp;
use indexmap::IndexMap;

/// Names resolved after locals and globals miss.
pub const BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "abs", "min", "max", "sum", "sorted",
    "reversed", "round", "type", "repr", "any", "all",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub(super) fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| **b == name).map(|b| Builtin::Global(*b))
}

/// Number of values `range(start, stop, step)` yields.
pub(super) fn range_len(start: i64, stop: i64, step: i64) -> u64 {
    let (span, step) = match step {
        s if s > 0 && stop > start => ((stop as i128 - start as i128) as u128, s as u128),
        s if s < 0 && stop < start => ((start as i128 - stop as i128) as u128, s.unsigned_abs() as u128),
        _ => return 0,
    };
    ((span + step - 1) / step).min(u64::MAX as u128) as u64
}

/// Positional `range` arguments as `(start, stop, step)`.
pub(super) fn range_bounds(args: &Args) -> Result<(i64, i64, i64), Fault> {
    args.expect("range", 1, 3)?;
    let (start, stop, step) = match args.len() {
        1 => (0, args.int(0, "range")?, 1),
        2 => (args.int(0, "range")?, args.int(1, "range")?, 1),
        _ => (args.int(0, "range")?, args.int(1, "range")?, args.int(2, "range")?),
    };
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    Ok((start, stop, step))
}

fn one_iterable(func: &str, args: &Args) -> Result<Vec<Value>, Fault> {
    args.expect(func, 1, 1)?;
    ops::iterate(&args.positional[0])
}

fn parse_int(text: &str) -> Option<i64> {
    let t = text.trim();
    let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '_') || digits.starts_with('_') {
        return None;
    }
    t.replace('_', "").parse().ok()
}

fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim();
    match t.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        _ => t.parse().ok(),
    }
}

fn float_to_int(f: f64) -> Result<i64, Fault> {
    if f.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Fault::new(FaultKind::OverflowError, "cannot convert float infinity to integer"));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(Fault::overflow());
    }
    Ok(t as i64)
}

fn min_max(func: &str, mut args: Args, want: std::cmp::Ordering) -> Result<Value, Fault> {
    let default = args.take_keyword("default");
    args.expect(func, 1, usize::MAX)?;
    let items = if args.len() == 1 { ops::iterate(&args.positional[0])? } else { args.positional };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                if ops::compare(BinOp::Lt, &item, &current)? == Some(want) {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.or(default).ok_or_else(|| Fault::value_error(format!("{}() arg is an empty sequence", func)))
}

impl<'a> Engine<'a> {
    pub(super) fn call_builtin(&mut self, name: &str, mut args: Args) -> Result<Value, Unwind> {
        let value = match name {
            "print" => {
                let sep = match args.take_keyword("sep") {
                    None | Some(Value::None) => " ".to_string(),
                    Some(Value::Str(s)) => s,
                    Some(other) => {
                        return Err(Fault::type_error(format!("sep must be None or a string, not {}", other.type_name())).into())
                    }
                };
                let end = match args.take_keyword("end") {
                    None | Some(Value::None) => "\n".to_string(),
                    Some(Value::Str(s)) => s,
                    Some(other) => {
                        return Err(Fault::type_error(format!("end must be None or a string, not {}", other.type_name())).into())
                    }
                };
                args.expect("print", 0, usize::MAX)?;
                let parts: Vec<String> = args.positional.iter().map(Value::display_pretty).collect();
                let mut line = parts.join(&sep);
                line.push_str(&end);
                self.write_output(&line)?;
                Value::None
            }
            "len" => {
                args.expect("len", 1, 1)?;
                let n = match &args.positional[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Dict(map) => map.len(),
                    other => {
                        return Err(Fault::type_error(format!("object of type '{}' has no len()", other.type_name())).into())
                    }
                };
                Value::Int(n as i64)
            }
            "range" => {
                let (start, stop, step) = range_bounds(&args)?;
                let count = range_len(start, stop, step);
                let projected = count.saturating_mul(std::mem::size_of::<Value>() as u64);
                if let Some(limit) = self.value_limit {
                    if projected > limit as u64 {
                        return Err(Fault::memory(format!("range of {} items exceeds memory limit", count)).into());
                    }
                }
                let mut items = Vec::new();
                usize::try_from(count)
                    .ok()
                    .and_then(|n| items.try_reserve_exact(n).ok())
                    .ok_or_else(|| Fault::memory(format!("range of {} items is too large", count)))?;
                let mut n = start;
                for _ in 0..count {
                    items.push(Value::Int(n));
                    n = n.wrapping_add(step);
                }
                Value::List(items)
            }
            "str" => {
                args.expect("str", 0, 1)?;
                Value::Str(args.get(0).map(Value::display_pretty).unwrap_or_default())
            }
            "repr" => {
                args.expect("repr", 1, 1)?;
                Value::Str(args.positional[0].repr())
            }
            "int" => {
                args.expect("int", 0, 1)?;
                match args.get(0) {
                    None => Value::Int(0),
                    Some(Value::Int(n)) => Value::Int(*n),
                    Some(Value::Bool(b)) => Value::Int(*b as i64),
                    Some(Value::Float(f)) => Value::Int(float_to_int(*f)?),
                    Some(Value::Str(s)) => Value::Int(parse_int(s).ok_or_else(|| {
                        Fault::value_error(format!("invalid literal for int() with base 10: {}", Value::from(s.as_str()).repr()))
                    })?),
                    Some(other) => {
                        return Err(Fault::type_error(format!(
                            "int() argument must be a string or a number, not '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                }
            }
            "float" => {
                args.expect("float", 0, 1)?;
                match args.get(0) {
                    None => Value::Float(0.0),
                    Some(v @ (Value::Int(_) | Value::Bool(_) | Value::Float(_))) => Value::Float(v.as_float().unwrap_or_default()),
                    Some(Value::Str(s)) => Value::Float(parse_float(s).ok_or_else(|| {
                        Fault::value_error(format!("could not convert string to float: {}", Value::from(s.as_str()).repr()))
                    })?),
                    Some(other) => {
                        return Err(Fault::type_error(format!(
                            "float() argument must be a string or a number, not '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                }
            }
            "bool" => {
                args.expect("bool", 0, 1)?;
                Value::Bool(args.get(0).is_some_and(Value::is_truthy))
            }
            "list" => {
                args.expect("list", 0, 1)?;
                match args.get(0) {
                    None => Value::List(Vec::new()),
                    Some(v) => Value::List(ops::iterate(v)?),
                }
            }
            "dict" => {
                let keywords = std::mem::take(&mut args.keywords);
                args.expect("dict", 0, 1)?;
                let mut map = match args.positional.pop() {
                    None => IndexMap::new(),
                    Some(Value::Dict(map)) => map,
                    Some(other) => {
                        let mut map = IndexMap::new();
                        for pair in ops::iterate(&other)? {
                            match pair.as_list().map(Vec::as_slice) {
                                Some([k, v]) => {
                                    map.insert(hash_key(k)?, v.clone());
                                }
                                _ => {
                                    return Err(Fault::type_error(
                                        "dict() sequence elements must be pairs of key and value",
                                    )
                                    .into())
                                }
                            }
                        }
                        map
                    }
                };
                for (k, v) in keywords {
                    map.insert(Key::Str(k), v);
                }
                Value::Dict(map)
            }
            "abs" => {
                args.expect("abs", 1, 1)?;
                match &args.positional[0] {
                    Value::Int(n) => Value::Int(n.checked_abs().ok_or_else(Fault::overflow)?),
                    Value::Bool(b) => Value::Int(*b as i64),
                    Value::Float(f) => Value::Float(f.abs()),
                    other => {
                        return Err(Fault::type_error(format!("bad operand type for abs(): '{}'", other.type_name())).into())
                    }
                }
            }
            "min" => min_max("min", args, std::cmp::Ordering::Less)?,
            "max" => min_max("max", args, std::cmp::Ordering::Greater)?,
            "sum" => {
                let start = args.take_keyword("start");
                args.expect("sum", 1, 2)?;
                let mut total = start.or_else(|| args.get(1).cloned()).unwrap_or(Value::Int(0));
                if total.as_str().is_some() {
                    return Err(Fault::type_error("sum() can't sum strings [use ''.join(seq) instead]").into());
                }
                for item in ops::iterate(&args.positional[0])? {
                    self.interrupt.check()?;
                    total = ops::binary(BinOp::Add, total, item)?;
                }
                total
            }
            "sorted" => {
                let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
                let mut items = one_iterable("sorted", &args)?;
                ops::sort_values(&mut items, reverse)?;
                Value::List(items)
            }
            "reversed" => {
                let mut items = one_iterable("reversed", &args)?;
                items.reverse();
                Value::List(items)
            }
            "round" => {
                args.expect("round", 1, 2)?;
                let digits = match args.get(1) {
                    None | Some(Value::None) => None,
                    Some(_) => Some(args.int(1, "round")?),
                };
                match (&args.positional[0], digits) {
                    (Value::Int(n), _) => Value::Int(*n),
                    (Value::Bool(b), _) => Value::Int(*b as i64),
                    (Value::Float(f), None) => Value::Int(float_to_int(f.round_ties_even())?),
                    (Value::Float(f), Some(d)) => {
                        let scale = 10f64.powi(d.clamp(-308, 308) as i32);
                        let rounded = (f * scale).round_ties_even() / scale;
                        Value::Float(if rounded.is_finite() { rounded } else { *f })
                    }
                    (other, _) => {
                        return Err(Fault::type_error(format!(
                            "type {} doesn't define __round__ method",
                            other.type_name()
                        ))
                        .into())
                    }
                }
            }
            "type" => {
                args.expect("type", 1, 1)?;
                Value::Str(format!("<class '{}'>", args.positional[0].type_name()))
            }
            "any" => Value::Bool(one_iterable("any", &args)?.iter().any(Value::is_truthy)),
            "all" => Value::Bool(one_iterable("all", &args)?.iter().all(Value::is_truthy)),
            other => return Err(Fault::name_error(other).into()),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_len() {
        assert_eq!(range_len(0, 10, 1), 10);
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -2), 5);
        assert_eq!(range_len(0, 0, 1), 0);
        assert_eq!(range_len(5, 0, 1), 0);
        assert_eq!(range_len(i64::MIN, i64::MAX, 1), u64::MAX);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_int(" 42 "), Some(42));
        assert_eq!(parse_int("-1_000"), Some(-1000));
        assert_eq!(parse_int("4.2"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_float("2.5"), Some(2.5));
        assert!(parse_float("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_float("abc"), None);
    }

    #[test]
    fn test_builtin_names() {
        assert!(is_builtin("print"));
        assert!(!is_builtin("eval"));
        assert_eq!(lookup("len"), Some(Builtin::Global("len")));
    }
}
