//! Operators on runtime values.

use crate::fault::Fault;
use crate::values::{Key, Value};
use islet_compiler::compiler::ast::{BinOp, UnaryOp};
use std::cmp::Ordering;

enum Num {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn num_pair(l: &Value, r: &Value) -> Option<Num> {
    match (l, r) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            Some(Num::Ints(l.as_int()?, r.as_int()?))
        }
        (Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_))
        | (Value::Int(_) | Value::Bool(_), Value::Float(_)) => Some(Num::Floats(l.as_float()?, r.as_float()?)),
        _ => None,
    }
}

fn unsupported(op: BinOp, l: &Value, r: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        l.type_name(),
        r.type_name()
    ))
}

/// Apply an arithmetic, comparison or membership operator.
///
/// `and` / `or` short-circuit in the engine and never reach here.
pub fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, Fault> {
    match op {
        BinOp::Add => add(l, r),
        BinOp::Sub => arith(op, &l, &r, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => mul(l, r),
        BinOp::Div => match num_pair(&l, &r) {
            Some(Num::Ints(_, 0)) => Err(Fault::zero_division("division by zero")),
            Some(Num::Floats(_, b)) if b == 0.0 => Err(Fault::zero_division("float division by zero")),
            Some(Num::Ints(a, b)) => Ok(Value::Float(a as f64 / b as f64)),
            Some(Num::Floats(a, b)) => Ok(Value::Float(a / b)),
            None => Err(unsupported(op, &l, &r)),
        },
        BinOp::FloorDiv => match num_pair(&l, &r) {
            Some(Num::Ints(_, 0)) => Err(Fault::zero_division("integer division or modulo by zero")),
            Some(Num::Floats(_, b)) if b == 0.0 => Err(Fault::zero_division("float floor division by zero")),
            Some(Num::Ints(a, b)) => floor_div(a, b).map(Value::Int).ok_or_else(Fault::overflow),
            Some(Num::Floats(a, b)) => Ok(Value::Float((a / b).floor())),
            None => Err(unsupported(op, &l, &r)),
        },
        BinOp::Mod => match num_pair(&l, &r) {
            Some(Num::Ints(_, 0)) => Err(Fault::zero_division("integer modulo by zero")),
            Some(Num::Floats(_, b)) if b == 0.0 => Err(Fault::zero_division("float modulo")),
            Some(Num::Ints(a, b)) => floor_mod(a, b).map(Value::Int).ok_or_else(Fault::overflow),
            Some(Num::Floats(a, b)) => Ok(Value::Float(a - b * (a / b).floor())),
            None => Err(unsupported(op, &l, &r)),
        },
        BinOp::Pow => pow(&l, &r),
        BinOp::Eq => Ok(Value::Bool(equals(&l, &r))),
        BinOp::NotEq => Ok(Value::Bool(!equals(&l, &r))),
        BinOp::Lt => Ok(Value::Bool(compare(op, &l, &r)? == Some(Ordering::Less))),
        BinOp::LtEq => Ok(Value::Bool(matches!(compare(op, &l, &r)?, Some(Ordering::Less | Ordering::Equal)))),
        BinOp::Gt => Ok(Value::Bool(compare(op, &l, &r)? == Some(Ordering::Greater))),
        BinOp::GtEq => Ok(Value::Bool(matches!(compare(op, &l, &r)?, Some(Ordering::Greater | Ordering::Equal)))),
        BinOp::In => Ok(Value::Bool(contains(&r, &l)?)),
        BinOp::NotIn => Ok(Value::Bool(!contains(&r, &l)?)),
        BinOp::And => Ok(if l.is_truthy() { r } else { l }),
        BinOp::Or => Ok(if l.is_truthy() { l } else { r }),
    }
}

fn arith(
    op: BinOp,
    l: &Value,
    r: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Fault> {
    match num_pair(l, r) {
        Some(Num::Ints(a, b)) => int_op(a, b).map(Value::Int).ok_or_else(Fault::overflow),
        Some(Num::Floats(a, b)) => Ok(Value::Float(float_op(a, b))),
        None => Err(unsupported(op, l, r)),
    }
}

fn add(l: Value, r: Value) -> Result<Value, Fault> {
    match (l, r) {
        (Value::Str(mut a), Value::Str(b)) => {
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (l, r) => arith(BinOp::Add, &l, &r, i64::checked_add, |a, b| a + b),
    }
}

fn mul(l: Value, r: Value) -> Result<Value, Fault> {
    match (&l, &r) {
        (Value::Str(s), Value::Int(_) | Value::Bool(_)) | (Value::Int(_) | Value::Bool(_), Value::Str(s)) => {
            let n = l.as_int().or_else(|| r.as_int()).unwrap_or(0);
            let count = usize::try_from(n.max(0)).map_err(|_| Fault::overflow())?;
            let total = s.len().checked_mul(count).ok_or_else(|| Fault::memory("repeated string is too large"))?;
            let mut out = String::new();
            out.try_reserve_exact(total).map_err(|_| Fault::memory("repeated string is too large"))?;
            for _ in 0..count {
                out.push_str(s);
            }
            Ok(Value::Str(out))
        }
        (Value::List(items), Value::Int(_) | Value::Bool(_)) | (Value::Int(_) | Value::Bool(_), Value::List(items)) => {
            let n = l.as_int().or_else(|| r.as_int()).unwrap_or(0);
            let count = usize::try_from(n.max(0)).map_err(|_| Fault::overflow())?;
            let total = items.len().checked_mul(count).ok_or_else(|| Fault::memory("repeated list is too large"))?;
            let mut out = Vec::new();
            out.try_reserve_exact(total).map_err(|_| Fault::memory("repeated list is too large"))?;
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => arith(BinOp::Mul, &l, &r, i64::checked_mul, |a, b| a * b),
    }
}

/// Projected byte size of `l * r` for sequence repetition, checked before building it.
pub fn repeat_size(l: &Value, r: &Value) -> Option<usize> {
    let (seq, n) = match (l, r) {
        (seq @ (Value::Str(_) | Value::List(_)), n @ (Value::Int(_) | Value::Bool(_)))
        | (n @ (Value::Int(_) | Value::Bool(_)), seq @ (Value::Str(_) | Value::List(_))) => (seq, n.as_int()?),
        _ => return None,
    };
    let count = usize::try_from(n.max(0)).ok()?;
    Some(seq.approx_size().saturating_mul(count))
}

fn pow(l: &Value, r: &Value) -> Result<Value, Fault> {
    match num_pair(l, r) {
        Some(Num::Ints(0, b)) if b < 0 => Err(Fault::zero_division("0.0 cannot be raised to a negative power")),
        Some(Num::Ints(a, b)) if b < 0 => Ok(Value::Float((a as f64).powf(b as f64))),
        Some(Num::Ints(a, b)) => {
            let exp = u32::try_from(b).map_err(|_| Fault::overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(Fault::overflow)
        }
        Some(Num::Floats(a, b)) => {
            if a == 0.0 && b < 0.0 {
                return Err(Fault::zero_division("0.0 cannot be raised to a negative power"));
            }
            Ok(Value::Float(a.powf(b)))
        }
        None => Err(unsupported(BinOp::Pow, l, r)),
    }
}

/// Integer division rounding toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) { q.checked_sub(1) } else { Some(q) }
}

/// Remainder with the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) { Some(r + b) } else { Some(r) }
}

pub fn unary(op: UnaryOp, v: Value) -> Result<Value, Fault> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(Fault::overflow),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(b as i64))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(b as i64)),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (op, v) => Err(Fault::type_error(format!("bad operand type for unary {}: '{}'", op, v.type_name()))),
    }
}

/// `==` with numeric coercion (`1 == 1.0`, `True == 1`).
pub fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y)),
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| equals(v, w)))
        }
        _ => match num_pair(l, r) {
            Some(Num::Ints(a, b)) => a == b,
            Some(Num::Floats(a, b)) => a == b,
            None => l == r,
        },
    }
}

/// Ordering for `<`-style operators; `None` when unordered (NaN).
pub fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Option<Ordering>, Fault> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !equals(x, y) {
                    return compare(op, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match num_pair(l, r) {
            Some(Num::Ints(a, b)) => Ok(Some(a.cmp(&b))),
            Some(Num::Floats(a, b)) => Ok(a.partial_cmp(&b)),
            None => Err(Fault::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op,
                l.type_name(),
                r.type_name()
            ))),
        },
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, Fault> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|v| equals(v, item))),
        Value::Dict(map) => Ok(map.contains_key(&hash_key(item)?)),
        other => Err(Fault::type_error(format!("argument of type '{}' is not iterable", other.type_name()))),
    }
}

pub fn hash_key(value: &Value) -> Result<Key, Fault> {
    Key::from_value(value).ok_or_else(|| Fault::type_error(format!("unhashable type: '{}'", value.type_name())))
}

/// Map a possibly negative index onto `0..len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { index.checked_add(len)? } else { index };
    if (0..len).contains(&i) { usize::try_from(i).ok() } else { None }
}

fn list_index(items: &[Value], index: &Value, what: &str) -> Result<usize, Fault> {
    let i = match index {
        Value::Int(_) | Value::Bool(_) => index.as_int().unwrap_or(0),
        other => {
            return Err(Fault::type_error(format!("{} indices must be integers, not {}", what, other.type_name())))
        }
    };
    normalize_index(i, items.len()).ok_or_else(|| Fault::index_error(format!("{} index out of range", what)))
}

/// Borrow `container[index]` for lists and dicts.
pub fn item_ref<'v>(container: &'v Value, index: &Value) -> Result<&'v Value, Fault> {
    match container {
        Value::List(items) => Ok(&items[list_index(items, index, "list")?]),
        Value::Dict(map) => map.get(&hash_key(index)?).ok_or_else(|| Fault::key_error(index.repr())),
        other => Err(not_subscriptable(other)),
    }
}

pub fn item_mut<'v>(container: &'v mut Value, index: &Value) -> Result<&'v mut Value, Fault> {
    match container {
        Value::List(items) => {
            let i = list_index(items, index, "list")?;
            Ok(&mut items[i])
        }
        Value::Dict(map) => map.get_mut(&hash_key(index)?).ok_or_else(|| Fault::key_error(index.repr())),
        other => Err(not_subscriptable(other)),
    }
}

/// `container[index]` as an owned value; strings yield one-character strings.
pub fn index_value(container: &Value, index: &Value) -> Result<Value, Fault> {
    match container {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = match index {
                Value::Int(_) | Value::Bool(_) => index.as_int().unwrap_or(0),
                other => {
                    return Err(Fault::type_error(format!("string indices must be integers, not {}", other.type_name())))
                }
            };
            normalize_index(i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| Fault::index_error("string index out of range"))
        }
        other => item_ref(other, index).cloned(),
    }
}

/// Size change caused by `container[index] = value`, validated without mutating.
pub fn setitem_delta(container: &Value, index: &Value, value: &Value) -> Result<isize, Fault> {
    let new = value.approx_size() as isize;
    match container {
        Value::List(items) => {
            let i = list_index(items, index, "list assignment")?;
            Ok(new - items[i].approx_size() as isize)
        }
        Value::Dict(map) => {
            let key = hash_key(index)?;
            Ok(match map.get(&key) {
                Some(old) => new - old.approx_size() as isize,
                None => new + key.approx_size() as isize,
            })
        }
        Value::Str(_) => Err(Fault::type_error("'str' object does not support item assignment")),
        other => Err(Fault::type_error(format!("'{}' object does not support item assignment", other.type_name()))),
    }
}

/// `container[index] = value`
pub fn set_item(container: &mut Value, index: Value, value: Value) -> Result<(), Fault> {
    match container {
        Value::List(items) => {
            let i = list_index(items, &index, "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(map) => {
            map.insert(hash_key(&index)?, value);
            Ok(())
        }
        other => Err(Fault::type_error(format!("'{}' object does not support item assignment", other.type_name()))),
    }
}

fn not_subscriptable(v: &Value) -> Fault {
    Fault::type_error(format!("'{}' object is not subscriptable", v.type_name()))
}

/// Materialize the items a `for` loop or a builtin walks over.
pub fn iterate(value: &Value) -> Result<Vec<Value>, Fault> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(map) => Ok(map.keys().map(Key::to_value).collect()),
        other => Err(Fault::type_error(format!("'{}' object is not iterable", other.type_name()))),
    }
}

/// Sort with `compare`, reporting the first incomparable pair.
pub fn sort_values(items: &mut [Value], reverse: bool) -> Result<(), Fault> {
    let mut error: Option<Fault> = None;
    items.sort_by(|a, b| match compare(BinOp::Lt, a, b) {
        Ok(ord) => ord.unwrap_or(Ordering::Equal),
        Err(e) => {
            error.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    if reverse {
        items.reverse();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultKind;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinOp::Add, int(2), int(3)).unwrap(), int(5));
        assert_eq!(binary(BinOp::Div, int(7), int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(BinOp::FloorDiv, int(-7), int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinOp::Mod, int(-7), int(3)).unwrap(), int(2));
        assert_eq!(binary(BinOp::Mod, int(7), int(-3)).unwrap(), int(-2));
        assert_eq!(binary(BinOp::Pow, int(2), int(10)).unwrap(), int(1024));
        assert_eq!(binary(BinOp::Pow, int(2), int(-1)).unwrap(), Value::Float(0.5));
        assert_eq!(binary(BinOp::Add, Value::Bool(true), int(1)).unwrap(), int(2));
    }

    #[test]
    fn test_faults() {
        assert_eq!(binary(BinOp::Div, int(1), int(0)).unwrap_err().kind, FaultKind::ZeroDivisionError);
        assert_eq!(binary(BinOp::Mod, int(1), int(0)).unwrap_err().kind, FaultKind::ZeroDivisionError);
        assert_eq!(binary(BinOp::Add, int(i64::MAX), int(1)).unwrap_err().kind, FaultKind::OverflowError);
        assert_eq!(binary(BinOp::Pow, int(10), int(100)).unwrap_err().kind, FaultKind::OverflowError);
        assert_eq!(binary(BinOp::Add, int(1), Value::from("a")).unwrap_err().kind, FaultKind::TypeError);
        assert_eq!(binary(BinOp::Lt, int(1), Value::from("a")).unwrap_err().kind, FaultKind::TypeError);
        assert_eq!(unary(UnaryOp::Neg, int(i64::MIN)).unwrap_err().kind, FaultKind::OverflowError);
    }

    #[test]
    fn test_sequences() {
        assert_eq!(binary(BinOp::Add, Value::from("ab"), Value::from("cd")).unwrap(), Value::from("abcd"));
        assert_eq!(binary(BinOp::Mul, Value::from("ab"), int(3)).unwrap(), Value::from("ababab"));
        assert_eq!(binary(BinOp::Mul, int(2), Value::from(vec![1i64])).unwrap(), Value::from(vec![1i64, 1]));
        assert_eq!(binary(BinOp::Mul, Value::from("x"), int(-1)).unwrap(), Value::from(""));
        assert_eq!(binary(BinOp::Mul, Value::from("ab"), int(i64::MAX)).unwrap_err().kind, FaultKind::MemoryError);
        assert_eq!(binary(BinOp::Mul, Value::from(vec![0i64]), int(1 << 62)).unwrap_err().kind, FaultKind::MemoryError);
    }

    #[test]
    fn test_equality_and_ordering() {
        assert!(equals(&int(1), &Value::Float(1.0)));
        assert!(equals(&Value::Bool(true), &int(1)));
        assert!(!equals(&int(1), &Value::from("1")));
        assert_eq!(binary(BinOp::Lt, Value::from(vec![1i64, 2]), Value::from(vec![1i64, 3])).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinOp::GtEq, Value::from("b"), Value::from("a")).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinOp::Lt, Value::Float(f64::NAN), int(1)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_membership_and_indexing() {
        let xs = Value::from(vec![1i64, 2, 3]);
        assert!(contains(&xs, &int(2)).unwrap());
        assert!(contains(&Value::from("hello"), &Value::from("ell")).unwrap());
        assert_eq!(index_value(&xs, &int(-1)).unwrap(), int(3));
        assert_eq!(index_value(&xs, &int(3)).unwrap_err().kind, FaultKind::IndexError);
        assert_eq!(index_value(&Value::from("abc"), &int(1)).unwrap(), Value::from("b"));
        assert_eq!(index_value(&int(1), &int(0)).unwrap_err().kind, FaultKind::TypeError);
    }

    #[test]
    fn test_sorting() {
        let mut items = vec![int(3), Value::Float(1.5), int(2)];
        sort_values(&mut items, false).unwrap();
        assert_eq!(items, vec![Value::Float(1.5), int(2), int(3)]);
        let mut mixed = vec![int(1), Value::from("a")];
        assert!(sort_values(&mut mixed, false).is_err());
    }
}
