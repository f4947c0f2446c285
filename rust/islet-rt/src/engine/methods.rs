//! Methods on built-in types (`s.upper()`, `xs.append(x)`, `d.get(k)`).
//!
//! Mutating methods are split in two steps so the engine can account for
//! the size change against the namespace limit before anything is written:
//! [`mutation_delta`] validates the call and projects the delta, then
//! [`call_mutating`] applies it.

use super::ops::{self, equals, hash_key, normalize_index};
use super::Args;
use crate::fault::Fault;
use crate::values::{Key, Value};
use indexmap::IndexMap;

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith", "endswith", "find",
    "count", "isdigit",
];
const LIST_PURE: &[&str] = &["index", "count", "copy"];
const LIST_MUTATING: &[&str] = &["append", "extend", "insert", "pop", "remove", "clear", "sort", "reverse"];
const DICT_PURE: &[&str] = &["get", "keys", "values", "items", "copy"];
const DICT_MUTATING: &[&str] = &["pop", "update", "setdefault", "clear"];

/// Does `receiver` have a method called `name`?
pub fn has_method(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::List(_) => LIST_PURE.contains(&name) || LIST_MUTATING.contains(&name),
        Value::Dict(_) => DICT_PURE.contains(&name) || DICT_MUTATING.contains(&name),
        _ => false,
    }
}

pub fn is_mutating(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::List(_) => LIST_MUTATING.contains(&name),
        Value::Dict(_) => DICT_MUTATING.contains(&name),
        _ => false,
    }
}

fn no_attribute(receiver: &Value, name: &str) -> Fault {
    Fault::attribute_error(receiver.type_name(), name)
}

/// Call a method that only reads its receiver.
pub fn call_pure(receiver: &Value, name: &str, args: Args) -> Result<Value, Fault> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) => list_pure(items, name, args),
        Value::Dict(map) => dict_pure(map, name, args),
        other => Err(no_attribute(other, name)),
    }
}

fn str_method(s: &str, name: &str, args: Args) -> Result<Value, Fault> {
    match name {
        "upper" => {
            args.expect("upper", 0, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            args.expect("lower", 0, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.expect(name, 0, 1)?;
            let chars: Option<Vec<char>> = match args.get(0) {
                None | Some(Value::None) => None,
                Some(_) => Some(args.str(0, name)?.chars().collect()),
            };
            let is_strip = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(is_strip),
                "lstrip" => s.trim_start_matches(is_strip),
                _ => s.trim_end_matches(is_strip),
            };
            Ok(Value::Str(out.to_string()))
        }
        "split" => split(s, args),
        "join" => {
            args.expect("join", 1, 1)?;
            let items = ops::iterate(&args.positional[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.as_str()),
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Str(parts.join(s)))
        }
        "replace" => {
            args.expect("replace", 2, 3)?;
            let from = args.str(0, "replace")?;
            let to = args.str(1, "replace")?;
            let out = match args.get(2) {
                Some(_) => {
                    let n = args.int(2, "replace")?;
                    if n < 0 { s.replace(from, to) } else { s.replacen(from, to, n as usize) }
                }
                None => s.replace(from, to),
            };
            Ok(Value::Str(out))
        }
        "startswith" => {
            args.expect("startswith", 1, 1)?;
            Ok(Value::Bool(s.starts_with(args.str(0, "startswith")?)))
        }
        "endswith" => {
            args.expect("endswith", 1, 1)?;
            Ok(Value::Bool(s.ends_with(args.str(0, "endswith")?)))
        }
        "find" => {
            args.expect("find", 1, 1)?;
            let needle = args.str(0, "find")?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "count" => {
            args.expect("count", 1, 1)?;
            let needle = args.str(0, "count")?;
            let n = if needle.is_empty() { s.chars().count() + 1 } else { s.matches(needle).count() };
            Ok(Value::Int(n as i64))
        }
        "isdigit" => {
            args.expect("isdigit", 0, 0)?;
            Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
        }
        _ => Err(Fault::attribute_error("str", name)),
    }
}

fn split(s: &str, mut args: Args) -> Result<Value, Fault> {
    let maxsplit = args.take_keyword("maxsplit");
    let sep = args.take_keyword("sep");
    args.expect("split", 0, 2)?;
    let sep = match sep.or_else(|| args.get(0).cloned()) {
        None | Some(Value::None) => None,
        Some(Value::Str(sep)) if sep.is_empty() => return Err(Fault::value_error("empty separator")),
        Some(Value::Str(sep)) => Some(sep),
        Some(other) => {
            return Err(Fault::type_error(format!("must be str or None, not {}", other.type_name())))
        }
    };
    let maxsplit = match maxsplit.or_else(|| args.get(1).cloned()) {
        Some(v) => v.as_int().ok_or_else(|| Fault::type_error("maxsplit must be an integer"))?,
        None => -1,
    };
    let parts: Vec<Value> = match (sep, maxsplit) {
        (Some(sep), n) if n >= 0 => s.splitn(n as usize + 1, sep.as_str()).map(Value::from).collect(),
        (Some(sep), _) => s.split(sep.as_str()).map(Value::from).collect(),
        (None, n) if n >= 0 => {
            let mut out = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if out.len() as i64 == n {
                    out.push(Value::from(rest));
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                out.push(Value::from(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            out
        }
        (None, _) => s.split_whitespace().map(Value::from).collect(),
    };
    Ok(Value::List(parts))
}

fn list_pure(items: &[Value], name: &str, args: Args) -> Result<Value, Fault> {
    match name {
        "index" => {
            args.expect("index", 1, 1)?;
            let needle = &args.positional[0];
            items
                .iter()
                .position(|v| equals(v, needle))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Fault::value_error(format!("{} is not in list", needle.repr())))
        }
        "count" => {
            args.expect("count", 1, 1)?;
            Ok(Value::Int(items.iter().filter(|v| equals(v, &args.positional[0])).count() as i64))
        }
        "copy" => {
            args.expect("copy", 0, 0)?;
            Ok(Value::List(items.to_vec()))
        }
        _ => Err(Fault::attribute_error("list", name)),
    }
}

fn dict_pure(map: &IndexMap<Key, Value>, name: &str, args: Args) -> Result<Value, Fault> {
    match name {
        "get" => {
            args.expect("get", 1, 2)?;
            let key = hash_key(&args.positional[0])?;
            Ok(map.get(&key).cloned().unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.expect("keys", 0, 0)?;
            Ok(Value::List(map.keys().map(Key::to_value).collect()))
        }
        "values" => {
            args.expect("values", 0, 0)?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        "items" => {
            args.expect("items", 0, 0)?;
            Ok(Value::List(map.iter().map(|(k, v)| Value::List(vec![k.to_value(), v.clone()])).collect()))
        }
        "copy" => {
            args.expect("copy", 0, 0)?;
            Ok(Value::Dict(map.clone()))
        }
        _ => Err(Fault::attribute_error("dict", name)),
    }
}

fn size(v: &Value) -> isize {
    v.approx_size() as isize
}

/// Validate a mutating call and project the receiver's size change in bytes.
pub fn mutation_delta(receiver: &Value, name: &str, args: &Args) -> Result<isize, Fault> {
    match receiver {
        Value::List(items) => match name {
            "append" => {
                args.expect("append", 1, 1)?;
                Ok(size(&args.positional[0]))
            }
            "extend" => {
                args.expect("extend", 1, 1)?;
                Ok(ops::iterate(&args.positional[0])?.iter().map(size).sum())
            }
            "insert" => {
                args.expect("insert", 2, 2)?;
                args.int(0, "insert")?;
                Ok(size(&args.positional[1]))
            }
            "pop" => {
                args.expect("pop", 0, 1)?;
                if items.is_empty() {
                    return Err(Fault::index_error("pop from empty list"));
                }
                let i = match args.get(0) {
                    Some(_) => args.int(0, "pop")?,
                    None => -1,
                };
                let i = normalize_index(i, items.len()).ok_or_else(|| Fault::index_error("pop index out of range"))?;
                Ok(-size(&items[i]))
            }
            "remove" => {
                args.expect("remove", 1, 1)?;
                let needle = &args.positional[0];
                items
                    .iter()
                    .find(|v| equals(v, needle))
                    .map(|v| -size(v))
                    .ok_or_else(|| Fault::value_error("list.remove(x): x not in list"))
            }
            "clear" => {
                args.expect("clear", 0, 0)?;
                Ok(-items.iter().map(size).sum::<isize>())
            }
            "sort" | "reverse" => Ok(0),
            _ => Err(no_attribute(receiver, name)),
        },
        Value::Dict(map) => match name {
            "pop" => {
                args.expect("pop", 1, 2)?;
                let key = hash_key(&args.positional[0])?;
                match map.get(&key) {
                    Some(v) => Ok(-(size(v) + key.approx_size() as isize)),
                    None if args.len() == 2 => Ok(0),
                    None => Err(Fault::key_error(args.positional[0].repr())),
                }
            }
            "update" => {
                args.expect("update", 1, 1)?;
                match &args.positional[0] {
                    Value::Dict(other) => Ok(other
                        .iter()
                        .map(|(k, v)| match map.get(k) {
                            Some(old) => size(v) - size(old),
                            None => size(v) + k.approx_size() as isize,
                        })
                        .sum()),
                    other => Err(Fault::type_error(format!("'{}' object is not a mapping", other.type_name()))),
                }
            }
            "setdefault" => {
                args.expect("setdefault", 1, 2)?;
                let key = hash_key(&args.positional[0])?;
                if map.contains_key(&key) {
                    Ok(0)
                } else {
                    Ok(args.get(1).map(size).unwrap_or_else(|| size(&Value::None)) + key.approx_size() as isize)
                }
            }
            "clear" => {
                args.expect("clear", 0, 0)?;
                Ok(-map.iter().map(|(k, v)| size(v) + k.approx_size() as isize).sum::<isize>())
            }
            _ => Err(no_attribute(receiver, name)),
        },
        other => Err(no_attribute(other, name)),
    }
}

/// Apply a mutating method. Call [`mutation_delta`] first.
pub fn call_mutating(receiver: &mut Value, name: &str, mut args: Args) -> Result<Value, Fault> {
    match receiver {
        Value::List(items) => match name {
            "append" => {
                args.expect("append", 1, 1)?;
                items.extend(args.positional.drain(..));
                Ok(Value::None)
            }
            "extend" => {
                args.expect("extend", 1, 1)?;
                items.extend(ops::iterate(&args.positional[0])?);
                Ok(Value::None)
            }
            "insert" => {
                args.expect("insert", 2, 2)?;
                let i = args.int(0, "insert")?;
                let len = items.len() as i64;
                let at = if i < 0 { (i + len).max(0) } else { i.min(len) } as usize;
                let value = args.positional.swap_remove(1);
                items.insert(at, value);
                Ok(Value::None)
            }
            "pop" => {
                args.expect("pop", 0, 1)?;
                if items.is_empty() {
                    return Err(Fault::index_error("pop from empty list"));
                }
                let i = match args.get(0) {
                    Some(_) => args.int(0, "pop")?,
                    None => -1,
                };
                let i = normalize_index(i, items.len()).ok_or_else(|| Fault::index_error("pop index out of range"))?;
                Ok(items.remove(i))
            }
            "remove" => {
                args.expect("remove", 1, 1)?;
                let pos = items
                    .iter()
                    .position(|v| equals(v, &args.positional[0]))
                    .ok_or_else(|| Fault::value_error("list.remove(x): x not in list"))?;
                items.remove(pos);
                Ok(Value::None)
            }
            "clear" => {
                args.expect("clear", 0, 0)?;
                items.clear();
                Ok(Value::None)
            }
            "sort" => {
                let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
                args.expect("sort", 0, 0)?;
                ops::sort_values(items, reverse)?;
                Ok(Value::None)
            }
            "reverse" => {
                args.expect("reverse", 0, 0)?;
                items.reverse();
                Ok(Value::None)
            }
            _ => Err(Fault::attribute_error("list", name)),
        },
        Value::Dict(map) => match name {
            "pop" => {
                args.expect("pop", 1, 2)?;
                let key = hash_key(&args.positional[0])?;
                match map.shift_remove(&key) {
                    Some(v) => Ok(v),
                    None if args.len() == 2 => Ok(args.positional.swap_remove(1)),
                    None => Err(Fault::key_error(args.positional[0].repr())),
                }
            }
            "update" => {
                args.expect("update", 1, 1)?;
                match args.positional.swap_remove(0) {
                    Value::Dict(other) => {
                        map.extend(other);
                        Ok(Value::None)
                    }
                    other => Err(Fault::type_error(format!("'{}' object is not a mapping", other.type_name()))),
                }
            }
            "setdefault" => {
                args.expect("setdefault", 1, 2)?;
                let key = hash_key(&args.positional[0])?;
                let default = args.positional.get(1).cloned().unwrap_or(Value::None);
                Ok(map.entry(key).or_insert(default).clone())
            }
            "clear" => {
                args.expect("clear", 0, 0)?;
                map.clear();
                Ok(Value::None)
            }
            _ => Err(Fault::attribute_error("dict", name)),
        },
        other => Err(no_attribute(other, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultKind;

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call_pure(&s("Hi"), "upper", Args::default()).unwrap(), s("HI"));
        assert_eq!(call_pure(&s("  x "), "strip", Args::default()).unwrap(), s("x"));
        assert_eq!(call_pure(&s("xxaxx"), "lstrip", Args::new(vec![s("x")])).unwrap(), s("axx"));
        assert_eq!(call_pure(&s("a b  c"), "split", Args::default()).unwrap(), Value::from(vec!["a", "b", "c"]));
        assert_eq!(call_pure(&s("a,b,c"), "split", Args::new(vec![s(","), Value::Int(1)])).unwrap(), Value::from(vec!["a", "b,c"]));
        assert_eq!(call_pure(&s("-"), "join", Args::new(vec![Value::from(vec!["a", "b"])])).unwrap(), s("a-b"));
        assert_eq!(call_pure(&s("héllo"), "find", Args::new(vec![s("l")])).unwrap(), Value::Int(2));
        assert_eq!(call_pure(&s("aaa"), "replace", Args::new(vec![s("a"), s("b"), Value::Int(2)])).unwrap(), s("bba"));
        assert_eq!(call_pure(&s("123"), "isdigit", Args::default()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_unknown_method() {
        let err = call_pure(&s("x"), "nope", Args::default()).unwrap_err();
        assert_eq!(err.kind, FaultKind::AttributeError);
        assert_eq!(err.message, "'str' object has no attribute 'nope'");
        assert!(!has_method(&Value::Int(1), "upper"));
    }

    #[test]
    fn test_list_mutation_with_delta() {
        let mut xs = Value::from(vec![3i64, 1, 2]);
        let args = Args::new(vec![s("abc")]);
        let delta = mutation_delta(&xs, "append", &args).unwrap();
        assert_eq!(delta, s("abc").approx_size() as isize);
        call_mutating(&mut xs, "append", args).unwrap();
        assert_eq!(xs.as_list().unwrap().len(), 4);
        let popped = call_mutating(&mut xs, "pop", Args::default()).unwrap();
        assert_eq!(popped, s("abc"));
        call_mutating(&mut xs, "sort", Args::default()).unwrap();
        assert_eq!(xs, Value::from(vec![1i64, 2, 3]));
        let err = mutation_delta(&Value::List(vec![]), "pop", &Args::default()).unwrap_err();
        assert_eq!(err.kind, FaultKind::IndexError);
    }

    #[test]
    fn test_dict_methods() {
        let mut d = Value::Dict(IndexMap::new());
        call_mutating(&mut d, "setdefault", Args::new(vec![s("a"), Value::Int(1)])).unwrap();
        assert_eq!(call_pure(&d, "get", Args::new(vec![s("a")])).unwrap(), Value::Int(1));
        assert_eq!(call_pure(&d, "get", Args::new(vec![s("b"), Value::Int(0)])).unwrap(), Value::Int(0));
        assert_eq!(call_pure(&d, "items", Args::default()).unwrap().repr(), "[['a', 1]]");
        assert_eq!(call_mutating(&mut d, "pop", Args::new(vec![s("a")])).unwrap(), Value::Int(1));
        let err = mutation_delta(&d, "pop", &Args::new(vec![s("a")])).unwrap_err();
        assert_eq!(err.kind, FaultKind::KeyError);
    }
}
