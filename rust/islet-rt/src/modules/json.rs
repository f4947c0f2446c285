use crate::engine::Args;
use crate::fault::Fault;
use crate::values::{format_float, Key, Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io;

pub(super) const FUNCTIONS: &[&str] = &["dumps", "loads"];

/// Compact output with `, ` and `: ` separators.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn key_text(key: &Key) -> String {
    match key {
        Key::Str(s) => s.clone(),
        Key::Int(n) => n.to_string(),
        Key::Bool(true) => "true".into(),
        Key::Bool(false) => "false".into(),
        Key::None => "null".into(),
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, Fault> {
    Ok(match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Fault::value_error(format!("Out of range float values are not JSON compliant: {}", format_float(*f))))?,
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Dict(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(key_text(k), to_json(v)?);
            }
            serde_json::Value::Object(out)
        }
        other => {
            return Err(Fault::type_error(format!("Object of type {} is not JSON serializable", other.type_name())))
        }
    })
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let out: IndexMap<Key, Value> = map.into_iter().map(|(k, v)| (Key::Str(k), from_json(v))).collect();
            Value::Dict(out)
        }
    }
}

fn write<F: Formatter>(json: &serde_json::Value, formatter: F) -> Result<String, Fault> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut ser).map_err(|e| Fault::value_error(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| Fault::value_error(e.to_string()))
}

pub(super) fn call(func: &str, mut args: Args) -> Result<Value, Fault> {
    match func {
        "dumps" => {
            let indent = args.take_keyword("indent");
            args.expect("dumps", 1, 1)?;
            let json = to_json(&args.positional[0])?;
            let text = match indent {
                None | Some(Value::None) => write(&json, SpacedFormatter)?,
                Some(Value::Int(n)) => {
                    let pad = " ".repeat(n.clamp(0, 64) as usize);
                    write(&json, PrettyFormatter::with_indent(pad.as_bytes()))?
                }
                Some(Value::Str(pad)) => write(&json, PrettyFormatter::with_indent(pad.as_bytes()))?,
                Some(other) => {
                    return Err(Fault::type_error(format!("indent must be int or str, not {}", other.type_name())))
                }
            };
            Ok(Value::Str(text))
        }
        "loads" => {
            args.expect("loads", 1, 1)?;
            let text = args.str(0, "loads")?;
            let json: serde_json::Value = serde_json::from_str(text).map_err(|e| Fault::value_error(e.to_string()))?;
            Ok(from_json(json))
        }
        other => Err(Fault::attribute_error("module", other)),
    }
}
