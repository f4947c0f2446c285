use crate::engine::Args;
use crate::fault::{Fault, FaultKind};
use crate::values::Value;

pub(super) const FUNCTIONS: &[&str] = &["sqrt", "floor", "ceil", "pow", "fabs"];

pub(super) fn constant(name: &str) -> Option<Value> {
    match name {
        "pi" => Some(Value::Float(std::f64::consts::PI)),
        "e" => Some(Value::Float(std::f64::consts::E)),
        _ => None,
    }
}

fn to_int(f: f64) -> Result<Value, Fault> {
    if f.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(Fault::new(FaultKind::OverflowError, "cannot convert float infinity to integer"));
    }
    Ok(Value::Int(f as i64))
}

pub(super) fn call(func: &str, args: Args) -> Result<Value, Fault> {
    match func {
        "sqrt" => {
            args.expect("sqrt", 1, 1)?;
            let x = args.float(0, "sqrt")?;
            if x < 0.0 {
                return Err(Fault::value_error("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "floor" | "ceil" => {
            args.expect(func, 1, 1)?;
            if let Some(Value::Int(n)) = args.get(0) {
                return Ok(Value::Int(*n));
            }
            let x = args.float(0, func)?;
            to_int(if func == "floor" { x.floor() } else { x.ceil() })
        }
        "pow" => {
            args.expect("pow", 2, 2)?;
            let (x, y) = (args.float(0, "pow")?, args.float(1, "pow")?);
            if x == 0.0 && y < 0.0 {
                return Err(Fault::value_error("math domain error"));
            }
            let out = x.powf(y);
            if out.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(Fault::new(FaultKind::OverflowError, "math range error"));
            }
            Ok(Value::Float(out))
        }
        "fabs" => {
            args.expect("fabs", 1, 1)?;
            Ok(Value::Float(args.float(0, "fabs")?.abs()))
        }
        other => Err(Fault::attribute_error("module", other)),
    }
}
