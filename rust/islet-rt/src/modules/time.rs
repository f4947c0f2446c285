use crate::engine::{Args, Unwind};
use crate::fault::{Fault, FaultKind};
use crate::services::interrupt::Interrupt;
use crate::values::Value;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub(super) const FUNCTIONS: &[&str] = &["time", "monotonic", "sleep"];

static START: Lazy<Instant> = Lazy::new(Instant::now);

pub(super) fn call(func: &str, args: Args, interrupt: &Interrupt) -> Result<Value, Unwind> {
    match func {
        "time" => {
            args.expect("time", 0, 0).map_err(qualified)?;
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            Ok(Value::Float(now.as_secs_f64()))
        }
        "monotonic" => {
            args.expect("monotonic", 0, 0).map_err(qualified)?;
            Ok(Value::Float(START.elapsed().as_secs_f64()))
        }
        "sleep" => {
            args.expect("sleep", 1, 1).map_err(qualified)?;
            let secs = args.float(0, "sleep").map_err(qualified)?;
            if secs.is_nan() || secs < 0.0 {
                return Err(Fault::value_error("sleep length must be non-negative").into());
            }
            let duration = Duration::try_from_secs_f64(secs)
                .map_err(|_| Unwind::from(Fault::new(FaultKind::OverflowError, "sleep length is too large")))?;
            interrupt.sleep(duration)?;
            Ok(Value::None)
        }
        other => Err(Fault::attribute_error("module", other).into()),
    }
}

fn qualified(fault: Fault) -> Unwind {
    Unwind::Fault(super::qualify("time", fault))
}
