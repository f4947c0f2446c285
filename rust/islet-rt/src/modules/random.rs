use crate::engine::ops;
use crate::engine::Args;
use crate::fault::Fault;
use crate::values::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(super) const FUNCTIONS: &[&str] = &["seed", "randint", "random", "choice"];

pub(super) fn generator(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub(super) fn call(rng: &mut StdRng, func: &str, args: Args) -> Result<Value, Fault> {
    match func {
        "seed" => {
            args.expect("seed", 0, 1)?;
            *rng = match args.get(0) {
                None | Some(Value::None) => generator(None),
                Some(_) => generator(Some(args.int(0, "seed")? as u64)),
            };
            Ok(Value::None)
        }
        "randint" => {
            args.expect("randint", 2, 2)?;
            let (a, b) = (args.int(0, "randint")?, args.int(1, "randint")?);
            if a > b {
                return Err(Fault::value_error(format!("empty range for randint({}, {})", a, b)));
            }
            Ok(Value::Int(rng.gen_range(a..=b)))
        }
        "random" => {
            args.expect("random", 0, 0)?;
            Ok(Value::Float(rng.gen::<f64>()))
        }
        "choice" => {
            args.expect("choice", 1, 1)?;
            let items = ops::iterate(&args.positional[0])?;
            if items.is_empty() {
                return Err(Fault::index_error("Cannot choose from an empty sequence"));
            }
            let i = rng.gen_range(0..items.len());
            Ok(items.into_iter().nth(i).unwrap_or(Value::None))
        }
        other => Err(Fault::attribute_error("module", other)),
    }
}
