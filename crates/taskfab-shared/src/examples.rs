//! A small set of demonstration functions registered by both the worker
//! binary and local-mode dispatch, used to exercise the fabric end to end:
//! `double`, `noop`, `bruteforce`, and an always-failing `unimplemented`.

use std::sync::Arc;

use serde_json::Value;

use crate::registry::{FunctionError, FunctionRegistry};

pub fn demo_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();

    registry.register(
        "double",
        Arc::new(|args, _kwargs| {
            let x = args
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| FunctionError::new("type_error", "double expects one integer arg"))?;
            Ok(Value::from(x * 2))
        }),
    );

    registry.register("noop", Arc::new(|_args, _kwargs| Ok(Value::Null)));

    registry.register(
        "unimplemented",
        Arc::new(|_args, _kwargs| {
            Err(FunctionError::new(
                "not implemented",
                "this function is not implemented",
            ))
        }),
    );

    registry.register("bruteforce", Arc::new(bruteforce_handler));

    registry
}

/// Finds the integer in `[lo, hi)` whose value matches `target`, simulating
/// a brute-force search partition. Returns `null` when the answer is not in
/// this worker's assigned range.
fn bruteforce_handler(
    args: &[Value],
    _kwargs: &serde_json::Map<String, Value>,
) -> Result<Value, FunctionError> {
    let target = args
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| FunctionError::new("type_error", "bruteforce expects (target, lo, hi)"))?;
    let lo = args
        .get(1)
        .and_then(Value::as_i64)
        .ok_or_else(|| FunctionError::new("type_error", "bruteforce expects (target, lo, hi)"))?;
    let hi = args
        .get(2)
        .and_then(Value::as_i64)
        .ok_or_else(|| FunctionError::new("type_error", "bruteforce expects (target, lo, hi)"))?;

    for candidate in lo..hi {
        if candidate == target {
            return Ok(Value::from(candidate));
        }
    }
    Ok(Value::Null)
}
