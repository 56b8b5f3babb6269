//! Shared execution step: resolve `task.function_id` to a `FunctionRecord`
//! via the store, invoke the registry key it carries, and finalize the task
//! record with the outcome. Used identically by the worker runtime and by
//! local-mode dispatch.

use crate::model::TaskRecord;
use crate::registry::{FunctionError, FunctionRegistry};
use crate::store::TaskStore;

/// Runs `task` against `registry` and mutates it into a terminal state.
/// Never panics on a missing function, an unresolvable `function_id`, or a
/// malformed payload: all surface as a `FAILED` task, matching the error
/// taxonomy's "user-callable failure" and "deserialization failure" classes.
pub async fn run_and_finalize(store: &TaskStore, registry: &FunctionRegistry, task: &mut TaskRecord) {
    let (args, kwargs) = match parse_payload(&task.payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            task.mark_failed(e.to_value());
            return;
        }
    };

    let record = match store.get_function(&task.function_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            task.mark_failed(
                FunctionError::new(
                    "unknown_function",
                    format!("no function registered under {}", task.function_id),
                )
                .to_value(),
            );
            return;
        }
        Err(e) => {
            task.mark_failed(FunctionError::new("store_error", e.to_string()).to_value());
            return;
        }
    };

    match registry.invoke(&record.payload, &args, &kwargs) {
        Some(Ok(value)) => task.mark_completed(value),
        Some(Err(e)) => task.mark_failed(e.to_value()),
        None => task.mark_failed(
            FunctionError::new("unknown_function", format!("no handler for {}", record.payload))
                .to_value(),
        ),
    }
}

fn parse_payload(
    payload: &serde_json::Value,
) -> Result<(Vec<serde_json::Value>, serde_json::Map<String, serde_json::Value>), FunctionError> {
    let args = payload
        .get("args")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let kwargs = payload
        .get("kwargs")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    Ok((args, kwargs))
}
