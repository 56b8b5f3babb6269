//! Fixed, build-time registry of named functions.
//!
//! The source system ships executable artifacts as opaque serialized
//! callables. A statically compiled worker cannot run arbitrary shipped
//! code without a sandbox, so a `FunctionRecord.payload` is instead the key
//! of a handler registered here; the registry is built once at worker
//! startup from a fixed list of handlers compiled into the binary.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// The outcome of invoking a registered handler: `Err` corresponds to a
/// user-callable failure, carried back to the caller as the task's failure
/// payload rather than as a Rust panic.
pub type HandlerResult = Result<Value, FunctionError>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FunctionError {
    pub kind: String,
    pub message: String,
}

impl FunctionError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "kind": self.kind, "message": self.message })
    }
}

pub type Handler = Arc<dyn Fn(&[Value], &serde_json::Map<String, Value>) -> HandlerResult + Send + Sync>;

/// A worker's catalogue of callable functions, keyed by the name clients
/// registered the function under.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    handlers: DashMap<String, Handler>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("registered", &self.handlers.len())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Looks up and invokes `name` with `(args, kwargs)`. `None` means the
    /// key is not registered: callers treat this as a deserialization
    /// failure, not a panic.
    pub fn invoke(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &serde_json::Map<String, Value>,
    ) -> Option<HandlerResult> {
        self.handlers.get(name).map(|h| h(args, kwargs))
    }
}
