//! Tracing bootstrap shared by every binary in the fabric.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initializes the global tracing subscriber from `RUST_LOG`, defaulting to
/// `info` when unset. Safe to call once per process; a second call is a
/// no-op other than a logged warning.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber already initialized");
    }
}
