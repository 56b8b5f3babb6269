//! Thin wrapper binary for running a worker process against a push or pull
//! dispatcher.
//!
//! ```bash
//! taskfab-worker --mode pull --dispatcher-port 7878 --pool-size 4
//! ```

use std::sync::Arc;

use clap::Parser;
use taskfab_shared::config::{Mode, WorkerArgs, WorkerConfig};
use taskfab_shared::{examples, logging, InMemoryStore, TaskFabError, TaskFabResult, TaskStore};
use taskfab_worker::WorkerRuntime;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    let args = WorkerArgs::parse();
    let config = WorkerConfig::load(&args)?;

    if matches!(config.mode, Mode::Local) {
        return Err("worker binary does not run in local mode; run the dispatcher with --mode local instead".into());
    }

    info!(
        mode = %config.mode,
        dispatcher = format!("{}:{}", config.dispatcher_host, config.dispatcher_port),
        pool_size = config.pool_size,
        "starting taskfab worker"
    );

    let store = build_store(&config.store_url).await?;
    let registry = Arc::new(examples::demo_registry());
    let runtime = WorkerRuntime::connect(
        &config.dispatcher_host,
        config.dispatcher_port,
        config.pool_size,
        registry,
        store,
    )
    .await?;

    info!(identity = %runtime.identity, "registered with dispatcher");

    let result = match config.mode {
        Mode::Push => runtime.run_push().await,
        Mode::Pull => runtime.run_pull().await,
        Mode::Local => unreachable!(),
    };

    if let Err(e) = &result {
        error!(error = %e, "worker exited with error");
    }

    Ok(result?)
}

/// Builds the store this worker resolves `FunctionRecord`s against: an
/// in-process `InMemoryStore` when no `store_url` is configured, or a
/// network-addressable `RedisStore` matching the dispatcher's. A worker
/// and its dispatcher must agree on `store_url`, since the worker only
/// sees function registrations visible through this same store.
async fn build_store(store_url: &Option<String>) -> TaskFabResult<Arc<TaskStore>> {
    match store_url {
        None => Ok(Arc::new(TaskStore::new(Arc::new(InMemoryStore::new())))),
        Some(url) => {
            #[cfg(feature = "redis-backend")]
            {
                let backend = taskfab_store::RedisStore::connect(url).await?;
                Ok(Arc::new(TaskStore::new(Arc::new(backend))))
            }
            #[cfg(not(feature = "redis-backend"))]
            {
                let _ = url;
                Err(TaskFabError::config(
                    "store_url is set but this binary was built without the redis-backend feature",
                ))
            }
        }
    }
}
