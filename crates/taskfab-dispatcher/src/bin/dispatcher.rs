//! Thin wrapper binary for running a dispatcher process in one of the three
//! placement modes.
//!
//! ```bash
//! taskfab-dispatcher --mode push --port 7878
//! ```

use std::sync::Arc;

use clap::Parser;
use taskfab_dispatcher::{DispatcherContext, LocalDispatcher, PullDispatcher, PushDispatcher};
use taskfab_shared::config::{DispatcherArgs, DispatcherConfig, Mode};
use taskfab_shared::{examples, logging, InMemoryStore, TaskFabError, TaskFabResult, TaskStore};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    let args = DispatcherArgs::parse();
    let config = DispatcherConfig::load(&args)?;

    info!(mode = %config.mode, port = config.port, "starting taskfab dispatcher");

    let store = build_store(&config.store_url).await?;
    let ctx = DispatcherContext::new(store);

    let run_result = tokio::select! {
        result = run_dispatcher(ctx, &config) => result,
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    if let Err(e) = run_result {
        error!(error = %e, "dispatcher exited with error");
    }

    Ok(())
}

async fn run_dispatcher(
    ctx: DispatcherContext,
    config: &DispatcherConfig,
) -> taskfab_shared::TaskFabResult<()> {
    match config.mode {
        Mode::Local => {
            let registry = Arc::new(examples::demo_registry());
            LocalDispatcher::new(ctx, registry, config.workers).await?.run().await
        }
        Mode::Push => PushDispatcher::new(ctx, config.port).run().await,
        Mode::Pull => PullDispatcher::new(ctx, config.port).run().await,
    }
}

/// Builds the store backing this process: an in-process `InMemoryStore`
/// when no `store_url` is configured (only sees registrations made in this
/// same process), or a network-addressable `RedisStore` so a dispatcher and
/// its workers can share function records and task state across processes.
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

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
