//! Local placement: an in-process bounded pool, no network. Demonstrates
//! that the task lifecycle guarantees hold without a worker process.

use std::sync::Arc;

use taskfab_shared::execute::run_and_finalize;
use taskfab_shared::{FunctionRegistry, TaskFabResult, TaskRecord};
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, warn};

use crate::context::DispatcherContext;

pub struct LocalDispatcher {
    ctx: DispatcherContext,
    registry: Arc<FunctionRegistry>,
    pool: Arc<Semaphore>,
    rx: broadcast::Receiver<Vec<u8>>,
}

impl LocalDispatcher {
    /// Subscribes to the task-notification channel before returning, so a
    /// caller that awaits `new` and only then submits tasks can never race a
    /// publish ahead of this dispatcher's subscription (the underlying
    /// `broadcast` channel drops a message with no subscribers instead of
    /// queuing it).
    pub async fn new(
        ctx: DispatcherContext,
        registry: Arc<FunctionRegistry>,
        pool_size: usize,
    ) -> TaskFabResult<Self> {
        let rx = ctx.store.subscribe_tasks().await?;
        Ok(Self {
            ctx,
            registry,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            rx,
        })
    }

    /// Runs every task that arrives on an in-process pool slot, writing the
    /// terminal state back once the callable returns.
    pub async fn run(mut self) -> TaskFabResult<()> {
        loop {
            let bytes = match self.rx.recv().await {
                Ok(b) => b,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "local dispatcher lagged behind task channel");
                    continue;
                }
            };
            let task: TaskRecord = match serde_json::from_slice(&bytes) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "dropping malformed task notification");
                    continue;
                }
            };
            self.submit(task).await;
        }
    }

    async fn submit(&self, mut task: TaskRecord) {
        if let Err(e) = self.ctx.mark_running(&mut task).await {
            error!(error = %e, "failed to mark task running");
            return;
        }

        let permit = self.pool.clone().acquire_owned().await.expect("pool semaphore closed");
        let registry = self.registry.clone();
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let _permit = permit;
            run_and_finalize(&ctx.store, &registry, &mut task).await;
            if let Err(e) = ctx.on_result(&task).await {
                error!(error = %e, "failed to persist local task result");
            }
        });
    }
}
