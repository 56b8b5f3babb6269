//! State and helpers shared by every placement policy: store access and the
//! common task-transition operations (`submit`/`on_result` in the spec's
//! vocabulary).

use std::sync::Arc;

use taskfab_shared::{TaskFabResult, TaskRecord, TaskStore};
use tracing::info;

#[derive(Clone)]
pub struct DispatcherContext {
    pub store: Arc<TaskStore>,
}

impl DispatcherContext {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Transitions `task` to `RUNNING` and flushes it to the store. Must
    /// complete before the task is handed to a worker on the wire.
    pub async fn mark_running(&self, task: &mut TaskRecord) -> TaskFabResult<()> {
        task.mark_running();
        self.store.put_task(task).await?;
        info!(task_id = %task.task_id, "task running");
        Ok(())
    }

    /// Applies a terminal result received from a worker.
    pub async fn on_result(&self, task: &TaskRecord) -> TaskFabResult<()> {
        self.store.put_task(task).await?;
        info!(task_id = %task.task_id, status = ?task.status, "task terminal");
        Ok(())
    }
}
