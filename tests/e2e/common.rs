//! Shared scaffolding for the end-to-end scenarios: spins up an in-process
//! dispatcher (push or pull) over a loopback TCP port backed by the
//! in-memory store, plus however many workers a scenario needs.

use std::sync::Arc;
use std::time::Duration;

use taskfab_dispatcher::{DispatcherContext, PullDispatcher, PushDispatcher};
use taskfab_shared::{FunctionRecord, FunctionRegistry, InMemoryStore, TaskRecord, TaskStatus, TaskStore};
use taskfab_worker::WorkerRuntime;
use tokio::net::TcpListener;

pub struct Harness {
    pub store: Arc<TaskStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(TaskStore::new(Arc::new(InMemoryStore::new()))),
        }
    }

    fn ctx(&self) -> DispatcherContext {
        DispatcherContext::new(self.store.clone())
    }

    /// Binds a push dispatcher on an ephemeral port and runs it in the
    /// background; returns the port workers should connect to.
    pub async fn spawn_push_dispatcher(&self) -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dispatcher = PushDispatcher::new(self.ctx(), port);
        tokio::spawn(async move {
            let _ = dispatcher.run_on(listener).await;
        });
        port
    }

    pub async fn spawn_pull_dispatcher(&self) -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dispatcher = PullDispatcher::new(self.ctx(), port);
        tokio::spawn(async move {
            let _ = dispatcher.run_on(listener).await;
        });
        port
    }

    pub async fn spawn_worker_push(&self, port: u16, pool_size: usize, registry: FunctionRegistry) {
        let runtime = WorkerRuntime::connect(
            "127.0.0.1",
            port,
            pool_size,
            Arc::new(registry),
            self.store.clone(),
        )
        .await
        .unwrap();
        tokio::spawn(async move {
            let _ = runtime.run_push().await;
        });
    }

    pub async fn spawn_worker_pull(&self, port: u16, pool_size: usize, registry: FunctionRegistry) {
        let runtime = WorkerRuntime::connect(
            "127.0.0.1",
            port,
            pool_size,
            Arc::new(registry),
            self.store.clone(),
        )
        .await
        .unwrap();
        tokio::spawn(async move {
            let _ = runtime.run_pull().await;
        });
    }

    /// Submits a task against the function registered under `name`,
    /// registering a `FunctionRecord` for it on first use so the call
    /// exercises the same `function_id -> FunctionRecord -> registry key`
    /// indirection a real caller goes through, not a direct registry lookup.
    pub async fn submit(&self, name: &str, payload: serde_json::Value) -> TaskRecord {
        if self.store.get_function(name).await.unwrap().is_none() {
            let record = FunctionRecord {
                function_id: name.to_string(),
                name: name.to_string(),
                payload: name.to_string(),
            };
            self.store.put_function(&record).await.unwrap();
        }
        let task = TaskRecord::new(name, payload);
        self.store.submit_task(&task).await.unwrap();
        task
    }
}

/// Polls the store until `task_id` reaches a terminal state or `timeout`
/// elapses.
pub async fn wait_for_terminal(store: &TaskStore, task_id: &str, timeout: Duration) -> TaskRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(task) = store.get_task(task_id).await.unwrap() {
            if task.status.is_terminal() {
                return task;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("task {task_id} did not reach a terminal state within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_all_terminal(
    store: &TaskStore,
    task_ids: &[String],
    timeout: Duration,
) -> Vec<TaskRecord> {
    let mut results = Vec::with_capacity(task_ids.len());
    for id in task_ids {
        results.push(wait_for_terminal(store, id, timeout).await);
    }
    results
}

#[allow(dead_code)]
pub fn assert_status(task: &TaskRecord, expected: TaskStatus) {
    assert_eq!(task.status, expected);
}
