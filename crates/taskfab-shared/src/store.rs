//! Store adapter interface (put/get/publish/subscribe) and the in-memory
//! reference implementation used by local mode and the test harness.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::TaskFabResult;
use crate::model::{FunctionRecord, TaskRecord};

/// Abstract key/value + pub/sub contract the dispatcher and producers rely
/// on. No transactions are required: every task's writes are serialized by
/// `task_id` upstream of this trait, so last-writer-wins is sufficient.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> TaskFabResult<()>;
    async fn get(&self, key: &str) -> TaskFabResult<Option<Vec<u8>>>;
    async fn publish(&self, channel: &str, message: Vec<u8>) -> TaskFabResult<()>;
    /// Returns a receiver that yields every message published after this
    /// call; subscriptions made after a publish do not see it (fan-out,
    /// not a durable log).
    async fn subscribe(&self, channel: &str) -> TaskFabResult<broadcast::Receiver<Vec<u8>>>;
}

/// Typed facade over `Store`, handling the serialization of function and
/// task records and the task-notification channel by name.
pub struct TaskStore {
    backend: std::sync::Arc<dyn Store>,
}

pub const TASK_CHANNEL: &str = "tasks";

impl TaskStore {
    pub fn new(backend: std::sync::Arc<dyn Store>) -> Self {
        Self { backend }
    }

    pub async fn put_function(&self, record: &FunctionRecord) -> TaskFabResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.backend.put(&record.function_id, bytes).await
    }

    pub async fn get_function(&self, function_id: &str) -> TaskFabResult<Option<FunctionRecord>> {
        match self.backend.get(function_id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_task(&self, record: &TaskRecord) -> TaskFabResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.backend.put(&record.task_id, bytes).await
    }

    pub async fn get_task(&self, task_id: &str) -> TaskFabResult<Option<TaskRecord>> {
        match self.backend.get(task_id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn submit_task(&self, record: &TaskRecord) -> TaskFabResult<()> {
        self.put_task(record).await?;
        let bytes = serde_json::to_vec(record)?;
        self.backend.publish(TASK_CHANNEL, bytes).await
    }

    pub async fn subscribe_tasks(&self) -> TaskFabResult<broadcast::Receiver<Vec<u8>>> {
        self.backend.subscribe(TASK_CHANNEL).await
    }
}

/// `DashMap`-backed store with a `broadcast` channel standing in for
/// pub/sub. Backs `local` mode and every test that does not need a real
/// network-addressable backend.
#[derive(Default)]
pub struct InMemoryStore {
    kv: DashMap<String, Vec<u8>>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> TaskFabResult<()> {
        self.kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> TaskFabResult<Option<Vec<u8>>> {
        Ok(self.kv.get(key).map(|v| v.clone()))
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> TaskFabResult<()> {
        // No subscribers is not an error: fire-and-forget semantics.
        let _ = self.channel(channel).send(message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> TaskFabResult<broadcast::Receiver<Vec<u8>>> {
        Ok(self.channel(channel).subscribe())
    }
}
