//! Push placement: the dispatcher holds one connection per registered
//! worker and picks the least-loaded one for every new task.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use taskfab_shared::wire::{framed, recv_message, send_message};
use taskfab_shared::{Message, TaskFabError, TaskFabResult, TaskRecord};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{error, info, warn};

use crate::context::DispatcherContext;

/// `outstanding_count` per worker, guarded by a single mutex so that
/// selection (argmin) and the subsequent increment happen atomically with
/// respect to concurrent `RESULT_READY` decrements.
type OutstandingTable = Mutex<HashMap<String, usize>>;

#[derive(Clone)]
pub struct PushDispatcher {
    ctx: DispatcherContext,
    port: u16,
    outstanding: Arc<OutstandingTable>,
    connections: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
    worker_joined: Arc<Notify>,
}

impl PushDispatcher {
    pub fn new(ctx: DispatcherContext, port: u16) -> Self {
        Self {
            ctx,
            port,
            outstanding: Arc::new(Mutex::new(HashMap::new())),
            connections: Arc::new(DashMap::new()),
            worker_joined: Arc::new(Notify::new()),
        }
    }

    pub async fn run(self) -> TaskFabResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| TaskFabError::transport(e.to_string()))?;
        self.run_on(listener).await
    }

    /// Runs against an already-bound listener; used by tests that need an
    /// OS-assigned ephemeral port.
    pub async fn run_on(self, listener: TcpListener) -> TaskFabResult<()> {
        info!(port = self.port, "push dispatcher listening");

        let accept_ctx = self.clone();
        tokio::spawn(async move { accept_ctx.accept_loop(listener).await });

        self.intake_loop().await
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let handles = self.clone();
                    tokio::spawn(async move { handles.handle_connection(stream, addr).await });
                }
                Err(e) => {
                    error!(error = %e, "push dispatcher accept failed");
                }
            }
        }
    }

    async fn handle_connection(self, stream: TcpStream, addr: std::net::SocketAddr) {
        let framed_conn = framed(stream);
        let (mut sink, mut stream) = framed_conn.split();

        let worker_id = match recv_message(&mut stream).await {
            Ok(Some(Message::Registration { sender })) => sender,
            Ok(Some(other)) => {
                warn!(?addr, sender = other.sender(), "expected REGISTRATION first, got other message");
                return;
            }
            Ok(None) => return,
            Err(e) => {
                warn!(?addr, error = %e, "transport error awaiting registration");
                return;
            }
        };

        {
            let mut table = self.outstanding.lock().await;
            if table.contains_key(&worker_id) {
                warn!(worker_id, "protocol violation: duplicate registration");
                return;
            }
            table.insert(worker_id.clone(), 0);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.connections.insert(worker_id.clone(), tx);
        self.worker_joined.notify_waiters();
        info!(worker_id, "worker registered");

        let writer_worker_id = worker_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = send_message(&mut sink, &msg).await {
                    warn!(worker_id = %writer_worker_id, error = %e, "failed to send to worker");
                    break;
                }
            }
        });

        loop {
            match recv_message(&mut stream).await {
                Ok(Some(Message::ResultReady { sender, body })) => {
                    if sender != worker_id {
                        warn!(sender, worker_id, "protocol violation: sender mismatch");
                        continue;
                    }
                    self.apply_result(&worker_id, body).await;
                }
                Ok(Some(other)) => {
                    warn!(worker_id, kind = ?other, "protocol violation: unexpected message");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(worker_id, error = %e, "transport error, dropping worker");
                    break;
                }
            }
        }

        self.connections.remove(&worker_id);
        self.outstanding.lock().await.remove(&worker_id);
        writer.abort();
        info!(worker_id, "worker connection closed");
    }

    async fn apply_result(&self, worker_id: &str, task: TaskRecord) {
        if let Err(e) = self.ctx.on_result(&task).await {
            error!(error = %e, "failed to persist push result");
        }
        let mut table = self.outstanding.lock().await;
        match table.get_mut(worker_id) {
            Some(count) if *count > 0 => *count -= 1,
            Some(_) => warn!(worker_id, "protocol violation: outstanding count underflow"),
            None => warn!(worker_id, "protocol violation: result from unknown worker"),
        }
    }

    async fn intake_loop(&self) -> TaskFabResult<()> {
        let mut rx = self.ctx.store.subscribe_tasks().await?;
        loop {
            let bytes = match rx.recv().await {
                Ok(b) => b,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "push dispatcher lagged behind task channel");
                    continue;
                }
            };
            let mut task: TaskRecord = match serde_json::from_slice(&bytes) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "dropping malformed task notification");
                    continue;
                }
            };

            let worker_id = self.select_worker().await;
            if let Err(e) = self.ctx.mark_running(&mut task).await {
                error!(error = %e, "failed to mark task running");
                continue;
            }

            if let Some(tx) = self.connections.get(&worker_id) {
                let _ = tx.send(Message::NewTask {
                    sender: "dispatcher".to_string(),
                    body: task,
                });
            } else {
                warn!(worker_id, "selected worker vanished before send");
            }
        }
    }

    /// Blocks (via `Notify`) until at least one worker is registered, then
    /// selects the one with the smallest outstanding count and increments it
    /// before releasing the lock, so the read and the reservation are one
    /// atomic step with respect to concurrent `RESULT_READY` decrements.
    async fn select_worker(&self) -> String {
        loop {
            {
                let mut table = self.outstanding.lock().await;
                let selected = table
                    .iter()
                    .min_by(|(id_a, count_a), (id_b, count_b)| {
                        count_a.cmp(count_b).then_with(|| id_a.cmp(id_b))
                    })
                    .map(|(id, _)| id.clone());
                if let Some(worker) = selected {
                    *table.get_mut(&worker).expect("selected worker missing from table") += 1;
                    return worker;
                }
            }
            self.worker_joined.notified().await;
        }
    }
}
