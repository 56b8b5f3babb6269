//! Pull placement: workers request tasks on demand from a single internal
//! FIFO; the dispatcher never initiates contact with a worker.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::StreamExt;
use taskfab_shared::wire::{framed, recv_message, send_message};
use taskfab_shared::{Message, TaskFabError, TaskFabResult, TaskRecord};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::context::DispatcherContext;

#[derive(Clone)]
pub struct PullDispatcher {
    ctx: DispatcherContext,
    port: u16,
    fifo: std::sync::Arc<Mutex<VecDeque<TaskRecord>>>,
}

impl PullDispatcher {
    pub fn new(ctx: DispatcherContext, port: u16) -> Self {
        Self {
            ctx,
            port,
            fifo: std::sync::Arc::new(Mutex::new(VecDeque::new())),
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
        info!(port = self.port, "pull dispatcher listening");

        let accept_self = self.clone();
        tokio::spawn(async move { accept_self.accept_loop(listener).await });

        self.intake_loop().await
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = self.clone();
                    tokio::spawn(async move { handler.handle_connection(stream, addr).await });
                }
                Err(e) => error!(error = %e, "pull dispatcher accept failed"),
            }
        }
    }

    /// Each connection is a strictly sequential request/reply channel;
    /// any number of these run concurrently, all competing for `self.fifo`.
    async fn handle_connection(self, stream: TcpStream, addr: std::net::SocketAddr) {
        let framed_conn = framed(stream);
        let (mut sink, mut stream) = framed_conn.split();
        let mut worker_id = String::new();

        loop {
            let msg = match recv_message(&mut stream).await {
                Ok(Some(m)) => m,
                Ok(None) => break,
                Err(e) => {
                    warn!(?addr, error = %e, "transport error on pull connection");
                    break;
                }
            };

            let reply = match msg {
                Message::Registration { sender } => {
                    worker_id = sender.clone();
                    info!(worker_id = %sender, "worker registered");
                    Some(Message::Ack { sender: "dispatcher".to_string() })
                }
                Message::RequestTask { sender } => {
                    let next = self.fifo.lock().expect("fifo poisoned").pop_front();
                    match next {
                        Some(mut task) => {
                            if let Err(e) = self.ctx.mark_running(&mut task).await {
                                error!(error = %e, "failed to mark task running");
                                Some(Message::NoTask { sender: "dispatcher".to_string() })
                            } else {
                                Some(Message::NewTask {
                                    sender: "dispatcher".to_string(),
                                    body: task,
                                })
                            }
                        }
                        None => {
                            let _ = sender;
                            Some(Message::NoTask { sender: "dispatcher".to_string() })
                        }
                    }
                }
                Message::ResultReady { sender, body } => {
                    if sender != worker_id {
                        warn!(sender, worker_id, "protocol violation: sender mismatch");
                    }
                    if let Err(e) = self.ctx.on_result(&body).await {
                        error!(error = %e, "failed to persist pull result");
                    }
                    Some(Message::Ack { sender: "dispatcher".to_string() })
                }
                other => {
                    warn!(kind = ?other, "protocol violation: unexpected message on pull connection");
                    None
                }
            };

            if let Some(reply) = reply {
                if let Err(e) = send_message(&mut sink, &reply).await {
                    warn!(worker_id, error = %e, "failed to reply to worker");
                    break;
                }
            }
        }

        info!(worker_id, "pull connection closed");
    }

    async fn intake_loop(&self) -> TaskFabResult<()> {
        let mut rx = self.ctx.store.subscribe_tasks().await?;
        loop {
            let bytes = match rx.recv().await {
                Ok(b) => b,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "pull dispatcher lagged behind task channel");
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
            self.fifo.lock().expect("fifo poisoned").push_back(task);
        }
    }
}
