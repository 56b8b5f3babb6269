//! The worker runtime: two cooperative loops (intake, reporting) plus a
//! bounded execution pool that never touches the connection directly.
//!
//! Pull mode shares one socket under a single mutex: request and reply form
//! one atomic exchange, so the lock must cover both. Push mode instead
//! splits the socket into independent read/write halves, since intake
//! (awaiting an unsolicited `NEW_TASK`) and reporting (`RESULT_READY`) are
//! genuinely concurrent, unrelated activities with no reply to pair up —
//! sharing one lock between them would let a long wait for the next task
//! starve a result that is ready to report.

use std::sync::Arc;

use taskfab_shared::execute::run_and_finalize;
use taskfab_shared::wire::{framed, recv_message, send_message, MessageFramed};
use taskfab_shared::{FunctionRegistry, Message, TaskFabError, TaskFabResult, TaskRecord, TaskStore};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct WorkerRuntime {
    pub identity: String,
    registry: Arc<FunctionRegistry>,
    store: Arc<TaskStore>,
    pool: Arc<Semaphore>,
    socket: MessageFramed,
    result_tx: mpsc::UnboundedSender<TaskRecord>,
    result_rx: mpsc::UnboundedReceiver<TaskRecord>,
}

impl WorkerRuntime {
    pub async fn connect(
        host: &str,
        port: u16,
        pool_size: usize,
        registry: Arc<FunctionRegistry>,
        store: Arc<TaskStore>,
    ) -> TaskFabResult<Self> {
        let identity = format!("worker-{}", Uuid::now_v7());
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TaskFabError::transport(e.to_string()))?;
        let mut socket = framed(stream);

        send_message(
            &mut socket,
            &Message::Registration {
                sender: identity.clone(),
            },
        )
        .await?;

        let (result_tx, result_rx) = mpsc::unbounded_channel();

        Ok(Self {
            identity,
            registry,
            store,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            socket,
            result_tx,
            result_rx,
        })
    }

    /// Pull mode: repeatedly acquire a pool slot, then request a task under
    /// the socket lock (request and reply form one atomic exchange). Runs
    /// intake and reporting concurrently until either loop exits.
    pub async fn run_pull(mut self) -> TaskFabResult<()> {
        let socket = Arc::new(Mutex::new(self.socket));

        let intake = {
            let identity = self.identity.clone();
            let pool = self.pool.clone();
            let socket = socket.clone();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let result_tx = self.result_tx.clone();
            tokio::spawn(async move {
                loop {
                    let permit = match pool.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };

                    let reply = {
                        let mut guard = socket.lock().await;
                        let req = Message::RequestTask {
                            sender: identity.clone(),
                        };
                        if let Err(e) = send_message(&mut *guard, &req).await {
                            error!(error = %e, "failed to send REQUEST_TASK");
                            break;
                        }
                        recv_message(&mut *guard).await
                    };

                    match reply {
                        Ok(Some(Message::NewTask { body, .. })) => {
                            spawn_execution(store.clone(), registry.clone(), result_tx.clone(), body, permit);
                        }
                        Ok(Some(Message::NoTask { .. })) => {
                            drop(permit);
                            tokio::task::yield_now().await;
                        }
                        Ok(Some(other)) => {
                            warn!(kind = ?other, "protocol violation: unexpected reply to REQUEST_TASK");
                            drop(permit);
                        }
                        Ok(None) => {
                            info!("dispatcher closed connection");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "transport error awaiting task");
                            break;
                        }
                    }
                }
            })
        };

        let reporting = {
            let identity = self.identity.clone();
            async move {
                while let Some(task) = self.result_rx.recv().await {
                    let mut guard = socket.lock().await;
                    let msg = Message::ResultReady {
                        sender: identity.clone(),
                        body: task,
                    };
                    if let Err(e) = send_message(&mut *guard, &msg).await {
                        error!(error = %e, "failed to send RESULT_READY");
                        continue;
                    }
                    if let Err(e) = recv_message(&mut *guard).await {
                        error!(error = %e, "transport error awaiting ACK");
                    }
                }
            }
        };

        tokio::select! {
            _ = intake => {},
            _ = reporting => {},
        }
        Ok(())
    }

    /// Push mode: the dispatcher initiates every task; intake only waits
    /// for the next unsolicited `NEW_TASK` on its own read half. Reporting
    /// sends `RESULT_READY` on the write half with no reply expected. The
    /// two halves share no lock, so a slow intake never delays reporting.
    pub async fn run_push(self) -> TaskFabResult<()> {
        use futures::StreamExt;

        let WorkerRuntime {
            identity,
            registry,
            store,
            pool,
            socket,
            result_tx,
            mut result_rx,
        } = self;
        let (mut sink, mut stream) = socket.split();

        let intake = tokio::spawn(async move {
            loop {
                let permit = match pool.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };

                match recv_message(&mut stream).await {
                    Ok(Some(Message::NewTask { body, .. })) => {
                        spawn_execution(store.clone(), registry.clone(), result_tx.clone(), body, permit);
                    }
                    Ok(Some(other)) => {
                        warn!(kind = ?other, "protocol violation: unexpected push message");
                        drop(permit);
                    }
                    Ok(None) => {
                        info!("dispatcher closed connection");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "transport error awaiting NEW_TASK");
                        break;
                    }
                }
            }
        });

        let reporting = async move {
            while let Some(task) = result_rx.recv().await {
                let msg = Message::ResultReady {
                    sender: identity.clone(),
                    body: task,
                };
                if let Err(e) = send_message(&mut sink, &msg).await {
                    error!(error = %e, "failed to send RESULT_READY");
                }
            }
        };

        tokio::select! {
            _ = intake => {},
            _ = reporting => {},
        }
        Ok(())
    }
}

fn spawn_execution(
    store: Arc<TaskStore>,
    registry: Arc<FunctionRegistry>,
    result_tx: mpsc::UnboundedSender<TaskRecord>,
    mut task: TaskRecord,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    tokio::spawn(async move {
        let _permit = permit;
        debug!(task_id = %task.task_id, "executing task");
        run_and_finalize(&store, &registry, &mut task).await;
        if result_tx.send(task).is_err() {
            error!("result queue closed, dropping completed task");
        }
    });
}
