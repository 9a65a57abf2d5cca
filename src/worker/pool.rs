//! Worker pool management (runs inside the front process).
//!
//! # Responsibilities
//! - Start exactly `worker_count` workers, each with its own config copy
//! - Hand out one handle per worker, in fixed index order
//! - Funnel every worker's output lines into a single inbound channel

use std::path::PathBuf;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::ipc::{write_line, LineReader, RequestEnvelope};
use crate::lifecycle::Shutdown;
use crate::worker::process::{spawn_worker, Slot};
use crate::worker::runtime::WorkerRuntime;

/// Envelopes queued per worker before dispatch is refused.
pub const QUEUE_CAPACITY: usize = 1024;

/// Buffer size of the in-memory pipes used by in-process workers.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Error type for pool startup and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to serialize worker configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to start worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {index} queue is full")]
    QueueFull { index: usize },

    #[error("Worker {index} is gone")]
    Closed { index: usize },
}

/// A raw line received from a worker.
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    pub worker: usize,
    pub line: String,
}

/// Sending side of one pool slot.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    index: usize,
    tx: mpsc::Sender<RequestEnvelope>,
}

impl WorkerHandle {
    pub fn new(index: usize, tx: mpsc::Sender<RequestEnvelope>) -> Self {
        Self { index, tx }
    }

    /// Queue an envelope without waiting.
    pub fn try_send(&self, envelope: RequestEnvelope) -> Result<(), PoolError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull { index: self.index },
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed { index: self.index },
        })
    }
}

/// Command used to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["worker".to_string()],
        }
    }

    /// Re-run the current executable in worker mode.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// How workers are started.
#[derive(Debug, Clone)]
pub enum WorkerLauncher {
    /// Child processes speaking NDJSON on stdin/stdout.
    Process(WorkerCommand),
    /// Tokio tasks behind in-memory pipes; same wire format.
    InProcess,
}

/// The started pool: handles in index order plus the shared inbound channel.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    inbound: mpsc::Receiver<WorkerMessage>,
}

impl WorkerPool {
    /// Start `config.worker_count()` workers.
    ///
    /// Any worker failing to start fails the whole pool.
    pub fn start(
        config: &ServerConfig,
        launcher: &WorkerLauncher,
        shutdown: &Shutdown,
    ) -> Result<Self, PoolError> {
        let count = config.worker_count();
        let (inbound_tx, inbound) = mpsc::channel(QUEUE_CAPACITY * count.max(1));
        let mut workers = Vec::with_capacity(count);

        match launcher {
            WorkerLauncher::Process(command) => {
                let config_json = serde_json::to_string(config)?;

                // Spawn every child before supervising any, so a failure
                // drops (and kills) the ones already started.
                let mut children = Vec::with_capacity(count);
                for index in 0..count {
                    let child = spawn_worker(command, &config_json, index)
                        .map_err(|source| PoolError::Spawn { index, source })?;
                    children.push(child);
                }

                for (index, child) in children.into_iter().enumerate() {
                    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                    let slot = Slot {
                        index,
                        command: command.clone(),
                        config_json: config_json.clone(),
                        envelopes: rx,
                        inbound: inbound_tx.clone(),
                    };
                    tokio::spawn(slot.supervise(child, shutdown.subscribe()));
                    workers.push(WorkerHandle::new(index, tx));
                }
            }
            WorkerLauncher::InProcess => {
                for index in 0..count {
                    workers.push(spawn_in_process(index, config.clone(), inbound_tx.clone()));
                }
            }
        }

        tracing::info!(workers = count, "Worker pool started");
        Ok(Self { workers, inbound })
    }

    /// Build a pool from existing handles (custom transports, tests).
    pub fn from_parts(workers: Vec<WorkerHandle>, inbound: mpsc::Receiver<WorkerMessage>) -> Self {
        Self { workers, inbound }
    }

    pub fn into_parts(self) -> (Vec<WorkerHandle>, mpsc::Receiver<WorkerMessage>) {
        (self.workers, self.inbound)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Forward every line a worker writes into the inbound channel.
pub(crate) fn spawn_reader<R>(index: usize, output: R, inbound: mpsc::Sender<WorkerMessage>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LineReader::new(output);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if inbound.send(WorkerMessage { worker: index, line }).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(worker = index, "Worker output closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(worker = index, error = %e, "Failed to read worker output");
                    break;
                }
            }
        }
    })
}

fn spawn_in_process(index: usize, config: ServerConfig, inbound: mpsc::Sender<WorkerMessage>) -> WorkerHandle {
    let (tx, mut rx) = mpsc::channel::<RequestEnvelope>(QUEUE_CAPACITY);
    let (mut to_worker, worker_input) = tokio::io::duplex(PIPE_CAPACITY);
    let (worker_output, from_worker) = tokio::io::duplex(PIPE_CAPACITY);

    tokio::spawn(async move {
        if let Err(e) = WorkerRuntime::new(config).run(worker_input, worker_output).await {
            tracing::error!(worker = index, error = %e, "In-process worker failed");
        }
        tracing::debug!(worker = index, "In-process worker stopped");
    });
    spawn_reader(index, from_worker, inbound);

    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if let Err(e) = write_line(&mut to_worker, &envelope).await {
                tracing::error!(worker = index, error = %e, "Failed to deliver envelope");
                break;
            }
        }
    });

    tracing::info!(worker = index, "In-process worker up");
    WorkerHandle::new(index, tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::ipc::{decode_response, Headers, RequestId};
    use axum::http::Method;

    fn config(workers: usize) -> ServerConfig {
        ServerConfig {
            listen: 8080,
            workers: Some(workers),
            upstreams: Vec::new(),
            rules: vec![RuleConfig {
                path: "/only".into(),
                upstreams: vec!["u1".into()],
            }],
        }
    }

    #[tokio::test]
    async fn test_in_process_pool_answers_on_every_slot() {
        let shutdown = Shutdown::new();
        let pool = WorkerPool::start(&config(3), &WorkerLauncher::InProcess, &shutdown).unwrap();
        assert_eq!(pool.len(), 3);

        let (workers, mut inbound) = pool.into_parts();
        for worker in &workers {
            let envelope = RequestEnvelope::new(RequestId::generate(), &Method::GET, "/elsewhere", Headers::new());
            worker.try_send(envelope).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let message = inbound.recv().await.unwrap();
            let response = decode_response(&message.line).unwrap();
            assert_eq!(response.outcome.status(), 404);
            seen.push(message.worker);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let shutdown = Shutdown::new();
        let launcher = WorkerLauncher::Process(WorkerCommand::new("/nonexistent/cluster-proxy-worker"));
        let err = WorkerPool::start(&config(2), &launcher, &shutdown).unwrap_err();
        assert!(matches!(err, PoolError::Spawn { index: 0, .. }));
    }

    #[test]
    fn test_closed_handle_reports_index() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = WorkerHandle::new(4, tx);
        let envelope = RequestEnvelope::new(RequestId::generate(), &Method::GET, "/", Headers::new());
        assert!(matches!(handle.try_send(envelope), Err(PoolError::Closed { index: 4 })));
    }
}
