//! Worker processes: spawning, supervision and the child-side entry point.
//!
//! # Lifecycle
//! ```text
//! spawn (config JSON in env) → Running → exit observed
//!     → backoff → respawn at the same index → Running ...
//! shutdown → kill child → supervisor returns
//! queue closed → close stdin → child drains and exits → supervisor returns
//! ```

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::ipc::{write_line, RequestEnvelope};
use crate::lifecycle::ShutdownSignal;
use crate::resilience::backoff::calculate_backoff;
use crate::worker::pool::{spawn_reader, WorkerCommand, WorkerMessage};
use crate::worker::runtime::WorkerRuntime;

/// Environment variable carrying the worker's `ServerConfig` as JSON.
pub const WORKER_CONFIG_ENV: &str = "CLUSTER_PROXY_WORKER_CONFIG";

/// Environment variable carrying the worker's pool index (for logs).
pub const WORKER_INDEX_ENV: &str = "CLUSTER_PROXY_WORKER_INDEX";

const RESPAWN_BASE_DELAY_MS: u64 = 100;
const RESPAWN_MAX_DELAY_MS: u64 = 5_000;

/// A worker that stayed up this long resets the respawn backoff.
const STABLE_UPTIME: Duration = Duration::from_secs(10);

/// Errors in the worker-side entry point.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("CLUSTER_PROXY_WORKER_CONFIG is not set; workers are started by the front process")]
    MissingConfig,

    #[error("Invalid worker configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start one worker child with piped stdin/stdout.
pub(crate) fn spawn_worker(command: &WorkerCommand, config_json: &str, index: usize) -> std::io::Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env(WORKER_CONFIG_ENV, config_json)
        .env(WORKER_INDEX_ENV, index.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    // Keep terminal signals away from workers; the front decides when they stop.
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    tracing::info!(worker = index, pid = ?child.id(), "Worker up");
    Ok(child)
}

enum SlotExit {
    Exited(Option<ExitStatus>),
    QueueClosed,
    Shutdown,
}

/// One pool slot: owns its envelope queue across respawns.
pub(crate) struct Slot {
    pub index: usize,
    pub command: WorkerCommand,
    pub config_json: String,
    pub envelopes: mpsc::Receiver<RequestEnvelope>,
    pub inbound: mpsc::Sender<WorkerMessage>,
}

impl Slot {
    /// Drive `child`, replacing it whenever it exits.
    pub(crate) async fn supervise(mut self, mut child: Child, mut shutdown: ShutdownSignal) {
        let mut restarts: u32 = 0;

        loop {
            let started = Instant::now();
            match self.drive(&mut child, &mut shutdown).await {
                SlotExit::Shutdown => {
                    let _ = child.kill().await;
                    tracing::debug!(worker = self.index, "Worker stopped for shutdown");
                    return;
                }
                SlotExit::QueueClosed => {
                    let status = child.wait().await;
                    tracing::debug!(worker = self.index, status = ?status, "Worker drained and exited");
                    return;
                }
                SlotExit::Exited(status) => {
                    tracing::warn!(worker = self.index, status = ?status, "Worker exited unexpectedly");
                }
            }

            if started.elapsed() >= STABLE_UPTIME {
                restarts = 0;
            }

            loop {
                restarts = restarts.saturating_add(1);
                let delay = calculate_backoff(restarts, RESPAWN_BASE_DELAY_MS, RESPAWN_MAX_DELAY_MS);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => return,
                }

                match spawn_worker(&self.command, &self.config_json, self.index) {
                    Ok(replacement) => {
                        child = replacement;
                        tracing::info!(worker = self.index, attempt = restarts, "Worker respawned");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(worker = self.index, attempt = restarts, error = %e, "Failed to respawn worker");
                    }
                }
            }
        }
    }

    /// Pump envelopes into `child` until it exits, the queue closes or shutdown.
    async fn drive(&mut self, child: &mut Child, shutdown: &mut ShutdownSignal) -> SlotExit {
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            tracing::error!(worker = self.index, "Worker started without stdio pipes");
            let _ = child.start_kill();
            return SlotExit::Exited(child.wait().await.ok());
        };
        spawn_reader(self.index, stdout, self.inbound.clone());

        loop {
            tokio::select! {
                status = child.wait() => return SlotExit::Exited(status.ok()),
                _ = shutdown.recv() => return SlotExit::Shutdown,
                envelope = self.envelopes.recv() => {
                    let Some(envelope) = envelope else {
                        // Closing stdin lets the worker finish in-flight requests.
                        drop(stdin);
                        return SlotExit::QueueClosed;
                    };
                    if let Err(e) = write_line(&mut stdin, &envelope).await {
                        // The deadline resolves this request; the exit branch respawns.
                        tracing::warn!(
                            worker = self.index,
                            request_id = %envelope.request_id,
                            error = %e,
                            "Failed to deliver envelope to worker"
                        );
                    }
                }
            }
        }
    }
}

/// Worker process entry point: config from the environment, envelopes on stdio.
pub async fn run_from_env() -> Result<(), WorkerError> {
    let raw = std::env::var(WORKER_CONFIG_ENV).map_err(|_| WorkerError::MissingConfig)?;
    let config: ServerConfig = serde_json::from_str(&raw)?;
    let index = std::env::var(WORKER_INDEX_ENV).unwrap_or_else(|_| "?".to_string());

    let span = tracing::info_span!("worker", index = %index, pid = std::process::id());
    async move {
        tracing::info!(rules = config.rules.len(), upstreams = config.upstreams.len(), "Worker ready");
        WorkerRuntime::new(config)
            .run(tokio::io::stdin(), tokio::io::stdout())
            .await?;
        tracing::info!("Front closed the channel, exiting");
        Ok::<(), WorkerError>(())
    }
    .instrument(span)
    .await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::ipc::{Headers, RequestId};
    use crate::lifecycle::Shutdown;
    use crate::worker::pool::{WorkerLauncher, WorkerPool};
    use axum::http::Method;

    /// A "worker" that answers one line with its index and pid, then dies.
    fn one_shot_worker() -> WorkerLauncher {
        WorkerLauncher::Process(WorkerCommand {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                format!("read line; echo \"${}:$$\"; exit 1", WORKER_INDEX_ENV),
            ],
        })
    }

    #[tokio::test]
    async fn test_crashed_worker_is_respawned_at_same_index() {
        let config = ServerConfig {
            listen: 8080,
            workers: Some(1),
            upstreams: Vec::new(),
            rules: Vec::new(),
        };
        let shutdown = Shutdown::new();
        let pool = WorkerPool::start(&config, &one_shot_worker(), &shutdown).unwrap();
        let (workers, mut inbound) = pool.into_parts();

        let mut seen = Vec::new();
        for _ in 0..2 {
            let envelope = RequestEnvelope::new(RequestId::generate(), &Method::GET, "/", Headers::new());
            workers[0].try_send(envelope).unwrap();
            let message = tokio::time::timeout(Duration::from_secs(10), inbound.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.worker, 0);
            seen.push(message.line);

            // Let the supervisor observe the exit before queueing the next one.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        assert!(seen[0].starts_with("0:"), "{:?}", seen);
        assert!(seen[1].starts_with("0:"), "{:?}", seen);
        assert_ne!(seen[0], seen[1], "replacement should be a new process");

        shutdown.trigger();
    }
}
