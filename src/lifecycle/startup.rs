//! Startup orchestration.
//!
//! # Order
//! 1. Config already loaded and validated (fatal before anything else)
//! 2. Worker pool started; any worker failing to start is fatal
//! 3. Dispatcher spawned
//! 4. Listener bound last, so traffic only arrives once workers can route

use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::dispatcher::{Dispatcher, DISPATCH_DEADLINE};
use crate::http::HttpServer;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::worker::{PoolError, WorkerLauncher, WorkerPool};

/// Fatal startup and serving errors.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A started proxy: workers and dispatcher running, not yet listening.
pub struct Proxy {
    server: HttpServer,
    shutdown: ShutdownSignal,
}

impl Proxy {
    /// Start workers and the dispatcher with the standard 30s deadline.
    pub fn start(
        config: &ServerConfig,
        launcher: &WorkerLauncher,
        shutdown: &Shutdown,
    ) -> Result<Self, StartupError> {
        Self::start_with_deadline(config, launcher, shutdown, DISPATCH_DEADLINE)
    }

    pub fn start_with_deadline(
        config: &ServerConfig,
        launcher: &WorkerLauncher,
        shutdown: &Shutdown,
        deadline: Duration,
    ) -> Result<Self, StartupError> {
        let pool = WorkerPool::start(config, launcher, shutdown)?;
        if pool.is_empty() {
            tracing::warn!("Worker pool is empty, every request will be answered with 500");
        }
        let (dispatcher, handle) = Dispatcher::with_deadline(pool, deadline);
        tokio::spawn(dispatcher.run(shutdown.subscribe()));

        Ok(Self {
            server: HttpServer::new(handle),
            shutdown: shutdown.subscribe(),
        })
    }

    /// Serve HTTP on `listener` until shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        self.server
            .run(listener, self.shutdown)
            .await
            .map_err(StartupError::Serve)
    }
}

/// Start everything and serve on `0.0.0.0:<listen>` until shutdown.
pub async fn run(
    config: &ServerConfig,
    launcher: &WorkerLauncher,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let proxy = Proxy::start(config, launcher, shutdown)?;

    let listener = TcpListener::bind(("0.0.0.0", config.listen))
        .await
        .map_err(|source| StartupError::Bind {
            port: config.listen,
            source,
        })?;

    proxy.serve(listener).await
}
