//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! Front process                          Worker process (×N)
//! ─────────────                          ───────────────────
//! WorkerHandle.try_send(envelope)
//!     → slot queue (pool.rs)
//!     → supervisor writes NDJSON ──────▶ stdin → runtime.rs
//!                                            → routing::Router
//!                                            → proxy::UpstreamClient
//!     inbound channel ◀── reader ◀────── stdout ← ResponseEnvelope
//! ```
//!
//! # Design Decisions
//! - No shared memory: config is copied in at spawn, all else is messages
//! - A crashed worker is respawned at the same index (process.rs)
//! - `--in-process` swaps child processes for tasks over in-memory pipes

pub mod pool;
pub mod process;
pub mod runtime;

pub use pool::{PoolError, WorkerCommand, WorkerHandle, WorkerLauncher, WorkerMessage, WorkerPool};
pub use process::{run_from_env, WorkerError};
pub use runtime::{Upstream, WorkerRuntime};
