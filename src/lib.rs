//! Cluster reverse proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────── FRONT PROCESS ────────────────────┐
//!  Client Request    │  ┌─────────┐    ┌────────────┐    ┌──────────────┐    │
//!  ──────────────────┼─▶│  http   │───▶│ dispatcher │───▶│ worker pool  │────┼──┐
//!                    │  │ server  │    │  pending   │    │ round-robin  │    │  │ NDJSON
//!  Client Response   │  └─────────┘    │  + 30s     │◀───│  supervisor  │◀───┼─┐│ envelopes
//!  ◀─────────────────┼────────────────│  deadline  │    └──────────────┘    │ ││
//!                    │                 └────────────┘                        │ ││
//!                    └───────────────────────────────────────────────────────┘ ││
//!                                                                              ││
//!                    ┌──────────────── WORKER PROCESS (×N) ──────────────────┐ ││
//!                    │  ┌─────────┐    ┌────────────┐    ┌──────────────┐    │ ││
//!                    │  │ runtime │───▶│  routing   │───▶│ proxy client │────┼─┼┼──▶ Upstream
//!                    │  │ (ipc)   │◀───│ rule + rr  │◀───│  (hyper)     │◀───┼─┼┼─── Server
//!                    │  └─────────┘    └────────────┘    └──────────────┘    │ ││
//!                    └───────┬──────────────────────────────────────▲────────┘ ││
//!                            └──────────────── stdout ──────────────┘──────────┘│
//!                                      stdin ◀──────────────────────────────────┘
//! ```

// Front process
pub mod http;
pub mod lifecycle;

// Shared by both sides
pub mod config;
pub mod ipc;
pub mod load_balancer;

// Worker process
pub mod proxy;
pub mod routing;
pub mod worker;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
