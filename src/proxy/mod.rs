//! Upstream proxy client (runs inside each worker).
//!
//! # Data Flow
//! ```text
//! UpstreamConfig + RequestEnvelope
//!     → client.rs (build URL, rewrite Host, drop framing headers)
//!     → hyper-util Client → upstream server
//!     → full body buffered
//!     → Outcome::Success { status, headers, data }
//!       or Outcome::Failure { 502, error chain }
//! ```
//!
//! # Design Decisions
//! - No retries: a failure is reported once, as-is
//! - No connection pool tuning; hyper-util's defaults apply

pub mod client;

pub use client::{ProxyError, UpstreamClient};
