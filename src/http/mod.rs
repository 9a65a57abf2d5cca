//! HTTP protocol handling subsystem (front process).
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum catch-all handler, request tracing)
//!     → dispatcher.rs (pick worker, send envelope, await reply or deadline)
//!     → response.rs (outcome → status, headers, body)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod response;
pub mod server;

pub use dispatcher::{Dispatcher, DispatcherHandle, InboundRequest, DISPATCH_DEADLINE};
pub use server::HttpServer;
