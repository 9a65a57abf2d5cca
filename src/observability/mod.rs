//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with request_id / worker / upstream / status fields
//!
//! Consumers:
//!     → front process: stdout
//!     → worker processes: stderr, inherited by the front
//! ```

pub mod logging;

pub use logging::{init, LogOutput};
