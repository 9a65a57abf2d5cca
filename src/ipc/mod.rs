//! Envelope protocol between the front process and its workers.
//!
//! # Data Flow
//! ```text
//! Front Dispatcher
//!     → RequestEnvelope (envelope.rs)
//!     → encode_line (codec.rs, one JSON object per line)
//!     → worker stdin / in-memory pipe
//!
//! Worker Runtime
//!     → ResponseEnvelope { Success | Failure }
//!     → encode_line
//!     → worker stdout / in-memory pipe
//!     → decode_response in the front, correlated by requestId
//! ```
//!
//! # Design Decisions
//! - Envelopes are self-contained; dropping one never corrupts another
//! - Correlation is solely by `requestId`, never by arrival order
//! - Response payload is a tagged `Outcome`, flattened on the wire

pub mod codec;
pub mod envelope;
pub mod headers;

pub use codec::{decode_request, decode_response, encode_line, write_line, LineReader};
pub use envelope::{
    EnvelopeError, Headers, HeaderValues, MessageKind, Outcome, RequestEnvelope, RequestId,
    ResponseEnvelope,
};
