//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a worker's [`Outcome`] into the client response
//! - Strip hop-by-hop framing headers copied from the upstream
//! - Build the fixed front-side error responses (500, 503, 504)
//!
//! # Design Decisions
//! - Bodies are already buffered by the worker; `content-length` is
//!   recomputed from the bytes rather than trusted
//! - A status code a worker cannot legally send becomes 502

use axum::{
    body::Body,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};

use crate::ipc::{headers::to_header_map, Outcome};

pub const NO_WORKER: &str = "no worker available";
pub const GATEWAY_TIMEOUT: &str = "Gateway timeout";
pub const WORKER_UNAVAILABLE: &str = "Worker unavailable";

const HOP_BY_HOP: [HeaderName; 3] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
];

/// Complete a client response from a worker outcome.
pub fn from_outcome(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Success { status, headers, data } => {
            let Ok(status) = StatusCode::from_u16(status) else {
                tracing::warn!(status, "Worker returned an invalid status code");
                return (StatusCode::BAD_GATEWAY, "Invalid upstream status").into_response();
            };
            let mut response = Response::new(Body::from(data));
            *response.status_mut() = status;
            *response.headers_mut() = to_header_map(&headers, &HOP_BY_HOP);
            response
        }
        Outcome::Failure { status, error } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, error).into_response()
        }
    }
}

/// 500: the pool has no workers.
pub fn no_worker() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, NO_WORKER).into_response()
}

/// 504: no worker answered before the deadline.
pub fn gateway_timeout() -> Response {
    (StatusCode::GATEWAY_TIMEOUT, GATEWAY_TIMEOUT).into_response()
}

/// 503: the chosen worker cannot take the request, or the dispatcher is gone.
pub fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, WORKER_UNAVAILABLE).into_response()
}
