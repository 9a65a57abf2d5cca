//! Outbound HTTP calls to upstream servers.
//!
//! # Responsibilities
//! - Resolve the request path and query against the upstream base URL
//! - Replay method and headers with `Host` rewritten
//! - Buffer the full upstream body (no streaming)
//! - Turn transport failures into 502 outcomes carrying the error text

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::{Position, Url};

use crate::config::UpstreamConfig;
use crate::ipc::headers::{from_header_map, to_header_map};
use crate::ipc::{EnvelopeError, Outcome, RequestEnvelope};

/// TCP connect timeout for upstream connections.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest upstream body buffered into a response envelope.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Request headers not replayed upstream: `host` is rewritten, framing
/// headers would make the upstream wait for a body that is never sent, and
/// the rest are hop-by-hop.
const SKIPPED_REQUEST_HEADERS: [HeaderName; 8] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::UPGRADE,
    header::TE,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
];

/// Errors while forwarding to an upstream.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid upstream target: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] EnvelopeError),

    #[error("Failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("{}", error_chain(.0))]
    Transport(#[source] hyper_util::client::legacy::Error),

    #[error("Failed to read upstream response: {}", error_chain(.0))]
    Body(#[source] axum::Error),
}

impl ProxyError {
    /// Status code reported to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Transport(_) | ProxyError::Body(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidTarget(_) | ProxyError::InvalidRequest(_) | ProxyError::Request(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Render an error and all of its sources, e.g.
/// `client error (Connect): tcp connect error: Connection refused (os error 111)`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Resolve `path_and_query` against an upstream base URL.
pub fn upstream_url(base: &Url, path_and_query: &str) -> Result<Url, url::ParseError> {
    // A leading "//" would be scheme-relative and switch hosts.
    let relative = format!("/{}", path_and_query.trim_start_matches('/'));
    base.join(&relative)
}

/// HTTP client shared by all requests of one worker.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }

    /// Forward `request` to `upstream`. Never fails: errors become outcomes.
    pub async fn forward(&self, upstream: &UpstreamConfig, request: &RequestEnvelope) -> Outcome {
        match self.try_forward(upstream, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    upstream = %upstream.id,
                    error = %e,
                    "Upstream error"
                );
                Outcome::failure(e.status(), e.to_string())
            }
        }
    }

    async fn try_forward(
        &self,
        upstream: &UpstreamConfig,
        request: &RequestEnvelope,
    ) -> Result<Outcome, ProxyError> {
        let target = upstream_url(&upstream.url, &request.path)?;
        let host = &target[Position::BeforeHost..Position::AfterPort];

        let mut builder = Request::builder()
            .method(request.http_method()?)
            .uri(target.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(to_header_map(&request.headers, &SKIPPED_REQUEST_HEADERS));
        }
        let outbound = builder.header(header::HOST, host).body(Body::empty())?;

        tracing::debug!(
            request_id = %request.request_id,
            upstream = %upstream.id,
            target = %target,
            "Forwarding request"
        );

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(ProxyError::Transport)?;
        let (parts, body) = response.into_parts();
        let data = axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
            .await
            .map_err(ProxyError::Body)?;

        Ok(Outcome::Success {
            status: parts.status.as_u16(),
            headers: from_header_map(&parts.headers),
            data: data.to_vec(),
        })
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}
