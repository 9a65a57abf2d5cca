//! Worker runtime: one request envelope in, exactly one response envelope out.
//!
//! # Responsibilities
//! - Decode and validate request envelopes, discarding malformed ones
//! - Resolve rule and upstream through the rule router
//! - Run the upstream call concurrently with other in-flight requests
//! - Serialize responses back to the front, one line each
//!
//! # Design Decisions
//! - Routing happens on the read loop, so per-rule cursors advance in
//!   arrival order and need no locking
//! - Each upstream call runs in its own task; a panic there becomes a 500
//!   envelope and the worker keeps serving

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::ipc::{decode_request, write_line, LineReader, Outcome, RequestEnvelope, ResponseEnvelope};
use crate::proxy::UpstreamClient;
use crate::routing::Router;

pub const NO_ROUTE: &str = "No matching route found";
pub const NO_UPSTREAM: &str = "No upstream server configured";
pub const INTERNAL_ERROR: &str = "Internal proxy error";

/// The upstream call made for a routed request.
pub trait Upstream: Clone + Send + Sync + 'static {
    fn call(
        &self,
        upstream: UpstreamConfig,
        request: RequestEnvelope,
    ) -> impl Future<Output = Outcome> + Send + 'static;
}

impl Upstream for UpstreamClient {
    fn call(
        &self,
        upstream: UpstreamConfig,
        request: RequestEnvelope,
    ) -> impl Future<Output = Outcome> + Send + 'static {
        let client = self.clone();
        async move { client.forward(&upstream, &request).await }
    }
}

/// Per-worker request handler.
pub struct WorkerRuntime<U = UpstreamClient> {
    config: Arc<ServerConfig>,
    router: Router,
    upstream: U,
}

impl WorkerRuntime<UpstreamClient> {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_upstream(config, UpstreamClient::new())
    }
}

impl<U: Upstream> WorkerRuntime<U> {
    pub fn with_upstream(config: ServerConfig, upstream: U) -> Self {
        let router = Router::from_config(&config.rules);
        Self {
            config: Arc::new(config),
            router,
            upstream,
        }
    }

    /// Route `envelope` now and return the future that completes it.
    ///
    /// The returned future always yields a response carrying the envelope's
    /// `requestId`.
    pub fn on_envelope(
        &mut self,
        envelope: RequestEnvelope,
    ) -> impl Future<Output = ResponseEnvelope> + Send + 'static {
        let plan = self.select_upstream(&envelope);
        let upstream_call = self.upstream.clone();

        async move {
            let request_id = envelope.request_id.clone();
            let outcome = match plan {
                Ok(upstream) => {
                    let call = tokio::spawn(upstream_call.call(upstream, envelope));
                    match call.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(request_id = %request_id, error = %e, "Request processing failed");
                            Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
                        }
                    }
                }
                Err(outcome) => outcome,
            };
            ResponseEnvelope::new(request_id, outcome)
        }
    }

    fn select_upstream(&mut self, envelope: &RequestEnvelope) -> Result<UpstreamConfig, Outcome> {
        let Some(rule) = self.router.match_path(&envelope.path) else {
            tracing::warn!(request_id = %envelope.request_id, path = %envelope.path, "No route matched");
            return Err(Outcome::failure(StatusCode::NOT_FOUND, NO_ROUTE));
        };

        let Some(upstream_id) = self.router.next_upstream(rule) else {
            tracing::error!(
                request_id = %envelope.request_id,
                rule = rule.index(),
                pattern = self.router.rule(rule).map(|r| r.pattern()),
                "Rule has no upstreams"
            );
            return Err(Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, NO_UPSTREAM));
        };

        match self.config.upstream(upstream_id) {
            Some(upstream) => Ok(upstream.clone()),
            None => {
                tracing::error!(
                    request_id = %envelope.request_id,
                    upstream = upstream_id,
                    "Rule references unknown upstream"
                );
                Err(Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, NO_UPSTREAM))
            }
        }
    }

    /// Serve envelopes from `input` until EOF, writing responses to `output`.
    ///
    /// Returns once input is closed and every in-flight request has answered.
    pub async fn run<R, W>(mut self, input: R, output: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEnvelope>();

        let writer = tokio::spawn(async move {
            let mut output = output;
            while let Some(response) = rx.recv().await {
                if let Err(e) = write_line(&mut output, &response).await {
                    tracing::error!(request_id = %response.request_id, error = %e, "Failed to write response envelope");
                    break;
                }
            }
        });

        let mut lines = LineReader::new(input);
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let envelope = match decode_request(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding invalid request envelope");
                    continue;
                }
            };

            tracing::debug!(
                request_id = %envelope.request_id,
                method = %envelope.method,
                path = %envelope.path,
                "Envelope received"
            );

            let response = self.on_envelope(envelope);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(response.await);
            });
        }

        drop(tx);
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "Response writer task failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::ipc::{decode_response, Headers, RequestId};
    use axum::http::Method;
    use tokio::io::AsyncWriteExt;

    fn config(rules: Vec<RuleConfig>) -> ServerConfig {
        ServerConfig {
            listen: 8080,
            workers: Some(1),
            upstreams: vec![UpstreamConfig {
                id: "u1".into(),
                url: "http://127.0.0.1:9".parse().unwrap(),
            }],
            rules,
        }
    }

    fn request(path: &str) -> RequestEnvelope {
        RequestEnvelope::new(RequestId::generate(), &Method::GET, path, Headers::new())
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let mut runtime = WorkerRuntime::new(config(vec![RuleConfig {
            path: "/api".into(),
            upstreams: vec!["u1".into()],
        }]));
        let envelope = request("/unmatched");
        let id = envelope.request_id.clone();

        let response = runtime.on_envelope(envelope).await;
        assert_eq!(response.request_id, id);
        assert_eq!(response.outcome, Outcome::failure(StatusCode::NOT_FOUND, NO_ROUTE));
    }

    #[tokio::test]
    async fn test_unknown_upstream_is_internal_error() {
        let mut runtime = WorkerRuntime::new(config(vec![RuleConfig {
            path: "/".into(),
            upstreams: vec!["ghost".into()],
        }]));

        let response = runtime.on_envelope(request("/x")).await;
        assert_eq!(
            response.outcome,
            Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, NO_UPSTREAM)
        );
    }

    /// Answers 200 "ok", except for paths under `/boom`, where it panics.
    #[derive(Clone)]
    struct PanicsOnBoom;

    impl Upstream for PanicsOnBoom {
        fn call(
            &self,
            _upstream: UpstreamConfig,
            request: RequestEnvelope,
        ) -> impl Future<Output = Outcome> + Send + 'static {
            async move {
                if request.path.starts_with("/boom") {
                    panic!("upstream call blew up");
                }
                Outcome::Success {
                    status: 200,
                    headers: Headers::new(),
                    data: b"ok".to_vec(),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_upstream_call_answers_500_and_worker_survives() {
        let (mut front_tx, worker_rx) = tokio::io::duplex(4096);
        let (worker_tx, front_rx) = tokio::io::duplex(4096);
        let runtime = WorkerRuntime::with_upstream(
            config(vec![RuleConfig {
                path: "/".into(),
                upstreams: vec!["u1".into()],
            }]),
            PanicsOnBoom,
        );
        let worker = tokio::spawn(runtime.run(worker_rx, worker_tx));
        let mut lines = LineReader::new(front_rx);

        let boom = request("/boom");
        write_line(&mut front_tx, &boom).await.unwrap();
        let response = decode_response(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response.request_id, boom.request_id);
        assert_eq!(
            response.outcome,
            Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        );

        let next = request("/fine");
        write_line(&mut front_tx, &next).await.unwrap();
        let response = decode_response(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response.request_id, next.request_id);
        assert_eq!(response.outcome.status(), 200);

        drop(front_tx);
        worker.await.unwrap().unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_skips_malformed_envelopes() {
        let (mut front_tx, worker_rx) = tokio::io::duplex(4096);
        let (worker_tx, front_rx) = tokio::io::duplex(4096);
        let runtime = WorkerRuntime::new(config(Vec::new()));
        let worker = tokio::spawn(runtime.run(worker_rx, worker_tx));

        let valid = request("/anything");
        front_tx.write_all(b"{ not json\n").await.unwrap();
        front_tx
            .write_all(b"{\"requestId\":\"x\",\"type\":\"HTTP\",\"method\":\"GET\",\"path\":\"relative\"}\n")
            .await
            .unwrap();
        write_line(&mut front_tx, &valid).await.unwrap();
        drop(front_tx);

        worker.await.unwrap().unwrap();

        let mut lines = LineReader::new(front_rx);
        let line = lines.next_line().await.unwrap().unwrap();
        let response = decode_response(&line).unwrap();
        assert_eq!(response.request_id, valid.request_id);
        assert_eq!(response.outcome.status(), 404);
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
