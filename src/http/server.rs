//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up request tracing
//! - Hand every request to the dispatcher and return what it resolves to
//! - Serve until shutdown, then stop accepting

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::http::dispatcher::{DispatcherHandle, InboundRequest};
use crate::ipc::headers::from_header_map;
use crate::lifecycle::ShutdownSignal;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: DispatcherHandle,
}

/// Public HTTP listener of the front process.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self {
            router: Self::build_router(AppState { dispatcher }),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
///
/// Request bodies are not forwarded; only method, path with query and
/// headers travel to the worker.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, _body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    tracing::debug!(method = %parts.method, path = %path, "Proxying request");

    state
        .dispatcher
        .dispatch(InboundRequest {
            method: parts.method,
            path,
            headers: from_header_map(&parts.headers),
        })
        .await
}
