//! Front dispatcher: hands each client request to a worker and waits for the
//! matching response envelope or the deadline.
//!
//! # Data Flow
//! ```text
//! handler ──Command──▶ Dispatcher ──envelope──▶ worker[i mod P]
//!    ▲                    │  ▲
//!    └──oneshot reply─────┘  └── response lines / expired timers
//! ```
//!
//! # Design Decisions
//! - One task owns the worker cursor and the pending table; no locks
//! - Removing an entry from the pending table is the only way a request
//!   completes, so a reply and its timeout can never both win

use std::collections::HashMap;
use std::time::Duration;

use axum::http::Method;
use axum::response::Response;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::http::response;
use crate::ipc::{decode_response, Headers, RequestEnvelope, RequestId};
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::RoundRobin;
use crate::worker::{WorkerHandle, WorkerMessage, WorkerPool};

/// How long a dispatched request may wait for its worker.
pub const DISPATCH_DEADLINE: Duration = Duration::from_secs(30);

const COMMAND_CAPACITY: usize = 1024;

/// The parts of a client request that travel to a worker.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path including the query string.
    pub path: String,
    pub headers: Headers,
}

enum Command {
    Dispatch {
        request: InboundRequest,
        reply: oneshot::Sender<Response>,
    },
}

struct PendingRequest {
    reply: oneshot::Sender<Response>,
    timer: JoinHandle<()>,
    worker: usize,
    dispatched_at: Instant,
}

/// Cloneable handle used by HTTP handlers.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Dispatch { request, .. } => f.debug_struct("Dispatch").field("request", request).finish(),
        }
    }
}

impl DispatcherHandle {
    /// Dispatch one request and wait for its response.
    ///
    /// Answers 503 if the dispatcher has stopped.
    pub async fn dispatch(&self, request: InboundRequest) -> Response {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Dispatch { request, reply }).await.is_err() {
            tracing::warn!("Dispatcher is not running");
            return response::unavailable();
        }
        match rx.await {
            Ok(response) => response,
            Err(_) => response::unavailable(),
        }
    }
}

/// The dispatcher task state.
pub struct Dispatcher {
    workers: Vec<WorkerHandle>,
    inbound: mpsc::Receiver<WorkerMessage>,
    inbound_open: bool,
    commands: mpsc::Receiver<Command>,
    cursor: RoundRobin,
    pending: HashMap<RequestId, PendingRequest>,
    expired_tx: mpsc::UnboundedSender<RequestId>,
    expired_rx: mpsc::UnboundedReceiver<RequestId>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(pool: WorkerPool) -> (Self, DispatcherHandle) {
        Self::with_deadline(pool, DISPATCH_DEADLINE)
    }

    pub fn with_deadline(pool: WorkerPool, deadline: Duration) -> (Self, DispatcherHandle) {
        let (workers, inbound) = pool.into_parts();
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            workers,
            inbound,
            inbound_open: true,
            commands,
            cursor: RoundRobin::new(),
            pending: HashMap::new(),
            expired_tx,
            expired_rx,
            deadline,
        };
        (dispatcher, DispatcherHandle { tx })
    }

    /// Run until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        tracing::debug!(workers = self.workers.len(), deadline = ?self.deadline, "Dispatcher running");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(request_id) = self.expired_rx.recv() => self.expire(request_id),
                message = self.inbound.recv(), if self.inbound_open => match message {
                    Some(message) => self.on_worker_message(message),
                    None => {
                        tracing::warn!("All worker output channels closed");
                        self.inbound_open = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Dispatch { request, reply }) => self.dispatch(request, reply),
                    None => break,
                },
            }
        }

        // Dropping the replies answers the waiting handlers with 503.
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
        tracing::debug!("Dispatcher stopped");
    }

    fn dispatch(&mut self, request: InboundRequest, reply: oneshot::Sender<Response>) {
        let Some(index) = self.cursor.next_index(self.workers.len()) else {
            tracing::error!(path = %request.path, "No worker available");
            let _ = reply.send(response::no_worker());
            return;
        };

        let request_id = RequestId::generate();
        let envelope = RequestEnvelope::new(request_id.clone(), &request.method, request.path, request.headers);

        let timer = self.start_timer(request_id.clone());
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                reply,
                timer,
                worker: index,
                dispatched_at: Instant::now(),
            },
        );

        if let Err(e) = self.workers[index].try_send(envelope) {
            tracing::warn!(request_id = %request_id, worker = index, error = %e, "Dispatch refused");
            if let Some(pending) = self.pending.remove(&request_id) {
                pending.timer.abort();
                let _ = pending.reply.send(response::unavailable());
            }
            return;
        }

        tracing::debug!(request_id = %request_id, worker = index, "Request dispatched");
    }

    fn start_timer(&self, request_id: RequestId) -> JoinHandle<()> {
        let expired = self.expired_tx.clone();
        let deadline = self.deadline;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = expired.send(request_id);
        })
    }

    fn on_worker_message(&mut self, message: WorkerMessage) {
        let envelope = match decode_response(&message.line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(worker = message.worker, error = %e, "Discarding malformed worker message");
                return;
            }
        };

        let Some(pending) = self.pending.remove(&envelope.request_id) else {
            tracing::debug!(
                request_id = %envelope.request_id,
                worker = message.worker,
                "Discarding response for unknown or expired request"
            );
            return;
        };
        pending.timer.abort();

        let status = envelope.outcome.status();
        tracing::debug!(
            request_id = %envelope.request_id,
            worker = pending.worker,
            status,
            elapsed_ms = pending.dispatched_at.elapsed().as_millis() as u64,
            "Request completed"
        );
        if pending.reply.send(response::from_outcome(envelope.outcome)).is_err() {
            tracing::debug!(request_id = %envelope.request_id, "Client went away before the response");
        }
    }

    fn expire(&mut self, request_id: RequestId) {
        let Some(pending) = self.pending.remove(&request_id) else {
            return;
        };
        tracing::warn!(
            request_id = %request_id,
            worker = pending.worker,
            deadline = ?self.deadline,
            "Worker did not answer in time"
        );
        let _ = pending.reply.send(response::gateway_timeout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{encode_line, Outcome, ResponseEnvelope};
    use crate::lifecycle::Shutdown;
    use axum::http::StatusCode;

    struct FakeWorkers {
        handle: DispatcherHandle,
        queues: Vec<mpsc::Receiver<RequestEnvelope>>,
        inbound: mpsc::Sender<WorkerMessage>,
        shutdown: Shutdown,
    }

    fn start(count: usize) -> FakeWorkers {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let mut workers = Vec::new();
        let mut queues = Vec::new();
        for index in 0..count {
            let (tx, rx) = mpsc::channel(16);
            workers.push(WorkerHandle::new(index, tx));
            queues.push(rx);
        }

        let shutdown = Shutdown::new();
        let (dispatcher, handle) = Dispatcher::new(WorkerPool::from_parts(workers, inbound_rx));
        tokio::spawn(dispatcher.run(shutdown.subscribe()));

        FakeWorkers {
            handle,
            queues,
            inbound: inbound_tx,
            shutdown,
        }
    }

    fn get(path: &str) -> InboundRequest {
        InboundRequest {
            method: Method::GET,
            path: path.to_string(),
            headers: Headers::new(),
        }
    }

    fn ok_line(request_id: &RequestId, body: &str) -> String {
        let envelope = ResponseEnvelope::new(
            request_id.clone(),
            Outcome::Success {
                status: 200,
                headers: Headers::new(),
                data: body.as_bytes().to_vec(),
            },
        );
        encode_line(&envelope).unwrap()
    }

    async fn reply(fake: &FakeWorkers, worker: usize, line: String) {
        fake.inbound.send(WorkerMessage { worker, line }).await.unwrap();
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_requests_rotate_over_workers() {
        let mut fake = start(3);

        for i in 0..7usize {
            let handle = fake.handle.clone();
            let task = tokio::spawn(async move { handle.dispatch(get("/x")).await });

            let expected = i % 3;
            let envelope = fake.queues[expected].recv().await.unwrap();
            assert_eq!(envelope.method, "GET");
            assert_eq!(envelope.path, "/x");
            reply(&fake, expected, ok_line(&envelope.request_id, &format!("w{}", expected))).await;

            let response = task.await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, format!("w{}", expected));
        }
    }

    #[tokio::test]
    async fn test_empty_pool_answers_500() {
        let fake = start(0);
        let response = fake.handle.dispatch(get("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "no worker available");
    }

    #[tokio::test]
    async fn test_unknown_duplicate_and_malformed_messages_are_ignored() {
        let mut fake = start(1);

        reply(&fake, 0, ok_line(&RequestId::from("never-sent"), "x")).await;
        reply(&fake, 0, "not json".to_string()).await;
        reply(&fake, 0, r#"{"status":200,"data":""}"#.to_string()).await;

        let handle = fake.handle.clone();
        let task = tokio::spawn(async move { handle.dispatch(get("/a")).await });
        let envelope = fake.queues[0].recv().await.unwrap();
        reply(&fake, 0, ok_line(&envelope.request_id, "first")).await;
        reply(&fake, 0, ok_line(&envelope.request_id, "second")).await;
        assert_eq!(body_text(task.await.unwrap()).await, "first");

        // The dispatcher is still healthy after all of the above.
        let handle = fake.handle.clone();
        let task = tokio::spawn(async move { handle.dispatch(get("/b")).await });
        let envelope = fake.queues[0].recv().await.unwrap();
        reply(&fake, 0, ok_line(&envelope.request_id, "next")).await;
        assert_eq!(body_text(task.await.unwrap()).await, "next");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_times_out_at_deadline() {
        let mut fake = start(1);
        let started = Instant::now();

        let handle = fake.handle.clone();
        let mut task = tokio::spawn(async move { handle.dispatch(get("/hang")).await });
        let envelope = fake.queues[0].recv().await.unwrap();

        assert!(tokio::time::timeout(Duration::from_secs(29), &mut task).await.is_err());

        let response = task.await.unwrap();
        assert!(started.elapsed() >= DISPATCH_DEADLINE);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_text(response).await, "Gateway timeout");

        // A reply after the deadline changes nothing.
        reply(&fake, 0, ok_line(&envelope.request_id, "late")).await;

        let handle = fake.handle.clone();
        let task = tokio::spawn(async move { handle.dispatch(get("/after")).await });
        let envelope = fake.queues[0].recv().await.unwrap();
        reply(&fake, 0, ok_line(&envelope.request_id, "fresh")).await;
        assert_eq!(body_text(task.await.unwrap()).await, "fresh");
    }

    #[tokio::test]
    async fn test_closed_worker_queue_answers_503() {
        let mut fake = start(2);
        fake.queues.remove(1);

        let handle = fake.handle.clone();
        let task = tokio::spawn(async move { handle.dispatch(get("/one")).await });
        let envelope = fake.queues[0].recv().await.unwrap();
        reply(&fake, 0, ok_line(&envelope.request_id, "ok")).await;
        assert_eq!(task.await.unwrap().status(), StatusCode::OK);

        let response = fake.handle.dispatch(get("/two")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_answers_503() {
        let fake = start(1);
        fake.shutdown.trigger();
        tokio::task::yield_now().await;
        let response = fake.handle.dispatch(get("/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
