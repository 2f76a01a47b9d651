//! HTTP intake for task submissions
//!
//! # Protocol
//! - GET / - Health check
//! - POST /api/task - Submit a task round as JSON
//!
//! A submission is authenticated against the shared secret before any other
//! field is looked at, acknowledged immediately, and handed to the task queue.
//! Bodies larger than the configured limit are refused with 413. Processing results are never
//! returned to the caller; they go to the submission's evaluation URL.
//!
//! # Example POST /api/task payload:
//! ```json
//! {
//!   "secret": "...",
//!   "task": "captcha-solver",
//!   "round": 1,
//!   "brief": "Create a page that solves the captcha in ?url=",
//!   "attachments": [{"name": "sample.png", "url": "data:image/png;base64,..."}],
//!   "checks": ["Repo has MIT license"],
//!   "evaluation_url": "https://example.com/notify",
//!   "email": "student@example.com",
//!   "nonce": "ab12"
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use pagewright_core::workflow::{Acknowledgement, QueueHandle, TaskSubmission};
use pagewright_core::Error;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

/// Default cap on a submission body
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// What request handlers need
#[derive(Debug)]
pub struct IntakeState {
    secret: String,
    queue: QueueHandle,
    max_body_bytes: usize,
}

impl IntakeState {
    pub fn new(secret: impl Into<String>, queue: QueueHandle) -> Self {
        Self {
            secret: secret.into(),
            queue,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Refuse bodies longer than `bytes`
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

/// Collect the body, stopping as soon as it exceeds `limit`
///
/// A declared length over the limit is refused before any data is read.
async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, BodyError> {
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge);
    }

    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Serve on `listener` until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    state: Arc<IntakeState>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle_request(req, Arc::clone(&state))
            }))
        }
    });

    let server = Server::from_tcp(listener)?.serve(make_svc);
    let addr: SocketAddr = server.local_addr();
    info!(addr = %addr, "Intake listening");

    server.with_graceful_shutdown(shutdown).await?;
    info!("Intake stopped");
    Ok(())
}

/// Route one request
pub async fn handle_request(
    req: Request<Body>,
    state: Arc<IntakeState>,
) -> Result<Response<Body>, Infallible> {
    debug!(method = %req.method(), path = req.uri().path(), "HTTP request");

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => json_response(
            StatusCode::OK,
            &json!({"message": "Hello! Everything's Okay"}),
        ),
        (&Method::POST, "/api/task") => handle_task(req, &state).await,
        _ => json_response(StatusCode::NOT_FOUND, &json!({"error": "not_found"})),
    };

    Ok(response)
}

async fn handle_task(req: Request<Body>, state: &IntakeState) -> Response<Body> {
    let body = match read_body(req.into_body(), state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            warn!(limit = state.max_body_bytes, "Rejected oversized task submission");
            return json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({"error": "payload_too_large"}),
            );
        }
        Err(BodyError::Read(e)) => {
            warn!(error = %e, "Failed to read request body");
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": "invalid_body", "message": e.to_string()}),
            );
        }
    };

    // only malformed JSON fails here; field shapes are settled after the secret check
    let submission: TaskSubmission = match serde_json::from_slice(&body) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to parse task submission");
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": "invalid_json", "message": e.to_string()}),
            );
        }
    };

    let event = match submission.authenticate(&state.secret) {
        Ok(event) => event,
        Err(Error::Auth) => {
            warn!("Rejected task submission with invalid secret");
            return json_response(StatusCode::FORBIDDEN, &json!({"error": "Invalid secret"}));
        }
        Err(e) => {
            return json_response(StatusCode::BAD_REQUEST, &json!({"error": e.to_string()}));
        }
    };

    let ack = Acknowledgement::received(&event);
    match state.queue.submit(event) {
        Ok(()) => {
            info!(task = %ack.task, round = ack.round, "Task received");
            json_response(StatusCode::OK, &ack)
        }
        Err(e) => {
            error!(task = %ack.task, round = ack.round, error = %e, "Task not queued");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &json!({"error": e.to_string()}),
            )
        }
    }
}

fn json_response(status: StatusCode, value: &impl Serialize) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
