//! Mock analysis backend for integration tests

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use swiftora::{AnalysisClient, ClientSettings};

/// One part of a multipart body as the backend received it.
#[derive(Debug, Clone)]
pub struct RecordedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RecordedPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// What the mock answers to `POST /analyze`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
    /// Send the body in small chunks without a `Content-Length`.
    pub streamed: bool,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
            delay: Duration::ZERO,
            streamed: false,
        }
    }

    pub fn status(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
            streamed: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<RecordedPart>>>>,
    comps_queries: Arc<Mutex<Vec<Option<String>>>>,
}

/// A running mock backend bound to an ephemeral local port.
pub struct MockBackend {
    pub base_url: String,
    state: MockState,
}

impl MockBackend {
    pub async fn start(reply: Reply) -> Self {
        let state = MockState {
            reply,
            hits: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            comps_queries: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/analyze", post(analyze))
            .route("/healthz", get(|| async { r#"{"status":"OK"}"# }))
            .route("/comps", get(comps))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self) -> AnalysisClient {
        AnalysisClient::new(ClientSettings::new(&self.base_url)).unwrap()
    }

    pub fn client_with(&self, configure: impl FnOnce(&mut ClientSettings)) -> AnalysisClient {
        let mut settings = ClientSettings::new(&self.base_url);
        configure(&mut settings);
        AnalysisClient::new(settings).unwrap()
    }

    /// Number of `/analyze` requests received.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<RecordedPart>> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Vec<RecordedPart> {
        self.requests().pop().expect("no /analyze request received")
    }

    pub fn comps_queries(&self) -> Vec<Option<String>> {
        self.state.comps_queries.lock().unwrap().clone()
    }
}

async fn analyze(State(state): State<MockState>, mut multipart: Multipart) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        parts.push(RecordedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    state.requests.lock().unwrap().push(parts);

    tokio::time::sleep(state.reply.delay).await;
    let body = if state.reply.streamed {
        let chunks: Vec<Result<Vec<u8>, Infallible>> = state
            .reply
            .body
            .as_bytes()
            .chunks(64)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Body::from_stream(futures::stream::iter(chunks))
    } else {
        Body::from(state.reply.body.clone())
    };
    (
        state.reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

async fn comps(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let query = params.get("q").cloned();
    state.comps_queries.lock().unwrap().push(query.clone());

    let all = crate::fixtures::seed_comps();
    let filtered: Vec<_> = match query {
        Some(q) => {
            let q = q.to_lowercase();
            all.into_iter()
                .filter(|c| c["title"].as_str().unwrap_or_default().to_lowercase().contains(&q))
                .collect()
        }
        None => all,
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&filtered).unwrap(),
    )
}

/// A backend that accepts connections, reads requests and never answers.
pub struct SilentBackend {
    pub base_url: String,
    accepted: Arc<AtomicUsize>,
    closed: tokio::sync::mpsc::UnboundedReceiver<()>,
}

impl SilentBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (closed_tx, closed) = tokio::sync::mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let closed_tx = closed_tx.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    // EOF means the client hung up.
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                    let _ = closed_tx.send(());
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            accepted,
            closed,
        }
    }

    pub fn client(&self) -> AnalysisClient {
        AnalysisClient::new(ClientSettings::new(&self.base_url)).unwrap()
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until the client closes one connection.
    pub async fn wait_for_close(&mut self, within: Duration) -> bool {
        matches!(tokio::time::timeout(within, self.closed.recv()).await, Ok(Some(())))
    }
}

/// A base URL on which nothing is listening.
pub fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
