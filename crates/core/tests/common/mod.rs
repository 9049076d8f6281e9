//! In-process fake of the HTTP processing service.
//!
//! Binds an axum router to an ephemeral port and records every multipart
//! request so tests can assert on the exact wire fields.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use clipforge_core::RemoteConfig;

/// One multipart field as received by the fake service.
#[derive(Debug, Clone)]
pub struct RecordedField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl RecordedField {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: &'static str,
    pub fields: Vec<RecordedField>,
}

impl RecordedRequest {
    pub fn fields_named(&self, name: &str) -> Vec<&RecordedField> {
        self.fields.iter().filter(|f| f.name == name).collect()
    }
}

#[derive(Default)]
struct ServiceState {
    requests: Mutex<Vec<RecordedRequest>>,
    /// Non-zero forces this status on every response.
    fail_status: AtomicU16,
}

/// Handle to a running fake service.
pub struct FakeService {
    pub addr: SocketAddr,
    state: Arc<ServiceState>,
}

impl FakeService {
    pub async fn start() -> Self {
        let state = Arc::new(ServiceState::default());
        let app = Router::new()
            .route("/videos/merge", post(merge))
            .route("/videos/trim", post(trim))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake service");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake service crashed");
        });

        Self { addr, state }
    }

    pub fn config(&self) -> RemoteConfig {
        RemoteConfig::new(format!("http://{}", self.addr))
    }

    /// Answer every following request with `status`.
    pub fn fail_with(&self, status: StatusCode) {
        self.state.fail_status.store(status.as_u16(), Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.state.fail_status.store(0, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn read_fields(mut multipart: Multipart) -> Vec<RecordedField> {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("Malformed multipart") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.expect("Unreadable field").to_vec();
        fields.push(RecordedField {
            name,
            file_name,
            content_type,
            data,
        });
    }
    fields
}

fn respond(state: &ServiceState, path: &'static str, fields: Vec<RecordedField>, body: Vec<u8>) -> Response {
    state
        .requests
        .lock()
        .unwrap()
        .push(RecordedRequest { path, fields });

    match state.fail_status.load(Ordering::SeqCst) {
        0 => (StatusCode::OK, [(header::CONTENT_TYPE, "video/mp4")], body).into_response(),
        code => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "ffmpeg exited with status 1").into_response()
        }
    }
}

async fn merge(State(state): State<Arc<ServiceState>>, multipart: Multipart) -> Response {
    let fields = read_fields(multipart).await;
    let body = fields
        .iter()
        .filter(|f| f.name == "videos")
        .flat_map(|f| f.data.iter().copied())
        .collect();
    respond(&state, "/videos/merge", fields, body)
}

async fn trim(State(state): State<Arc<ServiceState>>, multipart: Multipart) -> Response {
    let fields = read_fields(multipart).await;
    let body = fields
        .iter()
        .find(|f| f.name == "video")
        .map(|f| f.data.clone())
        .unwrap_or_default();
    respond(&state, "/videos/trim", fields, body)
}
