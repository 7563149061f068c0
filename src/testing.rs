//! In-process stand-in for the RAGFlow, OpenAI-compatible and Ollama
//! endpoints, used by the unit tests.

use crate::config::Settings;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// How a streamed chat completion ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamEnd {
    /// A `finish_reason` chunk, then more content that must be ignored.
    #[default]
    FinishReason,
    /// Only the `[DONE]` marker, followed by content that must be ignored.
    Done,
    /// `[DONE]` with no content at all.
    Empty,
}

#[derive(Default)]
pub struct MockState {
    pub hits: AtomicUsize,
    next_id: AtomicUsize,
    pub datasets: Mutex<Vec<Value>>,
    /// (dataset id, document)
    pub documents: Mutex<Vec<(String, Value)>>,
    pub parse_requests: Mutex<Vec<Value>>,
    pub sessions: Mutex<Vec<String>>,
    pub completion_requests: Mutex<Vec<Value>>,
    /// Answer every agent completion with the "session not owned" code.
    pub reject_sessions: AtomicBool,
    pub llm_requests: Mutex<Vec<Value>>,
    /// Answer chat completions with this status and body instead.
    pub llm_failure: Mutex<Option<(u16, Value)>>,
    pub stream_end: Mutex<StreamEnd>,
    pub ollama_requests: Mutex<Vec<Value>>,
    /// Make the Ollama endpoint answer 502.
    pub ollama_down: AtomicBool,
}

impl MockState {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(
                "/api/v1/datasets",
                get(list_datasets).post(create_dataset).delete(delete_datasets),
            )
            .route(
                "/api/v1/datasets/{dataset_id}/documents",
                get(list_documents)
                    .post(upload_document)
                    .delete(delete_documents),
            )
            .route("/api/v1/datasets/{dataset_id}/chunks", post(parse_documents))
            .route("/api/v1/agents", get(list_agents))
            .route("/api/v1/agents/{agent_id}/sessions", post(create_session))
            .route("/api/v1/agents/{agent_id}/completions", post(agent_completion))
            .route("/api/v1/retrieval", post(retrieval))
            .route("/api/v1/summarize", post(summarize))
            .route("/api/v1/translate", post(translate))
            .route("/v1/chat/completions", post(openai_chat))
            .route("/api/chat", post(ollama_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    /// Settings pointing every backend at this mock, with all keys set.
    pub fn settings(&self) -> Settings {
        Settings {
            ragflow_base_url: format!("{}/api/v1", self.base_url),
            ragflow_api_key: Some("ragflow-test-key".into()),
            openai_api_key: Some("openai-test-key".into()),
            openai_base_url: format!("{}/v1", self.base_url),
            deepseek_api_key: Some("deepseek-test-key".into()),
            deepseek_base_url: format!("{}/v1", self.base_url),
            ollama_host: self.base_url.clone(),
            ..Settings::default()
        }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn seed_dataset(&self, id: &str, name: &str) {
        self.state
            .datasets
            .lock()
            .unwrap()
            .push(json!({ "id": id, "name": name, "document_count": 0 }));
    }

    pub fn seed_document(&self, dataset_id: &str, id: &str, run: &str) {
        self.state.documents.lock().unwrap().push((
            dataset_id.to_string(),
            json!({ "id": id, "name": format!("{}.txt", id), "size": 4, "run": run }),
        ));
    }

    pub fn set_document_run(&self, id: &str, run: &str) {
        let mut docs = self.state.documents.lock().unwrap();
        for (_, doc) in docs.iter_mut() {
            if doc["id"] == id {
                doc["run"] = json!(run);
            }
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Shared = State<Arc<MockState>>;

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "code": 0, "data": data }))
}

fn id_list(body: &Value, field: &str) -> Vec<String> {
    body[field]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn list_datasets(State(state): Shared) -> Json<Value> {
    state.hit();
    let datasets = state.datasets.lock().unwrap().clone();
    ok(Value::Array(datasets))
}

async fn create_dataset(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    let Some(name) = body["name"].as_str() else {
        return Json(json!({ "code": 101, "message": "`name` is required" }));
    };
    let dataset = json!({
        "id": state.next_id("ds"),
        "name": name,
        "description": body["description"],
        "document_count": 0
    });
    state.datasets.lock().unwrap().push(dataset.clone());
    ok(dataset)
}

async fn delete_datasets(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    let ids = id_list(&body, "ids");
    state
        .datasets
        .lock()
        .unwrap()
        .retain(|ds| !ids.iter().any(|id| ds["id"] == id.as_str()));
    Json(json!({ "code": 0 }))
}

async fn list_documents(State(state): Shared, Path(dataset_id): Path<String>) -> Json<Value> {
    state.hit();
    let docs: Vec<Value> = state
        .documents
        .lock()
        .unwrap()
        .iter()
        .filter(|(ds, _)| *ds == dataset_id)
        .map(|(_, doc)| doc.clone())
        .collect();
    let total = docs.len();
    ok(json!({ "docs": docs, "total": total }))
}

async fn upload_document(
    State(state): Shared,
    Path(dataset_id): Path<String>,
    mut multipart: Multipart,
) -> Json<Value> {
    state.hit();
    let mut uploaded = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.file_name().unwrap_or("unnamed").to_string();
        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        let doc = json!({
            "id": state.next_id("doc"),
            "name": name,
            "size": size,
            "run": "UNSTART"
        });
        state
            .documents
            .lock()
            .unwrap()
            .push((dataset_id.clone(), doc.clone()));
        uploaded.push(doc);
    }
    ok(Value::Array(uploaded))
}

async fn delete_documents(
    State(state): Shared,
    Path(dataset_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.hit();
    let ids = id_list(&body, "ids");
    state
        .documents
        .lock()
        .unwrap()
        .retain(|(ds, doc)| *ds != dataset_id || !ids.iter().any(|id| doc["id"] == id.as_str()));
    Json(json!({ "code": 0 }))
}

async fn parse_documents(
    State(state): Shared,
    Path(dataset_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.hit();
    state
        .parse_requests
        .lock()
        .unwrap()
        .push(json!({ "dataset_id": dataset_id, "document_ids": body["document_ids"] }));
    Json(json!({ "code": 0 }))
}

async fn list_agents(State(state): Shared) -> Json<Value> {
    state.hit();
    ok(json!([
        { "id": "agent-1", "title": "Research assistant", "description": null },
        { "id": "agent-2", "title": "Support bot" }
    ]))
}

async fn create_session(State(state): Shared, Path(_agent_id): Path<String>) -> Json<Value> {
    state.hit();
    let id = state.next_id("session");
    state.sessions.lock().unwrap().push(id.clone());
    ok(json!({ "id": id }))
}

async fn agent_completion(
    State(state): Shared,
    Path(agent_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.hit();
    state.completion_requests.lock().unwrap().push(body.clone());

    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    let owned = state.sessions.lock().unwrap().contains(&session_id);
    if !owned || state.reject_sessions.load(Ordering::SeqCst) {
        return Json(json!({
            "code": 102,
            "message": format!("You don't own the session {}", session_id)
        }));
    }

    let question = body["question"].as_str().unwrap_or_default();
    ok(json!({
        "answer": format!("{} says: {}", agent_id, question),
        "session_id": session_id
    }))
}

async fn retrieval(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    let question = body["question"].as_str().unwrap_or_default();
    ok(json!({
        "chunks": [
            {
                "id": "chunk-1",
                "content": format!("passage about {}", question),
                "document_id": "doc-1",
                "document_keyword": "manual.pdf",
                "similarity": 0.87
            }
        ],
        "total": 1
    }))
}

async fn summarize(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    let text = body["text"].as_str().unwrap_or_default();
    let summary: String = text.chars().take(10).collect();
    ok(json!({ "summary": summary }))
}

async fn translate(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    let text = body["text"].as_str().unwrap_or_default();
    let lang = body["target_lang"].as_str().unwrap_or("zh");
    ok(json!({ "translation": format!("[{}] {}", lang, text) }))
}

async fn openai_chat(State(state): Shared, Json(body): Json<Value>) -> Response {
    state.hit();
    state.llm_requests.lock().unwrap().push(body.clone());

    let failure = state.llm_failure.lock().unwrap().clone();
    if let Some((status, failure)) = failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(failure)).into_response();
    }

    let count = body["messages"].as_array().map(Vec::len).unwrap_or(0);
    let reply = format!(
        "{} replied to {} messages",
        body["model"].as_str().unwrap_or_default(),
        count
    );

    if body["stream"] == true {
        let end = *state.stream_end.lock().unwrap();
        return (
            [(header::CONTENT_TYPE, "text/event-stream")],
            sse_body(&reply, end),
        )
            .into_response();
    }

    Json(json!({
        "choices": [
            { "message": { "role": "assistant", "content": reply } }
        ]
    }))
    .into_response()
}

fn sse_event(content: Option<&str>, finish_reason: Option<&str>) -> String {
    let delta = match content {
        Some(content) => json!({ "content": content }),
        None => json!({}),
    };
    let chunk = json!({ "choices": [{ "delta": delta, "finish_reason": finish_reason }] });
    format!("data: {}\n\n", chunk)
}

fn sse_body(reply: &str, end: StreamEnd) -> String {
    let mut out = String::new();
    if end != StreamEnd::Empty {
        for piece in reply.split_inclusive(' ') {
            out.push_str(&sse_event(Some(piece), None));
        }
    }
    match end {
        StreamEnd::FinishReason => {
            out.push_str(&sse_event(None, Some("stop")));
            out.push_str(&sse_event(Some(" trailing"), None));
            out.push_str("data: [DONE]\n\n");
        }
        StreamEnd::Done => {
            out.push_str("data: [DONE]\n\n");
            out.push_str(&sse_event(Some(" trailing"), None));
        }
        StreamEnd::Empty => out.push_str("data: [DONE]\n\n"),
    }
    out
}

async fn ollama_chat(State(state): Shared, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.hit();
    if state.ollama_down.load(Ordering::SeqCst) {
        return (StatusCode::BAD_GATEWAY, Json(json!({ "error": "bad gateway" })));
    }
    state.ollama_requests.lock().unwrap().push(body.clone());
    (
        StatusCode::OK,
        Json(json!({
            "model": body["model"],
            "message": { "role": "assistant", "content": "local reply" },
            "done": true
        })),
    )
}
