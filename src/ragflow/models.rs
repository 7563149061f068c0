use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote knowledge-base collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "doc_num")]
    pub document_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Parsing,
    Finished,
    Failed,
    Stopped,
}

impl DocumentStatus {
    /// Maps both the word statuses and RAGFlow's run states onto one set.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parsing" | "running" | "1" => DocumentStatus::Parsing,
            "finished" | "done" | "3" => DocumentStatus::Finished,
            "failed" | "fail" | "4" => DocumentStatus::Failed,
            "stopped" | "cancel" | "2" => DocumentStatus::Stopped,
            _ => DocumentStatus::Pending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "waiting to parse",
            DocumentStatus::Parsing => "parsing",
            DocumentStatus::Finished => "finished",
            DocumentStatus::Failed => "parse failed",
            DocumentStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(from = "RawDocument")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub status: DocumentStatus,
    /// Parse progress as a fraction in `0.0..=1.0`.
    pub progress: f64,
    pub chunk_count: u64,
    pub create_date: Option<String>,
}

// Upstream documents carry the parse state either in `run` (RAGFlow) or in
// `status`; `run` wins because RAGFlow also uses `status` for "enabled".
#[derive(Deserialize)]
struct RawDocument {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    parse_progress: Option<f64>,
    #[serde(default)]
    chunk_count: u64,
    #[serde(default)]
    create_date: Option<String>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let status_text = raw.run.or_else(|| match raw.status {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });
        let status = status_text
            .as_deref()
            .map(DocumentStatus::from_upstream)
            .unwrap_or(DocumentStatus::Pending);
        let progress = raw
            .progress
            .or_else(|| raw.parse_progress.map(|p| p / 100.0))
            .unwrap_or(if status == DocumentStatus::Finished { 1.0 } else { 0.0 })
            .clamp(0.0, 1.0);

        Document {
            id: raw.id,
            name: raw.name,
            size: raw.size,
            status,
            progress,
            chunk_count: raw.chunk_count,
            create_date: raw.create_date,
        }
    }
}

/// Document listings come back either as a bare array or wrapped in `docs`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum DocumentPage {
    Paged { docs: Vec<Document> },
    List(Vec<Document>),
}

impl DocumentPage {
    pub(crate) fn into_documents(self) -> Vec<Document> {
        match self {
            DocumentPage::Paged { docs } => docs,
            DocumentPage::List(docs) => docs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetrievalHit {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default, alias = "document_keyword", alias = "document_title")]
    pub document_name: Option<String>,
    #[serde(default)]
    pub similarity: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RetrievalPage {
    Chunks { chunks: Vec<RetrievalHit> },
    List(Vec<RetrievalHit>),
}

impl RetrievalPage {
    pub(crate) fn into_hits(self) -> Vec<RetrievalHit> {
        match self {
            RetrievalPage::Chunks { chunks } => chunks,
            RetrievalPage::List(hits) => hits,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Agent {
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AgentSession {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentAnswer {
    pub answer: String,
    #[serde(default)]
    pub model: Option<String>,
}
