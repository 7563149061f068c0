pub mod deepseek;
pub mod ollama;
pub mod openai;

use crate::config::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Ollama,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Ollama => "Ollama",
        }
    }
}

/// A stateless chat model the client knows how to reach.
pub struct KnownModel {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: ProviderKind,
    /// Model name sent upstream; `None` means "use the configured Ollama model".
    pub upstream: Option<&'static str>,
    pub description: &'static str,
}

pub const KNOWN_MODELS: &[KnownModel] = &[
    KnownModel {
        id: "deepseek-chat",
        name: "DeepSeek Chat V3",
        kind: ProviderKind::DeepSeek,
        upstream: Some("deepseek-chat"),
        description: "DeepSeek-V3 general purpose assistant",
    },
    KnownModel {
        id: "deepseek-reasoner",
        name: "DeepSeek Reasoner R1",
        kind: ProviderKind::DeepSeek,
        upstream: Some("deepseek-reasoner"),
        description: "DeepSeek-R1 reasoning assistant",
    },
    KnownModel {
        id: "gpt4",
        name: "GPT-4",
        kind: ProviderKind::OpenAi,
        upstream: Some("gpt-4"),
        description: "OpenAI GPT-4",
    },
    KnownModel {
        id: "qwen",
        name: "Qwen 2.5",
        kind: ProviderKind::Ollama,
        upstream: None,
        description: "Local Qwen 2.5 served by Ollama",
    },
];

pub fn find_model(id: &str) -> Option<&'static KnownModel> {
    KNOWN_MODELS.iter().find(|m| m.id == id)
}

/// Models usable with the current settings. Ollama is local and always listed.
pub fn available_models(settings: &Settings) -> Vec<ModelInfo> {
    KNOWN_MODELS
        .iter()
        .filter(|m| match m.kind {
            ProviderKind::DeepSeek => settings.deepseek_api_key.is_some(),
            ProviderKind::OpenAi => settings.openai_api_key.is_some(),
            ProviderKind::Ollama => true,
        })
        .map(|m| ModelInfo {
            id: m.id.to_string(),
            name: m.name.to_string(),
            provider: m.kind.label().to_string(),
            description: m.description.to_string(),
        })
        .collect()
}

/// Unified LLM provider enum: dispatches to OpenAI-compatible or Ollama backends.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(openai::OpenAiConfig),
    DeepSeek(openai::OpenAiConfig),
    Ollama(ollama::OllamaConfig),
}

impl Provider {
    pub async fn chat(&self, client: &Client, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self {
            Provider::OpenAi(config) => openai::chat(client, config, &openai::shape(request)).await,
            Provider::DeepSeek(config) => {
                openai::chat(client, config, &deepseek::shape(request)).await
            }
            Provider::Ollama(config) => ollama::chat(client, config, request).await,
        }
    }

    pub async fn chat_stream(
        &self,
        client: &Client,
        request: &ChatRequest,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<String, LlmError> {
        match self {
            Provider::OpenAi(config) => {
                openai::chat_stream(client, config, &openai::shape(request), on_chunk).await
            }
            Provider::DeepSeek(config) => {
                openai::chat_stream(client, config, &deepseek::shape(request), on_chunk).await
            }
            Provider::Ollama(config) => {
                let response = ollama::chat(client, config, request).await?;
                on_chunk(StreamChunk {
                    delta: response.content.clone(),
                    done: false,
                });
                on_chunk(StreamChunk {
                    delta: String::new(),
                    done: true,
                });
                Ok(response.content)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}
