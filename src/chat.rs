//! Chat dispatch: routes a conversation either to a stateless model or to a
//! RAGFlow agent, and keeps agent sessions alive across calls.

use crate::config::Settings;
use crate::llm::ollama::OllamaConfig;
use crate::llm::openai::OpenAiConfig;
use crate::llm::{self, ChatMessage, ChatRequest, LlmError, Provider, ProviderKind, Role, StreamChunk};
use crate::ragflow::{RagflowClient, RagflowError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CONTEXT_PREAMBLE: &str = "Answer the user's question based on the following content:";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Invalid messages: no user question found")]
    NoUserQuestion,
    #[error("{0} API key not configured")]
    MissingKey(&'static str),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Ragflow(#[from] RagflowError),
}

impl ChatError {
    /// Backend rejections that mention the session. The stored session id
    /// should not be sent again after one of these.
    pub fn is_session_error(&self) -> bool {
        match self {
            ChatError::Ragflow(RagflowError::Api { message, .. }) => {
                message.to_lowercase().contains("session")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParams {
    pub messages: Vec<ChatMessage>,
    /// Stateless model id or agent id.
    pub target: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    /// Agent session to pass back on the next call; `None` for stateless models.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Target {
    Model { provider: Provider, model: String },
    Agent(String),
}

pub struct ChatDispatcher {
    http: Client,
    settings: Settings,
    ragflow: RagflowClient,
}

impl ChatDispatcher {
    pub fn new(settings: Settings, ragflow: RagflowClient) -> Result<Self, LlmError> {
        let http = crate::http_client(settings.request_timeout)?;
        Ok(Self {
            http,
            settings,
            ragflow,
        })
    }

    /// Known model ids resolve to their provider; everything else is an agent.
    pub fn resolve(&self, target: &str) -> Result<Target, ChatError> {
        let Some(known) = llm::find_model(target) else {
            return Ok(Target::Agent(target.to_string()));
        };

        let provider = match known.kind {
            ProviderKind::OpenAi => Provider::OpenAi(OpenAiConfig {
                api_key: self
                    .settings
                    .openai_api_key
                    .clone()
                    .ok_or(ChatError::MissingKey("OpenAI"))?,
                base_url: self.settings.openai_base_url.clone(),
            }),
            ProviderKind::DeepSeek => Provider::DeepSeek(OpenAiConfig {
                api_key: self
                    .settings
                    .deepseek_api_key
                    .clone()
                    .ok_or(ChatError::MissingKey("DeepSeek"))?,
                base_url: self.settings.deepseek_base_url.clone(),
            }),
            ProviderKind::Ollama => Provider::Ollama(OllamaConfig {
                host: self.settings.ollama_host.clone(),
            }),
        };
        let model = known
            .upstream
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.ollama_model.clone());

        Ok(Target::Model { provider, model })
    }

    pub async fn dispatch(&self, params: &ChatParams) -> Result<ChatReply, ChatError> {
        if params.messages.is_empty() {
            return Err(ChatError::NoUserQuestion);
        }
        match self.resolve(&params.target)? {
            Target::Model { provider, model } => {
                let request = self.model_request(params, model);
                let response = provider.chat(&self.http, &request).await?;
                Ok(ChatReply {
                    content: response.content,
                    model: params.target.clone(),
                    session_id: None,
                })
            }
            Target::Agent(agent_id) => self.chat_with_agent(&agent_id, params).await,
        }
    }

    /// Streams stateless model output chunk by chunk. Agents answer in one
    /// piece, delivered as a single chunk.
    pub async fn dispatch_stream(
        &self,
        params: &ChatParams,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<ChatReply, ChatError> {
        if params.messages.is_empty() {
            return Err(ChatError::NoUserQuestion);
        }
        match self.resolve(&params.target)? {
            Target::Model { provider, model } => {
                let request = self.model_request(params, model);
                let content = provider.chat_stream(&self.http, &request, on_chunk).await?;
                Ok(ChatReply {
                    content,
                    model: params.target.clone(),
                    session_id: None,
                })
            }
            Target::Agent(agent_id) => {
                let reply = self.chat_with_agent(&agent_id, params).await?;
                on_chunk(StreamChunk {
                    delta: reply.content.clone(),
                    done: false,
                });
                on_chunk(StreamChunk {
                    delta: String::new(),
                    done: true,
                });
                Ok(reply)
            }
        }
    }

    fn model_request(&self, params: &ChatParams, model: String) -> ChatRequest {
        ChatRequest {
            messages: with_context(&params.messages, params.context.as_deref()),
            model,
            stream: false,
        }
    }

    async fn chat_with_agent(
        &self,
        agent_id: &str,
        params: &ChatParams,
    ) -> Result<ChatReply, ChatError> {
        let question = params
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .ok_or(ChatError::NoUserQuestion)?;
        let context = params.context.as_deref().filter(|c| !c.trim().is_empty());

        let mut session_id = params.session_id.clone();
        let mut retried = false;
        loop {
            let current = match session_id.take() {
                Some(id) => id,
                None => self.ragflow.create_session(agent_id).await?.id,
            };

            match self
                .ragflow
                .agent_completion(agent_id, question, context, &current)
                .await
            {
                Ok(answer) => {
                    return Ok(ChatReply {
                        content: answer.answer,
                        model: answer.model.unwrap_or_else(|| "unknown".to_string()),
                        session_id: Some(current),
                    })
                }
                Err(e) if e.is_session_not_owned() && !retried => {
                    tracing::warn!(agent_id, session_id = %current, "Session rejected, retrying with a new session");
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Prepends one system message carrying the context, when there is any.
pub fn with_context(messages: &[ChatMessage], context: Option<&str>) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        out.push(ChatMessage::system(format!("{}\n\n{}", CONTEXT_PREAMBLE, context)));
    }
    out.extend(messages.iter().cloned());
    out
}
