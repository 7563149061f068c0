use super::{ChatMessage, ChatRequest, ChatResponse, LlmError, StreamChunk};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<OpenAiErrorBody>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorBody,
}

#[derive(Deserialize)]
struct OpenAiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// Plain OpenAI request: messages passed through unchanged.
pub fn shape(request: &ChatRequest) -> OpenAiRequest {
    OpenAiRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        stream: request.stream,
        temperature: None,
        max_tokens: None,
    }
}

async fn send(
    client: &Client,
    config: &OpenAiConfig,
    body: &OpenAiRequest,
) -> Result<reqwest::Response, LlmError> {
    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
    tracing::debug!(%url, model = %body.model, messages = body.messages.len(), "Sending chat completion");

    let mut req = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(text);
        return Err(LlmError::Api { status, message });
    }

    Ok(resp)
}

pub async fn chat(
    client: &Client,
    config: &OpenAiConfig,
    body: &OpenAiRequest,
) -> Result<ChatResponse, LlmError> {
    let body = OpenAiRequest {
        stream: false,
        ..body.clone()
    };
    let resp = send(client, config, &body).await?;
    let status = resp.status().as_u16();

    let data: OpenAiResponse = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;
    let content = data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty());

    match (content, data.error) {
        (Some(content), _) => Ok(ChatResponse {
            content,
            model: body.model,
        }),
        (None, Some(error)) => Err(LlmError::Api {
            status,
            message: error.message.unwrap_or_else(|| "Unknown error".to_string()),
        }),
        (None, None) => Err(LlmError::Parse("Invalid response format from LLM".into())),
    }
}

pub async fn chat_stream(
    client: &Client,
    config: &OpenAiConfig,
    body: &OpenAiRequest,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let body = OpenAiRequest {
        stream: true,
        ..body.clone()
    };
    let resp = send(client, config, &body).await?;

    let mut full_content = String::new();
    let mut stream = resp.bytes_stream();
    let mut buffer = String::new();

    'read: while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer = buffer[pos + 1..].to_string();

            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    break 'read;
                }

                if let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(data) {
                    if let Some(choice) = parsed.choices.first() {
                        if let Some(content) = &choice.delta.content {
                            full_content.push_str(content);
                            on_chunk(StreamChunk {
                                delta: content.clone(),
                                done: false,
                            });
                        }
                        if choice.finish_reason.is_some() {
                            break 'read;
                        }
                    }
                }
            }
        }
    }

    if full_content.is_empty() {
        return Err(LlmError::Parse("Invalid response format from LLM".into()));
    }
    on_chunk(StreamChunk {
        delta: String::new(),
        done: true,
    });
    Ok(full_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, StreamEnd};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config(backend: &MockBackend) -> OpenAiConfig {
        OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: format!("{}/v1", backend.base_url),
        }
    }

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hello")],
            model: model.into(),
            stream: true,
        }
    }

    async fn collect_stream(
        backend: &MockBackend,
    ) -> (Result<String, LlmError>, Vec<StreamChunk>) {
        let client = crate::http_client(Duration::from_secs(5)).unwrap();
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let result = chat_stream(&client, &config(backend), &shape(&request("gpt-4")), move |c| {
            sink.lock().unwrap().push(c)
        })
        .await;
        let chunks = chunks.lock().unwrap().clone();
        (result, chunks)
    }

    #[tokio::test]
    async fn test_chat_unwraps_first_choice() {
        let backend = MockBackend::start().await;
        let client = crate::http_client(Duration::from_secs(5)).unwrap();
        let response = chat(&client, &config(&backend), &shape(&request("gpt-4")))
            .await
            .unwrap();
        assert_eq!(response.content, "gpt-4 replied to 1 messages");

        // Non-streaming call always sends stream=false.
        let sent = backend.state.llm_requests.lock().unwrap()[0].clone();
        assert_eq!(sent["stream"], false);
        assert!(sent.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_stream_delivers_chunks_in_order_until_finish_reason() {
        let backend = MockBackend::start().await;
        let (result, chunks) = collect_stream(&backend).await;

        let content = result.unwrap();
        assert_eq!(content, "gpt-4 replied to 1 messages");
        let deltas: Vec<&str> = chunks
            .iter()
            .filter(|c| !c.done)
            .map(|c| c.delta.as_str())
            .collect();
        assert_eq!(deltas, vec!["gpt-4 ", "replied ", "to ", "1 ", "messages"]);
        assert!(chunks.last().unwrap().done);
        assert_eq!(chunks.iter().filter(|c| c.done).count(), 1);

        let sent = backend.state.llm_requests.lock().unwrap()[0].clone();
        assert_eq!(sent["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_stops_at_done_marker() {
        let backend = MockBackend::start().await;
        *backend.state.stream_end.lock().unwrap() = StreamEnd::Done;

        let (result, chunks) = collect_stream(&backend).await;
        assert_eq!(result.unwrap(), "gpt-4 replied to 1 messages");
        assert!(chunks.iter().all(|c| !c.delta.contains("trailing")));
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_error() {
        let backend = MockBackend::start().await;
        *backend.state.stream_end.lock().unwrap() = StreamEnd::Empty;

        let (result, chunks) = collect_stream(&backend).await;
        assert!(matches!(
            result,
            Err(LlmError::Parse(ref msg)) if msg == "Invalid response format from LLM"
        ));
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_error_in_success_body_is_surfaced() {
        let backend = MockBackend::start().await;
        *backend.state.llm_failure.lock().unwrap() =
            Some((200, json!({ "error": { "message": "Insufficient Balance" } })));
        let client = crate::http_client(Duration::from_secs(5)).unwrap();

        let shaped = crate::llm::deepseek::shape(&request("deepseek-chat"));
        let err = chat(&client, &config(&backend), &shaped).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Api { status: 200, ref message } if message == "Insufficient Balance"
        ));
    }

    #[tokio::test]
    async fn test_error_envelope_on_failed_status() {
        let backend = MockBackend::start().await;
        *backend.state.llm_failure.lock().unwrap() =
            Some((401, json!({ "error": { "message": "Invalid API key" } })));
        let client = crate::http_client(Duration::from_secs(5)).unwrap();

        let err = chat(&client, &config(&backend), &shape(&request("gpt-4")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Api { status: 401, ref message } if message == "Invalid API key"
        ));
    }
}
