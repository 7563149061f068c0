use super::{ChatMessage, ChatRequest, ChatResponse, LlmError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

pub async fn chat(
    client: &Client,
    config: &OllamaConfig,
    request: &ChatRequest,
) -> Result<ChatResponse, LlmError> {
    let url = format!("{}/api/chat", config.host.trim_end_matches('/'));
    tracing::debug!(%url, model = %request.model, "Sending Ollama chat");

    let body = OllamaRequest {
        model: &request.model,
        messages: &request.messages,
        stream: false,
        options: OllamaOptions {
            temperature: 0.7,
            num_predict: 2000,
        },
    };

    let resp = client.post(url).json(&body).send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: describe_failure(status, &text, &request.model),
        });
    }

    let data: OllamaResponse = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;
    let content = data
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LlmError::Parse("Invalid response format from LLM".into()))?;

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
    })
}

fn describe_failure(status: u16, body: &str, model: &str) -> String {
    match status {
        502 => "Ollama service is not running, start it with `ollama serve`".to_string(),
        404 if body.contains("not found, try pulling") => {
            format!("Model {} is not installed, run: ollama pull {}", model, model)
        }
        _ => body.to_string(),
    }
}
