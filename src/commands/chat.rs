use super::AppState;
use crate::chat::{ChatError, ChatParams, ChatReply};
use crate::conversation::Conversation;
use crate::events::Event;
use crate::llm::{self, ChatMessage, ModelInfo, Role, StreamChunk};
use crate::ragflow::models::Agent;

pub async fn get_agents(state: &AppState) -> Result<Vec<Agent>, String> {
    state
        .services()
        .ragflow
        .list_agents()
        .await
        .map_err(|e| e.to_string())
}

pub fn get_models(state: &AppState) -> Vec<ModelInfo> {
    llm::available_models(&state.services().settings)
}

/// One chat turn. The caller owns the history and passes the returned
/// session id back on its next call.
pub async fn send_chat(
    state: &AppState,
    messages: Vec<ChatMessage>,
    target: Option<String>,
    context: Option<String>,
    session_id: Option<String>,
) -> Result<ChatReply, String> {
    let services = state.services();
    let target = target
        .filter(|t| !t.trim().is_empty())
        .or_else(|| services.settings.default_target.clone())
        .ok_or("No model or agent selected")?;

    let blank = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map_or(true, |m| m.content.trim().is_empty());
    if blank {
        return Err(ChatError::EmptyMessage.to_string());
    }

    let params = ChatParams {
        messages,
        target: target.clone(),
        context,
        session_id,
    };

    state.events.emit(Event::ChatStarted {
        target: target.clone(),
    });
    match services.dispatcher.dispatch(&params).await {
        Ok(reply) => {
            state.events.emit(Event::ChatCompleted {
                target,
                session_id: reply.session_id.clone(),
            });
            Ok(reply)
        }
        Err(e) => {
            state.events.emit(Event::ChatFailed {
                target,
                error: e.to_string(),
            });
            Err(e.to_string())
        }
    }
}

/// One turn of an interactive conversation, streamed through `on_chunk`.
/// Runs under the request timeout and reports like `send_chat`.
pub async fn conversation_turn(
    state: &AppState,
    conversation: &mut Conversation,
    text: &str,
    context: Option<&str>,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<ChatReply, String> {
    if text.trim().is_empty() {
        return Err(ChatError::EmptyMessage.to_string());
    }
    let services = state.services();
    let timeout = services.settings.request_timeout;
    let target = conversation.target().to_string();

    state.events.emit(Event::ChatStarted {
        target: target.clone(),
    });
    let turn = conversation.send(&services.dispatcher, text, context, on_chunk);
    let error = match tokio::time::timeout(timeout, turn).await {
        Ok(Ok(reply)) => {
            state.events.emit(Event::ChatCompleted {
                target,
                session_id: reply.session_id.clone(),
            });
            return Ok(reply);
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("Request timed out after {}s", timeout.as_secs()),
    };

    tracing::warn!(%target, %error, "Chat turn failed");
    state.events.emit(Event::ChatFailed {
        target,
        error: error.clone(),
    });
    state.events.emit(Event::error("commands", "chat", &error));
    Err(error)
}
