//! DeepSeek request shaping. The reasoner model rejects conversations whose
//! user/assistant turns do not strictly alternate, so those are repaired
//! before sending.

use super::openai::OpenAiRequest;
use super::{ChatMessage, ChatRequest, Role};

pub const REASONER_MODEL: &str = "deepseek-reasoner";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

const OPENING_USER_TURN: &str = "Please continue the conversation.";
const FILLER_ASSISTANT_TURN: &str = "OK, please continue.";
const FILLER_USER_TURN: &str = "Please continue.";

pub fn shape(request: &ChatRequest) -> OpenAiRequest {
    let messages = if request.model == REASONER_MODEL {
        repair_alternation(&request.messages)
    } else {
        request.messages.clone()
    };

    OpenAiRequest {
        model: request.model.clone(),
        messages,
        stream: request.stream,
        temperature: Some(TEMPERATURE),
        max_tokens: Some(MAX_TOKENS),
    }
}

/// System messages first, then the remaining turns with fillers inserted so
/// the sequence starts with a user turn and never repeats a role.
pub fn repair_alternation(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut repaired: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();

    let mut previous: Option<Role> = None;
    for msg in messages.iter().filter(|m| m.role != Role::System) {
        match previous {
            None if msg.role != Role::User => {
                repaired.push(ChatMessage::user(OPENING_USER_TURN));
            }
            Some(prev) if prev == msg.role => {
                repaired.push(match msg.role {
                    Role::User => ChatMessage::assistant(FILLER_ASSISTANT_TURN),
                    _ => ChatMessage::user(FILLER_USER_TURN),
                });
            }
            _ => {}
        }
        repaired.push(msg.clone());
        previous = Some(msg.role);
    }

    repaired
}
