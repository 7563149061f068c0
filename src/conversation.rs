use crate::chat::{ChatDispatcher, ChatError, ChatParams, ChatReply};
use crate::llm::{ChatMessage, StreamChunk};

/// Chat state owned by one chat view: history, target and agent session.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    target: String,
    messages: Vec<ChatMessage>,
    session_id: Option<String>,
    use_context: bool,
}

impl Conversation {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            messages: Vec::new(),
            session_id: None,
            use_context: false,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn use_context(&self) -> bool {
        self.use_context
    }

    pub fn toggle_context(&mut self) -> bool {
        self.use_context = !self.use_context;
        self.use_context
    }

    /// Switching target starts over: agent sessions don't carry across.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
        self.new_chat();
    }

    pub fn new_chat(&mut self) {
        self.messages.clear();
        self.session_id = None;
    }

    /// Sends `text`, attaching `context` only when context use is switched on.
    /// The reply streams through `on_chunk`; history only changes once it
    /// has arrived in full.
    pub async fn send(
        &mut self,
        dispatcher: &ChatDispatcher,
        text: &str,
        context: Option<&str>,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<ChatReply, ChatError> {
        let params = self.next_turn(text, context)?;
        let result = dispatcher.dispatch_stream(&params, on_chunk).await;
        self.finish_turn(params, result)
    }

    fn next_turn(&self, text: &str, context: Option<&str>) -> Result<ChatParams, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(text));
        Ok(ChatParams {
            messages,
            target: self.target.clone(),
            context: context.filter(|_| self.use_context).map(str::to_string),
            session_id: self.session_id.clone(),
        })
    }

    fn finish_turn(
        &mut self,
        params: ChatParams,
        result: Result<ChatReply, ChatError>,
    ) -> Result<ChatReply, ChatError> {
        match result {
            Ok(reply) => {
                self.messages = params.messages;
                self.messages.push(ChatMessage::assistant(reply.content.clone()));
                if reply.session_id.is_some() {
                    self.session_id = reply.session_id.clone();
                }
                Ok(reply)
            }
            Err(e) => {
                if e.is_session_error() && self.session_id.take().is_some() {
                    tracing::info!(conversation = %self.id, "Dropped rejected agent session");
                }
                Err(e)
            }
        }
    }
}
