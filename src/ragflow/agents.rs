use super::models::{Agent, AgentAnswer, AgentSession};
use super::{RagflowClient, RagflowError};
use serde::Serialize;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    stream: bool,
    session_id: &'a str,
}

impl RagflowClient {
    pub async fn list_agents(&self) -> Result<Vec<Agent>, RagflowError> {
        let agents: Option<Vec<Agent>> = self.get("/agents").await?;
        Ok(agents.unwrap_or_default())
    }

    pub async fn create_session(&self, agent_id: &str) -> Result<AgentSession, RagflowError> {
        let session: AgentSession = self
            .post(
                &format!("/agents/{}/sessions", agent_id),
                &serde_json::json!({}),
            )
            .await?;
        tracing::info!(agent_id, session_id = %session.id, "Agent session created");
        Ok(session)
    }

    pub async fn agent_completion(
        &self,
        agent_id: &str,
        question: &str,
        context: Option<&str>,
        session_id: &str,
    ) -> Result<AgentAnswer, RagflowError> {
        let body = CompletionRequest {
            question,
            context,
            stream: false,
            session_id,
        };
        self.post(&format!("/agents/{}/completions", agent_id), &body)
            .await
    }
}
