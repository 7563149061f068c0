use super::models::{RetrievalHit, RetrievalPage};
use super::{RagflowClient, RagflowError};
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Serialize)]
struct RetrievalRequest<'a> {
    question: &'a str,
    dataset_ids: &'a [String],
    page_size: u32,
}

impl RagflowClient {
    pub async fn retrieve(
        &self,
        question: &str,
        dataset_ids: &[String],
    ) -> Result<Vec<RetrievalHit>, RagflowError> {
        let body = RetrievalRequest {
            question,
            dataset_ids,
            page_size: DEFAULT_PAGE_SIZE,
        };
        let page: Option<RetrievalPage> = self.post("/retrieval", &body).await?;
        let hits = page.map(RetrievalPage::into_hits).unwrap_or_default();
        tracing::debug!(question, hits = hits.len(), "Retrieval finished");
        Ok(hits)
    }
}
