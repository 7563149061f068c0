//! Summarize and translate helpers exposed by the same backend.

use super::{RagflowClient, RagflowError};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct SummaryData {
    summary: String,
}

#[derive(Deserialize)]
struct TranslationData {
    translation: String,
}

impl RagflowClient {
    pub async fn summarize(&self, text: &str) -> Result<String, RagflowError> {
        let data: SummaryData = self.post("/summarize", &SummarizeRequest { text }).await?;
        Ok(data.summary)
    }

    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String, RagflowError> {
        let data: TranslationData = self
            .post("/translate", &TranslateRequest { text, target_lang })
            .await?;
        Ok(data.translation)
    }
}
