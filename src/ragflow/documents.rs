use super::models::{Document, DocumentPage};
use super::{RagflowClient, RagflowError};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

#[derive(Serialize)]
struct ParseRequest<'a> {
    document_ids: &'a [String],
}

#[derive(Serialize)]
struct IdsRequest<'a> {
    ids: &'a [String],
}

impl RagflowClient {
    pub async fn list_documents(&self, dataset_id: &str) -> Result<Vec<Document>, RagflowError> {
        let page: Option<DocumentPage> = self
            .get(&format!("/datasets/{}/documents", dataset_id))
            .await?;
        Ok(page.map(DocumentPage::into_documents).unwrap_or_default())
    }

    /// Upload one file and immediately ask the server to parse it.
    pub async fn upload_document(
        &self,
        dataset_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Document, RagflowError> {
        tracing::debug!(dataset_id, file_name, size = bytes.len(), "Uploading document");
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);

        let url = format!("{}/datasets/{}/documents", self.base_url(), dataset_id);
        let uploaded: Option<Vec<Document>> = self.send(self.http.post(url).multipart(form)).await?;
        let document = uploaded
            .and_then(|docs| docs.into_iter().next())
            .ok_or_else(|| RagflowError::Parse("upload response contained no document".into()))?;

        self.parse_documents(dataset_id, std::slice::from_ref(&document.id))
            .await?;
        tracing::info!(dataset_id, document_id = %document.id, "Document uploaded, parsing started");
        Ok(document)
    }

    pub async fn parse_documents(
        &self,
        dataset_id: &str,
        document_ids: &[String],
    ) -> Result<(), RagflowError> {
        let _: serde_json::Value = self
            .post(
                &format!("/datasets/{}/chunks", dataset_id),
                &ParseRequest { document_ids },
            )
            .await?;
        Ok(())
    }

    pub async fn delete_documents(
        &self,
        dataset_id: &str,
        document_ids: &[String],
    ) -> Result<(), RagflowError> {
        self.delete(
            &format!("/datasets/{}/documents", dataset_id),
            &IdsRequest { ids: document_ids },
        )
        .await?;
        tracing::info!(dataset_id, count = document_ids.len(), "Documents deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ragflow::models::DocumentStatus;
    use crate::testing::MockBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_upload_triggers_parse_of_returned_id() {
        let backend = MockBackend::start().await;
        let client = backend.settings().ragflow_client().unwrap();

        let doc = client
            .upload_document("ds1", "notes.txt", b"hello".to_vec(), "text/plain")
            .await
            .unwrap();

        assert_eq!(doc.name, "notes.txt");
        assert_eq!(doc.size, 5);
        assert_eq!(doc.status, DocumentStatus::Pending);

        let parses = backend.state.parse_requests.lock().unwrap().clone();
        assert_eq!(
            parses,
            vec![json!({ "dataset_id": "ds1", "document_ids": [doc.id] })]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_requested_ids() {
        let backend = MockBackend::start().await;
        backend.seed_document("ds1", "a", "DONE");
        backend.seed_document("ds1", "b", "RUNNING");
        backend.seed_document("ds1", "c", "UNSTART");
        backend.seed_document("ds2", "a2", "DONE");
        let client = backend.settings().ragflow_client().unwrap();

        client
            .delete_documents("ds1", &["a".to_string(), "c".to_string()])
            .await
            .unwrap();

        let remaining: Vec<String> = client
            .list_documents("ds1")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(remaining, vec!["b"]);
        assert_eq!(client.list_documents("ds2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_documents_normalizes_status() {
        let backend = MockBackend::start().await;
        backend.seed_document("ds1", "a", "DONE");
        backend.seed_document("ds1", "b", "FAIL");
        let client = backend.settings().ragflow_client().unwrap();

        let docs = client.list_documents("ds1").await.unwrap();
        assert_eq!(docs[0].status, DocumentStatus::Finished);
        assert_eq!(docs[1].status, DocumentStatus::Failed);
    }
}
