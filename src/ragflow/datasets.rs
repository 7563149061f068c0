use super::models::Dataset;
use super::{RagflowClient, RagflowError};
use serde::Serialize;

#[derive(Serialize)]
struct CreateDatasetRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct IdsRequest<'a> {
    ids: &'a [String],
}

impl RagflowClient {
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, RagflowError> {
        let datasets: Option<Vec<Dataset>> = self.get("/datasets").await?;
        Ok(datasets.unwrap_or_default())
    }

    pub async fn create_dataset(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Dataset, RagflowError> {
        let dataset: Dataset = self
            .post("/datasets", &CreateDatasetRequest { name, description })
            .await?;
        tracing::info!(id = %dataset.id, name = %dataset.name, "Dataset created");
        Ok(dataset)
    }

    pub async fn delete_datasets(&self, ids: &[String]) -> Result<(), RagflowError> {
        self.delete("/datasets", &IdsRequest { ids }).await?;
        tracing::info!(count = ids.len(), "Datasets deleted");
        Ok(())
    }
}
