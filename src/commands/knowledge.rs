use super::AppState;
use crate::doc_processor::{self, DocumentReport};
use crate::events::Event;
use crate::ragflow::models::{Dataset, Document, RetrievalHit};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct LocalFileResult {
    pub report: DocumentReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<Document>,
}

pub async fn get_datasets(state: &AppState) -> Result<Vec<Dataset>, String> {
    state
        .services()
        .ragflow
        .list_datasets()
        .await
        .map_err(|e| e.to_string())
}

pub async fn create_dataset(
    state: &AppState,
    name: &str,
    description: Option<&str>,
) -> Result<Dataset, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Dataset name is empty".into());
    }
    let dataset = state
        .services()
        .ragflow
        .create_dataset(name, description)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!(dataset_id = %dataset.id, name, "Dataset created");
    state.events.emit(Event::DatasetCreated {
        dataset: dataset.clone(),
    });
    Ok(dataset)
}

pub async fn delete_datasets(state: &AppState, ids: Vec<String>) -> Result<(), String> {
    if ids.is_empty() {
        return Err("No dataset ids given".into());
    }
    state
        .services()
        .ragflow
        .delete_datasets(&ids)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(selected) = state.selected_dataset() {
        if ids.contains(&selected) {
            state.set_selected_dataset(None)?;
            state.events.emit(Event::DatasetSelected { id: None });
        }
    }
    state.events.emit(Event::DatasetsDeleted { ids });
    Ok(())
}

pub fn select_dataset(state: &AppState, id: Option<String>) -> Result<Option<String>, String> {
    let id = id.filter(|id| !id.trim().is_empty());
    state.set_selected_dataset(id.as_deref())?;
    state.events.emit(Event::DatasetSelected { id: id.clone() });
    Ok(id)
}

/// Fresh listing from the server; also refreshes the offline copy.
pub async fn get_documents(
    state: &AppState,
    dataset_id: Option<String>,
) -> Result<Vec<Document>, String> {
    let dataset_id = state.resolve_dataset(dataset_id)?;
    let docs = state
        .services()
        .ragflow
        .list_documents(&dataset_id)
        .await
        .map_err(|e| e.to_string())?;

    if let Err(e) = state.storage.cache_documents(&dataset_id, &docs) {
        tracing::warn!(%dataset_id, error = %e, "Could not cache document list");
    }
    state.events.emit(Event::DocumentsRefreshed {
        dataset_id,
        count: docs.len(),
    });
    Ok(docs)
}

pub fn get_cached_documents(
    state: &AppState,
    dataset_id: Option<String>,
) -> Result<Vec<Document>, String> {
    let dataset_id = state.resolve_dataset(dataset_id)?;
    let docs = state
        .storage
        .cached_documents(&dataset_id)
        .map_err(|e| e.to_string())?;
    Ok(docs.unwrap_or_default())
}

pub async fn upload_document(
    state: &AppState,
    dataset_id: Option<String>,
    path: &Path,
) -> Result<Document, String> {
    let dataset_id = state.resolve_dataset(dataset_id)?;
    let file_name = doc_processor::file_name(path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;

    let document = state
        .services()
        .ragflow
        .upload_document(&dataset_id, &file_name, bytes, doc_processor::mime_for(path))
        .await
        .map_err(|e| e.to_string())?;

    state.events.emit(Event::DocumentUploaded {
        dataset_id,
        document_id: document.id.clone(),
        file_name,
    });
    Ok(document)
}

pub async fn delete_documents(
    state: &AppState,
    dataset_id: Option<String>,
    ids: Vec<String>,
) -> Result<(), String> {
    let dataset_id = state.resolve_dataset(dataset_id)?;
    if ids.is_empty() {
        return Err("No document ids given".into());
    }
    state
        .services()
        .ragflow
        .delete_documents(&dataset_id, &ids)
        .await
        .map_err(|e| e.to_string())?;
    state.events.emit(Event::DocumentsDeleted { dataset_id, ids });
    Ok(())
}

pub async fn parse_documents(
    state: &AppState,
    dataset_id: Option<String>,
    ids: Vec<String>,
) -> Result<(), String> {
    let dataset_id = state.resolve_dataset(dataset_id)?;
    if ids.is_empty() {
        return Err("No document ids given".into());
    }
    state
        .services()
        .ragflow
        .parse_documents(&dataset_id, &ids)
        .await
        .map_err(|e| e.to_string())?;
    state.events.emit(Event::ParseStarted { dataset_id, ids });
    Ok(())
}

/// Searches the given datasets, or the selected one when none are given.
pub async fn retrieve(
    state: &AppState,
    question: &str,
    dataset_ids: Vec<String>,
) -> Result<Vec<RetrievalHit>, String> {
    let question = question.trim();
    if question.is_empty() {
        return Err("Search query is empty".into());
    }
    let dataset_ids = if dataset_ids.is_empty() {
        vec![state.resolve_dataset(None)?]
    } else {
        dataset_ids
    };

    state.events.emit(Event::SearchStarted {
        query: question.to_string(),
    });
    match state
        .services()
        .ragflow
        .retrieve(question, &dataset_ids)
        .await
    {
        Ok(hits) => {
            state.events.emit(Event::SearchCompleted {
                query: question.to_string(),
                hits: hits.len(),
            });
            Ok(hits)
        }
        Err(e) => {
            state.events.emit(Event::SearchFailed {
                query: question.to_string(),
                error: e.to_string(),
            });
            Err(e.to_string())
        }
    }
}

pub async fn summarize(state: &AppState, text: &str) -> Result<String, String> {
    if text.trim().is_empty() {
        return Err("Nothing to summarize".into());
    }
    let summary = state
        .services()
        .ragflow
        .summarize(text)
        .await
        .map_err(|e| e.to_string())?;
    state.events.emit(Event::SummarizationCompleted {
        summary: summary.clone(),
    });
    Ok(summary)
}

pub async fn translate(state: &AppState, text: &str, target_lang: &str) -> Result<String, String> {
    if text.trim().is_empty() {
        return Err("Nothing to translate".into());
    }
    let translation = state
        .services()
        .ragflow
        .translate(text, target_lang)
        .await
        .map_err(|e| e.to_string())?;
    state.events.emit(Event::TranslationCompleted {
        translation: translation.clone(),
    });
    Ok(translation)
}

/// Parses a local file for preview and optionally uploads it.
pub async fn parse_local_file(
    state: &AppState,
    path: PathBuf,
    upload_to: Option<String>,
) -> Result<LocalFileResult, String> {
    let report_path = path.clone();
    // PDF extraction is CPU-bound.
    let report = tokio::task::spawn_blocking(move || doc_processor::report(&report_path))
        .await
        .map_err(|e| e.to_string())??;

    let uploaded = match upload_to {
        Some(dataset_id) => Some(upload_document(state, Some(dataset_id), &path).await?),
        None => None,
    };
    Ok(LocalFileResult { report, uploaded })
}
