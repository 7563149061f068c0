//! Background refresh of one dataset's document list, so parse progress
//! shows up without the user asking for it.

use crate::commands::AppState;
use crate::events::Event;
use crate::ragflow::models::DocumentStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Last seen status per document id.
#[derive(Debug, Default)]
pub struct PollState {
    statuses: Option<HashMap<String, DocumentStatus>>,
}

/// Polls until the returned handle is aborted. Failed polls are reported
/// and the next tick tries again.
pub fn spawn_document_poller(
    state: Arc<AppState>,
    dataset_id: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(%dataset_id, every_secs = interval.as_secs(), "Document poller started");
        let mut ticker = tokio::time::interval(interval);
        let mut poll_state = PollState::default();
        loop {
            ticker.tick().await;
            poll_once(&state, &dataset_id, &mut poll_state).await;
        }
    })
}

/// One refresh. Returns how many documents finished parsing since the
/// previous poll; the first poll only records a baseline.
pub async fn poll_once(state: &AppState, dataset_id: &str, poll_state: &mut PollState) -> usize {
    let docs = match state.services().ragflow.list_documents(dataset_id).await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(dataset_id, error = %e, "Document poll failed");
            state.events.emit(Event::error("poller", "listDocuments", e));
            return 0;
        }
    };

    if let Err(e) = state.storage.cache_documents(dataset_id, &docs) {
        tracing::warn!(dataset_id, error = %e, "Could not cache document list");
    }

    let mut finished = 0;
    if let Some(previous) = &poll_state.statuses {
        for doc in &docs {
            let was_finished = previous.get(&doc.id) == Some(&DocumentStatus::Finished);
            if doc.status == DocumentStatus::Finished && !was_finished {
                finished += 1;
                state.events.emit(Event::DocumentParsed {
                    dataset_id: dataset_id.to_string(),
                    document: doc.clone(),
                });
            }
        }
    }
    poll_state.statuses = Some(docs.iter().map(|d| (d.id.clone(), d.status)).collect());

    state.events.emit(Event::DocumentsRefreshed {
        dataset_id: dataset_id.to_string(),
        count: docs.len(),
    });
    finished
}
