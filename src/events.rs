//! In-process event bus used to tell interested parties about knowledge-base,
//! search and chat activity.

use crate::ragflow::models::{Dataset, Document};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DatasetCreated { dataset: Dataset },
    DatasetsDeleted { ids: Vec<String> },
    DatasetSelected { id: Option<String> },
    DocumentUploaded { dataset_id: String, document_id: String, file_name: String },
    DocumentsDeleted { dataset_id: String, ids: Vec<String> },
    ParseStarted { dataset_id: String, ids: Vec<String> },
    DocumentParsed { dataset_id: String, document: Document },
    DocumentsRefreshed { dataset_id: String, count: usize },
    SearchStarted { query: String },
    SearchCompleted { query: String, hits: usize },
    SearchFailed { query: String, error: String },
    ChatStarted { target: String },
    ChatCompleted { target: String, session_id: Option<String> },
    ChatFailed { target: String, error: String },
    AgentChanged { target: String },
    ContextToggled { enabled: bool },
    SummarizationCompleted { summary: String },
    TranslationCompleted { translation: String },
    ErrorOccurred { source: String, action: String, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DatasetCreated,
    DatasetsDeleted,
    DatasetSelected,
    DocumentUploaded,
    DocumentsDeleted,
    ParseStarted,
    DocumentParsed,
    DocumentsRefreshed,
    SearchStarted,
    SearchCompleted,
    SearchFailed,
    ChatStarted,
    ChatCompleted,
    ChatFailed,
    AgentChanged,
    ContextToggled,
    SummarizationCompleted,
    TranslationCompleted,
    ErrorOccurred,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DatasetCreated { .. } => EventKind::DatasetCreated,
            Event::DatasetsDeleted { .. } => EventKind::DatasetsDeleted,
            Event::DatasetSelected { .. } => EventKind::DatasetSelected,
            Event::DocumentUploaded { .. } => EventKind::DocumentUploaded,
            Event::DocumentsDeleted { .. } => EventKind::DocumentsDeleted,
            Event::ParseStarted { .. } => EventKind::ParseStarted,
            Event::DocumentParsed { .. } => EventKind::DocumentParsed,
            Event::DocumentsRefreshed { .. } => EventKind::DocumentsRefreshed,
            Event::SearchStarted { .. } => EventKind::SearchStarted,
            Event::SearchCompleted { .. } => EventKind::SearchCompleted,
            Event::SearchFailed { .. } => EventKind::SearchFailed,
            Event::ChatStarted { .. } => EventKind::ChatStarted,
            Event::ChatCompleted { .. } => EventKind::ChatCompleted,
            Event::ChatFailed { .. } => EventKind::ChatFailed,
            Event::AgentChanged { .. } => EventKind::AgentChanged,
            Event::ContextToggled { .. } => EventKind::ContextToggled,
            Event::SummarizationCompleted { .. } => EventKind::SummarizationCompleted,
            Event::TranslationCompleted { .. } => EventKind::TranslationCompleted,
            Event::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    pub fn error(source: &str, action: &str, error: impl ToString) -> Self {
        Event::ErrorOccurred {
            source: source.to_string(),
            action: action.to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<Subscription>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(kind, Arc::new(handler), false)
    }

    /// Like `on`, but the handler is dropped after its first call.
    pub fn once(
        &self,
        kind: EventKind,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(kind, Arc::new(handler), true)
    }

    pub fn off(&self, kind: EventKind, id: SubscriptionId) {
        if let Some(subs) = self.listeners.lock().unwrap().get_mut(&kind) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Calls every handler registered for the event's kind. A panicking
    /// handler is logged and the rest still run.
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        // Handlers run without the lock held so they may (un)subscribe.
        let handlers: Vec<Handler> = {
            let mut listeners = self.listeners.lock().unwrap();
            let Some(subs) = listeners.get_mut(&kind) else {
                return;
            };
            let handlers = subs.iter().map(|s| s.handler.clone()).collect();
            subs.retain(|s| !s.once);
            handlers
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(?kind, "Event handler panicked");
            }
        }
    }

    pub fn clear(&self) {
        self.listeners.lock().unwrap().clear();
    }

    fn subscribe(&self, kind: EventKind, handler: Handler, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Subscription { id, handler, once });
        id
    }
}
