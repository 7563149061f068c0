//! Request/response surface shared by the CLI and any other front end.
//!
//! Each request is a tagged JSON object (`{"action": "getDatasets", ...}`)
//! and every outcome, failures included, comes back as
//! `{success, data?, error?}`.

pub mod chat;
pub mod knowledge;
pub mod settings;

use crate::chat::ChatDispatcher;
use crate::config::Settings;
use crate::db::Database;
use crate::events::{Event, EventBus};
use crate::llm::ChatMessage;
use crate::ragflow::RagflowClient;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

const SELECTED_DATASET_KEY: &str = "selected_dataset";

/// Clients built from one snapshot of the settings.
pub struct Services {
    pub settings: Settings,
    pub ragflow: RagflowClient,
    pub dispatcher: ChatDispatcher,
}

impl Services {
    pub fn from_settings(settings: Settings) -> Result<Self, String> {
        let ragflow = settings.ragflow_client().map_err(|e| e.to_string())?;
        let dispatcher =
            ChatDispatcher::new(settings.clone(), ragflow.clone()).map_err(|e| e.to_string())?;
        Ok(Self {
            settings,
            ragflow,
            dispatcher,
        })
    }
}

pub struct AppState {
    pub db: Arc<Database>,
    pub storage: Storage,
    pub events: EventBus,
    services: RwLock<Arc<Services>>,
}

impl AppState {
    pub fn new(db: Database) -> Result<Self, String> {
        let settings = Settings::load(&db).map_err(|e| e.to_string())?;
        Self::with_settings(db, settings)
    }

    pub fn with_settings(db: Database, settings: Settings) -> Result<Self, String> {
        let db = Arc::new(db);
        Ok(Self {
            storage: Storage::new(db.clone()),
            db,
            events: EventBus::new(),
            services: RwLock::new(Arc::new(Services::from_settings(settings)?)),
        })
    }

    pub fn services(&self) -> Arc<Services> {
        self.services.read().unwrap().clone()
    }

    /// Rebuild the clients after a settings change.
    pub fn reload(&self) -> Result<(), String> {
        let settings = Settings::load(&self.db).map_err(|e| e.to_string())?;
        let services = Services::from_settings(settings)?;
        *self.services.write().unwrap() = Arc::new(services);
        tracing::debug!("Settings reloaded");
        Ok(())
    }

    pub fn selected_dataset(&self) -> Option<String> {
        match self.storage.get::<String>(SELECTED_DATASET_KEY) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read selected dataset");
                None
            }
        }
    }

    pub(crate) fn set_selected_dataset(&self, id: Option<&str>) -> Result<(), String> {
        let result = match id {
            Some(id) => self.storage.set(SELECTED_DATASET_KEY, id),
            None => self.storage.remove(SELECTED_DATASET_KEY),
        };
        result.map_err(|e| e.to_string())
    }

    /// Explicit dataset id, else the selected one.
    pub(crate) fn resolve_dataset(&self, id: Option<String>) -> Result<String, String> {
        id.filter(|id| !id.trim().is_empty())
            .or_else(|| self.selected_dataset())
            .ok_or_else(|| "No dataset selected".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    GetDatasets,
    CreateDataset {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    DeleteDatasets {
        ids: Vec<String>,
    },
    SelectDataset {
        #[serde(default)]
        id: Option<String>,
    },
    GetDocuments {
        #[serde(default)]
        dataset_id: Option<String>,
    },
    GetCachedDocuments {
        #[serde(default)]
        dataset_id: Option<String>,
    },
    UploadDocument {
        #[serde(default)]
        dataset_id: Option<String>,
        path: PathBuf,
    },
    DeleteDocuments {
        #[serde(default)]
        dataset_id: Option<String>,
        ids: Vec<String>,
    },
    ParseDocuments {
        #[serde(default)]
        dataset_id: Option<String>,
        ids: Vec<String>,
    },
    Retrieve {
        question: String,
        #[serde(default)]
        dataset_ids: Vec<String>,
    },
    GetAgents,
    GetModels,
    Chat {
        messages: Vec<ChatMessage>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Summarize {
        text: String,
    },
    Translate {
        text: String,
        #[serde(default = "default_target_lang")]
        target_lang: String,
    },
    ParseLocalFile {
        path: PathBuf,
        #[serde(default)]
        upload_to: Option<String>,
    },
    GetSettings,
    SetSetting {
        key: String,
        value: String,
    },
    DeleteSetting {
        key: String,
    },
}

fn default_target_lang() -> String {
    "zh".to_string()
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetDatasets => "getDatasets",
            Request::CreateDataset { .. } => "createDataset",
            Request::DeleteDatasets { .. } => "deleteDatasets",
            Request::SelectDataset { .. } => "selectDataset",
            Request::GetDocuments { .. } => "getDocuments",
            Request::GetCachedDocuments { .. } => "getCachedDocuments",
            Request::UploadDocument { .. } => "uploadDocument",
            Request::DeleteDocuments { .. } => "deleteDocuments",
            Request::ParseDocuments { .. } => "parseDocuments",
            Request::Retrieve { .. } => "retrieve",
            Request::GetAgents => "getAgents",
            Request::GetModels => "getModels",
            Request::Chat { .. } => "chat",
            Request::Summarize { .. } => "summarize",
            Request::Translate { .. } => "translate",
            Request::ParseLocalFile { .. } => "parseLocalFile",
            Request::GetSettings => "getSettings",
            Request::SetSetting { .. } => "setSetting",
            Request::DeleteSetting { .. } => "deleteSetting",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: (!data.is_null()).then_some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Runs one request under the configured timeout. Failures are logged,
/// published as `ErrorOccurred` and returned in the response.
pub async fn handle(state: &AppState, request: Request) -> Response {
    let action = request.action();
    let timeout = state.services().settings.request_timeout;
    tracing::debug!(action, "Handling request");

    let outcome = match tokio::time::timeout(timeout, dispatch(state, request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(format!("Request timed out after {}s", timeout.as_secs())),
    };

    match outcome {
        Ok(data) => Response::ok(data),
        Err(error) => {
            tracing::warn!(action, %error, "Request failed");
            state.events.emit(Event::error("commands", action, &error));
            Response::err(error)
        }
    }
}

/// Entry point for raw JSON messages.
pub async fn handle_json(state: &AppState, raw: &str) -> Response {
    match serde_json::from_str::<Request>(raw) {
        Ok(request) => handle(state, request).await,
        Err(e) => Response::err(format!("Invalid request: {}", e)),
    }
}

async fn dispatch(state: &AppState, request: Request) -> Result<Value, String> {
    match request {
        Request::GetDatasets => to_data(knowledge::get_datasets(state).await?),
        Request::CreateDataset { name, description } => {
            to_data(knowledge::create_dataset(state, &name, description.as_deref()).await?)
        }
        Request::DeleteDatasets { ids } => to_data(knowledge::delete_datasets(state, ids).await?),
        Request::SelectDataset { id } => to_data(knowledge::select_dataset(state, id)?),
        Request::GetDocuments { dataset_id } => {
            to_data(knowledge::get_documents(state, dataset_id).await?)
        }
        Request::GetCachedDocuments { dataset_id } => {
            to_data(knowledge::get_cached_documents(state, dataset_id)?)
        }
        Request::UploadDocument { dataset_id, path } => {
            to_data(knowledge::upload_document(state, dataset_id, &path).await?)
        }
        Request::DeleteDocuments { dataset_id, ids } => {
            to_data(knowledge::delete_documents(state, dataset_id, ids).await?)
        }
        Request::ParseDocuments { dataset_id, ids } => {
            to_data(knowledge::parse_documents(state, dataset_id, ids).await?)
        }
        Request::Retrieve {
            question,
            dataset_ids,
        } => to_data(knowledge::retrieve(state, &question, dataset_ids).await?),
        Request::GetAgents => to_data(chat::get_agents(state).await?),
        Request::GetModels => to_data(chat::get_models(state)),
        Request::Chat {
            messages,
            target,
            context,
            session_id,
        } => to_data(chat::send_chat(state, messages, target, context, session_id).await?),
        Request::Summarize { text } => to_data(knowledge::summarize(state, &text).await?),
        Request::Translate { text, target_lang } => {
            to_data(knowledge::translate(state, &text, &target_lang).await?)
        }
        Request::ParseLocalFile { path, upload_to } => {
            to_data(knowledge::parse_local_file(state, path, upload_to).await?)
        }
        Request::GetSettings => to_data(settings::get_settings(state)?),
        Request::SetSetting { key, value } => to_data(settings::set_setting(state, &key, &value)?),
        Request::DeleteSetting { key } => to_data(settings::delete_setting(state, &key)?),
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::testing::MockBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn state_for(backend: &MockBackend) -> AppState {
        AppState::with_settings(Database::in_memory().unwrap(), backend.settings()).unwrap()
    }

    #[test]
    fn test_request_parses_tagged_json() {
        let request: Request = serde_json::from_value(json!({
            "action": "deleteDocuments",
            "datasetId": "ds-1",
            "ids": ["a", "b"]
        }))
        .unwrap();
        assert!(matches!(
            request,
            Request::DeleteDocuments { dataset_id: Some(ref ds), ref ids } if ds == "ds-1" && ids.len() == 2
        ));

        let request: Request =
            serde_json::from_value(json!({ "action": "translate", "text": "hi" })).unwrap();
        assert!(matches!(request, Request::Translate { ref target_lang, .. } if target_lang == "zh"));
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::ok(json!([1]))).unwrap();
        assert_eq!(ok, json!({ "success": true, "data": [1] }));

        let empty = serde_json::to_value(Response::ok(Value::Null)).unwrap();
        assert_eq!(empty, json!({ "success": true }));

        let err = serde_json::to_value(Response::err("boom")).unwrap();
        assert_eq!(err, json!({ "success": false, "error": "boom" }));
    }

    #[tokio::test]
    async fn test_unknown_action_is_an_error_response() {
        let backend = MockBackend::start().await;
        let state = state_for(&backend);

        let response = handle_json(&state, r#"{"action":"getTabs"}"#).await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Invalid request"));
        assert_eq!(backend.hits(), 0);
    }

    #[tokio::test]
    async fn test_failure_emits_error_event() {
        let backend = MockBackend::start().await;
        let state = state_for(&backend);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        state.events.on(EventKind::ErrorOccurred, move |event| {
            if let Event::ErrorOccurred { action, .. } = event {
                assert_eq!(action, "getDocuments");
            }
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let response = handle(&state, Request::GetDocuments { dataset_id: None }).await;
        assert_eq!(response.error.as_deref(), Some("No dataset selected"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_then_list_through_handle() {
        let backend = MockBackend::start().await;
        let state = state_for(&backend);

        let created = handle(
            &state,
            Request::CreateDataset {
                name: "manuals".into(),
                description: None,
            },
        )
        .await;
        assert!(created.success);
        let id = created.data.unwrap()["id"].as_str().unwrap().to_string();

        let listed = handle(&state, Request::GetDatasets).await;
        let data = listed.data.unwrap();
        assert!(data
            .as_array()
            .unwrap()
            .iter()
            .any(|ds| ds["id"] == id.as_str()));
    }
}
