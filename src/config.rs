use crate::db::Database;
use crate::ragflow::{RagflowClient, RagflowConfig, RagflowError};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_RAGFLOW_BASE_URL: &str = "http://localhost:9380/api/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Keys accepted by `set_setting`. Each can be overridden by the upper-cased
/// environment variable of the same name.
pub const SETTING_KEYS: &[&str] = &[
    "ragflow_base_url",
    "ragflow_api_key",
    "openai_api_key",
    "openai_base_url",
    "deepseek_api_key",
    "deepseek_base_url",
    "ollama_host",
    "ollama_model",
    "default_target",
    "request_timeout_secs",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub ragflow_base_url: String,
    pub ragflow_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub default_target: Option<String>,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ragflow_base_url: DEFAULT_RAGFLOW_BASE_URL.to_string(),
            ragflow_api_key: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            deepseek_api_key: None,
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            default_target: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Environment first, then the settings table, then defaults.
    pub fn load(db: &Database) -> rusqlite::Result<Self> {
        let stored = db.list_settings()?;
        Ok(Self::from_lookup(|key| {
            std::env::var(key.to_uppercase())
                .ok()
                .or_else(|| stored.get(key).cloned())
        }))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let request_timeout = match get("request_timeout_secs").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                tracing::warn!("Ignoring invalid request_timeout_secs, using default");
                defaults.request_timeout
            }
            None => defaults.request_timeout,
        };

        Self {
            ragflow_base_url: get("ragflow_base_url").unwrap_or(defaults.ragflow_base_url),
            ragflow_api_key: get("ragflow_api_key"),
            openai_api_key: get("openai_api_key"),
            openai_base_url: get("openai_base_url").unwrap_or(defaults.openai_base_url),
            deepseek_api_key: get("deepseek_api_key"),
            deepseek_base_url: get("deepseek_base_url").unwrap_or(defaults.deepseek_base_url),
            ollama_host: get("ollama_host").unwrap_or(defaults.ollama_host),
            ollama_model: get("ollama_model").unwrap_or(defaults.ollama_model),
            default_target: get("default_target"),
            request_timeout,
        }
    }

    pub fn ragflow_client(&self) -> Result<RagflowClient, RagflowError> {
        let client = RagflowClient::new(
            RagflowConfig {
                api_key: self.ragflow_api_key.clone().unwrap_or_default(),
                base_url: self.ragflow_base_url.clone(),
            },
            self.request_timeout,
        )?;
        if !client.has_api_key() {
            tracing::warn!("RAGFlow API key is not set");
        }
        Ok(client)
    }
}

pub fn is_known_key(key: &str) -> bool {
    SETTING_KEYS.contains(&key)
}

/// Stored settings for display, with API keys masked.
pub fn masked_settings(db: &Database) -> rusqlite::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (key, value) in db.list_settings()? {
        if key.ends_with("_api_key") {
            map.insert(key, mask_secret(&value));
        } else {
            map.insert(key, value);
        }
    }
    Ok(map)
}

pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}
