use super::AppState;
use crate::config;
use std::collections::BTreeMap;

/// Stored settings with API keys masked for display.
pub fn get_settings(state: &AppState) -> Result<BTreeMap<String, String>, String> {
    config::masked_settings(&state.db).map_err(|e| e.to_string())
}

pub fn set_setting(state: &AppState, key: &str, value: &str) -> Result<(), String> {
    if !config::is_known_key(key) {
        return Err(format!("Unknown setting key: {}", key));
    }
    state
        .db
        .set_setting(key, value.trim())
        .map_err(|e| e.to_string())?;
    tracing::info!(key, "Setting updated");
    state.reload()
}

pub fn delete_setting(state: &AppState, key: &str) -> Result<(), String> {
    if !config::is_known_key(key) {
        return Err(format!("Unknown setting key: {}", key));
    }
    state.db.delete_setting(key).map_err(|e| e.to_string())?;
    tracing::info!(key, "Setting removed");
    state.reload()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn state() -> AppState {
        AppState::new(Database::in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_unknown_key_rejected() {
        let state = state();
        assert_eq!(
            set_setting(&state, "theme", "dark").unwrap_err(),
            "Unknown setting key: theme"
        );
        assert!(delete_setting(&state, "theme").is_err());
    }

    #[test]
    fn test_set_reloads_and_masks() {
        let state = state();
        set_setting(&state, "ollama_model", " llama3 ").unwrap();
        set_setting(&state, "ragflow_api_key", "ragflow-0123456789").unwrap();

        if std::env::var("OLLAMA_MODEL").is_err() {
            assert_eq!(state.services().settings.ollama_model, "llama3");
        }
        let shown = get_settings(&state).unwrap();
        assert_eq!(shown["ragflow_api_key"], "ragf...6789");

        delete_setting(&state, "ollama_model").unwrap();
        assert!(!get_settings(&state).unwrap().contains_key("ollama_model"));
    }
}
