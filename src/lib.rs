pub mod chat;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod db;
pub mod doc_processor;
pub mod events;
pub mod llm;
pub mod poller;
pub mod ragflow;
pub mod storage;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const DATA_DIR_ENV: &str = "RAGFLOW_ASSIST_HOME";
const DEFAULT_DATA_DIR: &str = ".ragflow-assist";

/// Shared HTTP client builder; every outbound call goes through a client
/// with an explicit timeout.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let builder = reqwest::Client::builder().timeout(timeout);
    #[cfg(test)]
    let builder = builder.no_proxy();
    builder.build()
}

/// `--data-dir` wins, then `RAGFLOW_ASSIST_HOME`, then `./.ragflow-assist`.
pub fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ragflow_assist_lib={0},ragflow_assist={0}",
            default_level
        ))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
