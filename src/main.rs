use clap::{Parser, Subcommand};
use ragflow_assist_lib::commands::{self, AppState, Request, Response};
use ragflow_assist_lib::conversation::Conversation;
use ragflow_assist_lib::db::Database;
use ragflow_assist_lib::events::{Event, EventKind};
use ragflow_assist_lib::llm::ChatMessage;
use ragflow_assist_lib::poller;
use serde_json::Value;
use ragflow_assist_lib::ragflow::models::DocumentStatus;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "ragflow-assist", version, about = "RAGFlow knowledge-base and chat assistant")]
struct Cli {
    /// Directory holding the settings database and local cache
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage knowledge-base datasets
    Datasets {
        #[command(subcommand)]
        action: DatasetAction,
    },
    /// Manage documents inside a dataset
    Docs {
        #[command(subcommand)]
        action: DocAction,
    },
    /// Retrieve passages matching a question
    Search {
        question: String,
        /// Datasets to search; defaults to the selected one
        #[arg(short, long = "dataset")]
        datasets: Vec<String>,
    },
    /// List RAGFlow agents
    Agents,
    /// List chat models usable with the current settings
    Models,
    /// Chat with a model or agent; interactive when no message is given
    Chat {
        message: Option<String>,
        /// Model id or agent id
        #[arg(short, long)]
        target: Option<String>,
        /// Text file whose content is offered to the model as context
        #[arg(short, long)]
        context_file: Option<PathBuf>,
    },
    Summarize {
        text: String,
    },
    Translate {
        text: String,
        #[arg(short = 'l', long, default_value = "zh")]
        target_lang: String,
    },
    /// Show a local txt/md/pdf file's text, optionally uploading it
    Pdf {
        path: PathBuf,
        #[arg(long)]
        upload_to: Option<String>,
    },
    /// Read and change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DatasetAction {
    List,
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Make a dataset the default for document and search commands
    Select { id: Option<String> },
}

#[derive(Subcommand)]
enum DocAction {
    List {
        #[arg(short, long)]
        dataset: Option<String>,
        /// Show the last listing without contacting the server
        #[arg(long)]
        cached: bool,
    },
    Upload {
        path: PathBuf,
        #[arg(short, long)]
        dataset: Option<String>,
    },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(short, long)]
        dataset: Option<String>,
    },
    Parse {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(short, long)]
        dataset: Option<String>,
    },
    /// Poll the document list and report parse progress until interrupted
    Watch {
        #[arg(short, long)]
        dataset: Option<String>,
        #[arg(long, default_value_t = poller::DEFAULT_POLL_INTERVAL.as_secs())]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: Option<String> },
    Set { key: String, value: String },
    Unset { key: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    ragflow_assist_lib::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let data_dir = ragflow_assist_lib::data_dir(cli.data_dir);
    let db = Database::new(&data_dir).map_err(|e| e.to_string())?;
    let state = Arc::new(AppState::new(db)?);
    tracing::debug!(data_dir = %data_dir.display(), "Opened data directory");

    match cli.command {
        Command::Datasets { action } => match action {
            DatasetAction::List => {
                let data = request(&state, Request::GetDatasets).await?;
                for ds in items(&data) {
                    println!(
                        "{}  {}  ({} docs)",
                        text(&ds["id"]),
                        text(&ds["name"]),
                        ds["document_count"]
                    );
                }
            }
            DatasetAction::Create { name, description } => {
                let data = request(&state, Request::CreateDataset { name, description }).await?;
                println!("Created dataset {}", text(&data["id"]));
            }
            DatasetAction::Delete { ids } => {
                request(&state, Request::DeleteDatasets { ids }).await?;
                println!("Deleted");
            }
            DatasetAction::Select { id } => {
                let data = request(&state, Request::SelectDataset { id }).await?;
                match data.as_str() {
                    Some(id) => println!("Selected dataset {}", id),
                    None => println!("Selection cleared"),
                }
            }
        },
        Command::Docs { action } => docs(&state, action).await?,
        Command::Search {
            question,
            datasets,
        } => {
            let data = request(
                &state,
                Request::Retrieve {
                    question,
                    dataset_ids: datasets,
                },
            )
            .await?;
            let hits = items(&data);
            if hits.is_empty() {
                println!("No matching passages");
            }
            for hit in hits {
                let source = hit["document_name"].as_str().unwrap_or("unknown document");
                let similarity = hit["similarity"].as_f64().unwrap_or(0.0);
                println!("[{:.0}%] {}", similarity * 100.0, source);
                println!("    {}\n", text(&hit["content"]));
            }
        }
        Command::Agents => {
            let data = request(&state, Request::GetAgents).await?;
            for agent in items(&data) {
                println!("{}  {}", text(&agent["id"]), text(&agent["title"]));
            }
        }
        Command::Models => {
            let data = request(&state, Request::GetModels).await?;
            for model in items(&data) {
                println!(
                    "{:<18} {:<10} {}",
                    text(&model["id"]),
                    text(&model["provider"]),
                    text(&model["description"])
                );
            }
        }
        Command::Chat {
            message,
            target,
            context_file,
        } => {
            let context = match context_file {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?,
                ),
                None => None,
            };
            let target = target
                .or_else(|| state.services().settings.default_target.clone())
                .ok_or("No target given: pass --target or set default_target")?;
            match message {
                Some(message) => {
                    let data = request(
                        &state,
                        Request::Chat {
                            messages: vec![ChatMessage::user(message)],
                            target: Some(target),
                            context,
                            session_id: None,
                        },
                    )
                    .await?;
                    println!("{}", text(&data["content"]));
                }
                None => repl(&state, target, context).await?,
            }
        }
        Command::Summarize { text: input } => {
            let data = request(&state, Request::Summarize { text: input }).await?;
            println!("{}", text(&data));
        }
        Command::Translate {
            text: input,
            target_lang,
        } => {
            let data = request(
                &state,
                Request::Translate {
                    text: input,
                    target_lang,
                },
            )
            .await?;
            println!("{}", text(&data));
        }
        Command::Pdf { path, upload_to } => {
            let data = request(&state, Request::ParseLocalFile { path, upload_to }).await?;
            let report = &data["report"];
            println!(
                "{} ({}, {} bytes, {} characters)\n",
                text(&report["file_name"]),
                text(&report["file_type"]),
                report["size"],
                report["char_count"]
            );
            println!("{}", text(&report["preview"]));
            if let Some(id) = data["uploaded"]["id"].as_str() {
                println!("\nUploaded as {}, parsing started", id);
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key } => {
                let data = request(&state, Request::GetSettings).await?;
                if let Some(map) = data.as_object() {
                    for (k, v) in map {
                        if key.as_deref().map_or(true, |key| key == k.as_str()) {
                            println!("{} = {}", k, text(v));
                        }
                    }
                }
            }
            ConfigAction::Set { key, value } => {
                request(&state, Request::SetSetting { key, value }).await?;
            }
            ConfigAction::Unset { key } => {
                request(&state, Request::DeleteSetting { key }).await?;
            }
        },
    }
    Ok(())
}

async fn docs(state: &Arc<AppState>, action: DocAction) -> Result<(), String> {
    match action {
        DocAction::List { dataset, cached } => {
            let request_kind = if cached {
                Request::GetCachedDocuments {
                    dataset_id: dataset,
                }
            } else {
                Request::GetDocuments {
                    dataset_id: dataset,
                }
            };
            let data = request(state, request_kind).await?;
            for doc in items(&data) {
                print_document(doc);
            }
        }
        DocAction::Upload { path, dataset } => {
            let data = request(
                state,
                Request::UploadDocument {
                    dataset_id: dataset,
                    path,
                },
            )
            .await?;
            println!("Uploaded {} as {}, parsing started", text(&data["name"]), text(&data["id"]));
        }
        DocAction::Delete { ids, dataset } => {
            request(
                state,
                Request::DeleteDocuments {
                    dataset_id: dataset,
                    ids,
                },
            )
            .await?;
            println!("Deleted");
        }
        DocAction::Parse { ids, dataset } => {
            request(
                state,
                Request::ParseDocuments {
                    dataset_id: dataset,
                    ids,
                },
            )
            .await?;
            println!("Parsing started");
        }
        DocAction::Watch { dataset, interval } => {
            let dataset_id = dataset
                .or_else(|| state.selected_dataset())
                .ok_or("No dataset selected")?;
            state.events.on(EventKind::DocumentParsed, |event| {
                if let Event::DocumentParsed { document, .. } = event {
                    println!("Finished parsing {} ({} chunks)", document.name, document.chunk_count);
                }
            });
            state.events.on(EventKind::DocumentsRefreshed, |event| {
                if let Event::DocumentsRefreshed { count, .. } = event {
                    println!("{} documents", count);
                }
            });
            state.events.on(EventKind::ErrorOccurred, |event| {
                if let Event::ErrorOccurred { error, .. } = event {
                    eprintln!("Poll failed: {}", error);
                }
            });

            let handle = poller::spawn_document_poller(
                state.clone(),
                dataset_id,
                Duration::from_secs(interval.max(1)),
            );
            tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
            handle.abort();
        }
    }
    Ok(())
}

async fn repl(state: &AppState, target: String, context: Option<String>) -> Result<(), String> {
    let mut conversation = Conversation::new(target);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!(
        "Chatting with {}. /new starts over, /context toggles page context, /target <id> switches, /quit exits.",
        conversation.target()
    );
    loop {
        stdout.write_all(b"> ").await.map_err(|e| e.to_string())?;
        stdout.flush().await.map_err(|e| e.to_string())?;
        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                conversation.new_chat();
                println!("New chat started");
                continue;
            }
            "/context" => {
                let enabled = conversation.toggle_context();
                state.events.emit(Event::ContextToggled { enabled });
                if enabled && context.is_none() {
                    println!("Context on, but no --context-file was given");
                } else {
                    println!("Context {}", if enabled { "on" } else { "off" });
                }
                continue;
            }
            _ => {}
        }
        if let Some(next) = line.strip_prefix("/target ") {
            conversation.set_target(next.trim());
            state.events.emit(Event::AgentChanged {
                target: conversation.target().to_string(),
            });
            println!("Now chatting with {}", conversation.target());
            continue;
        }

        let turn = commands::chat::conversation_turn(
            state,
            &mut conversation,
            line,
            context.as_deref(),
            |chunk| {
                if chunk.done {
                    println!("\n");
                } else {
                    print!("{}", chunk.delta);
                    let _ = std::io::stdout().flush();
                }
            },
        );
        if let Err(e) = turn.await {
            eprintln!("Error: {}\n", e);
        }
    }
    Ok(())
}

/// Sends one request and unwraps the `{success, data, error}` envelope.
async fn request(state: &AppState, request: Request) -> Result<Value, String> {
    let Response {
        success,
        data,
        error,
    } = commands::handle(state, request).await;
    if success {
        Ok(data.unwrap_or(Value::Null))
    } else {
        Err(error.unwrap_or_else(|| "Request failed".to_string()))
    }
}

fn items(data: &Value) -> &[Value] {
    data.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn print_document(doc: &Value) {
    let progress = doc["progress"].as_f64().unwrap_or(0.0);
    let status = serde_json::from_value::<DocumentStatus>(doc["status"].clone())
        .map(|status| status.label())
        .unwrap_or("unknown");
    println!(
        "{}  {:<32} {:<16} {:>3.0}%",
        text(&doc["id"]),
        text(&doc["name"]),
        status,
        progress * 100.0
    );
}
