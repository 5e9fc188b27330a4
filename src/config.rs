// Command line, environment and persisted preferences

use crate::db::SqliteConversationStore;
use crate::error::StoreResult;
use crate::ollama_api::DEFAULT_OLLAMA_URL;
use crate::selection::{DiagramType, OutputSyntax, Selection};
use crate::view::{ContentScale, UiPreferences};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const SELECTED_GENERATOR_KEY: &str = "selected_generator";
pub const SELECTED_DIAGRAM_TYPE_KEY: &str = "selected_diagram_type";
pub const SELECTED_SYNTAX_KEY: &str = "selected_output_syntax";
pub const UI_MOBILE_KEY: &str = "ui_mobile";
pub const UI_CONTENT_SCALE_KEY: &str = "ui_content_scale";

#[derive(Debug, Parser)]
#[command(name = "diagramchat", version, about = "Summarize chat conversations as diagrams")]
pub struct Cli {
    /// Path of the chat database
    #[arg(long, env = "DIAGRAMCHAT_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Ollama server address
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_OLLAMA_URL, global = true)]
    pub ollama_url: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the models Ollama can generate with
    Models,
    /// List stored conversations
    Conversations,
    /// Generate a diagram for a message of a conversation
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub conversation: i64,

    /// Message to summarize; defaults to the last non-system message
    #[arg(long)]
    pub message: Option<i64>,

    #[arg(long, value_enum)]
    pub diagram_type: Option<DiagramType>,

    #[arg(long, value_enum)]
    pub syntax: Option<OutputSyntax>,

    /// Model used to generate the diagram
    #[arg(long)]
    pub generator: Option<String>,

    /// Extra instruction appended to the prompt
    #[arg(long, default_value = "")]
    pub instruction: String,

    /// Insert the result into the conversation when done
    #[arg(long)]
    pub commit: bool,

    /// Show the option panel together with the streaming preview
    #[arg(long)]
    pub show_options: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub ollama_url: String,
    pub verbose: bool,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let db_path = match &cli.db {
            Some(path) => path.clone(),
            None => default_db_path()?,
        };

        Ok(Self {
            db_path,
            ollama_url: normalize_ollama_url(&cli.ollama_url),
            verbose: cli.verbose,
        })
    }

    pub fn default_log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// `rust_log` is the raw `RUST_LOG` value. The CLI level only applies when it is unset.
    pub fn log_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.default_log_level().into())
            .parse_lossy(rust_log.unwrap_or_default())
    }
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to retrieve application data directory")?;
    Ok(base_dir.join("diagramchat").join("diagramchat.db"))
}

/// `OLLAMA_HOST` is often set without a scheme, e.g. `127.0.0.1:11434`.
pub fn normalize_ollama_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn parse_or_warn<T: std::str::FromStr<Err = String>>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key, "Ignoring stored preference: {}", err);
            None
        }
    }
}

/// Selection remembered from the last dialog.
pub async fn load_saved_selection(store: &SqliteConversationStore) -> StoreResult<Selection> {
    Ok(Selection {
        diagram_type: parse_or_warn(
            SELECTED_DIAGRAM_TYPE_KEY,
            store.get_config_value(SELECTED_DIAGRAM_TYPE_KEY).await?,
        ),
        output_syntax: parse_or_warn(
            SELECTED_SYNTAX_KEY,
            store.get_config_value(SELECTED_SYNTAX_KEY).await?,
        ),
        generator: store
            .get_config_value(SELECTED_GENERATOR_KEY)
            .await?
            .filter(|g| !g.is_empty()),
        ..Default::default()
    })
}

pub async fn save_selection(store: &SqliteConversationStore, selection: &Selection) -> StoreResult<()> {
    if let Some(diagram_type) = selection.diagram_type {
        store
            .update_config_value(SELECTED_DIAGRAM_TYPE_KEY, diagram_type.as_str())
            .await?;
    }
    if let Some(syntax) = selection.output_syntax {
        store.update_config_value(SELECTED_SYNTAX_KEY, syntax.as_str()).await?;
    }
    if let Some(generator) = &selection.generator {
        store.update_config_value(SELECTED_GENERATOR_KEY, generator).await?;
    }
    Ok(())
}

pub async fn load_ui_preferences(store: &SqliteConversationStore) -> StoreResult<UiPreferences> {
    let mobile = store
        .get_config_value(UI_MOBILE_KEY)
        .await?
        .is_some_and(|v| v == "true");
    let content_scale = parse_or_warn::<ContentScale>(
        UI_CONTENT_SCALE_KEY,
        store.get_config_value(UI_CONTENT_SCALE_KEY).await?,
    )
    .unwrap_or_default();

    Ok(UiPreferences {
        mobile,
        content_scale,
    })
}
