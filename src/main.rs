use clap::Parser;
use diagramchat::commands;
use diagramchat::config::{AppConfig, Cli, Command};
use diagramchat::db::SqliteConversationStore;
use diagramchat::ollama_api::OllamaClient;
use std::sync::Arc;

// application entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::from_cli(&cli)?;

    // Logs go to stderr so the diagram on stdout can be piped
    let rust_log = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(app_config.log_filter(rust_log.as_deref()))
        .init();

    tracing::debug!(?app_config, "Starting diagramchat");

    let client = Arc::new(OllamaClient::new(app_config.ollama_url.clone()));

    match cli.command {
        Command::Models => commands::load_models(&client).await,
        Command::Conversations => {
            let store = SqliteConversationStore::open(&app_config.db_path)?;
            commands::load_chat_sessions(&store).await
        }
        Command::Generate(args) => {
            let store = Arc::new(SqliteConversationStore::open(&app_config.db_path)?);
            commands::generate_diagram(args, &app_config, store, client).await
        }
    }
}
