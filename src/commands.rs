// Handles CLI command definitions

use crate::config::{self, AppConfig, GenerateArgs};
use crate::db::{Conversation, ConversationStore, Role, SqliteConversationStore};
use crate::dialog::DiagramDialog;
use crate::ollama_api::OllamaClient;
use crate::selection::Selection;
use crate::view::{render_dialog, ContentScale, ContentView, DiagramRenderer, RenderMode};
use anyhow::{anyhow, bail, Context};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREVIEW_WIDTH: usize = 72;

/// Prints diagram text as-is; while streaming only the line being written is shown.
pub struct TerminalRenderer;

impl DiagramRenderer for TerminalRenderer {
    fn render(&self, text: &str, mode: RenderMode, _scale: ContentScale) -> String {
        match mode {
            RenderMode::Diagram => text.to_string(),
            RenderMode::Streaming => {
                let line = text.lines().last().unwrap_or_default();
                let skip = line.chars().count().saturating_sub(PREVIEW_WIDTH);
                line.chars().skip(skip).collect()
            }
        }
    }
}

pub async fn load_models(client: &OllamaClient) -> anyhow::Result<()> {
    let models = client
        .fetch_models()
        .await
        .with_context(|| format!("Failed to load models from {}", client.base_url()))?;

    for model in models {
        println!("{}", model);
    }
    Ok(())
}

pub async fn load_chat_sessions(store: &SqliteConversationStore) -> anyhow::Result<()> {
    for session in store.list_conversations().await? {
        println!("{}\t{}", session.id, session.title);
    }
    Ok(())
}

fn pick_subject(conversation: &Conversation, message_id: Option<i64>) -> anyhow::Result<(i64, String)> {
    let message = match message_id {
        Some(id) => conversation
            .message(id)
            .ok_or_else(|| anyhow!("Message {} is not part of conversation {}", id, conversation.id))?,
        None => conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role != Role::System)
            .ok_or_else(|| anyhow!("Conversation {} has no messages to summarize", conversation.id))?,
    };
    Ok((message.id, message.message.clone()))
}

fn merge_selection(saved: Selection, args: &GenerateArgs) -> Selection {
    Selection {
        diagram_type: args.diagram_type.or(saved.diagram_type),
        output_syntax: args.syntax.or(saved.output_syntax),
        generator: args.generator.clone().or(saved.generator),
        custom_instruction: args.instruction.clone(),
        options_expanded: args.show_options,
    }
}

pub async fn generate_diagram(
    args: GenerateArgs,
    app_config: &AppConfig,
    store: Arc<SqliteConversationStore>,
    client: Arc<OllamaClient>,
) -> anyhow::Result<()> {
    let conversation = store
        .conversation(args.conversation)
        .await?
        .ok_or_else(|| anyhow!("Conversation {} not found", args.conversation))?;
    let (message_id, subject) = pick_subject(&conversation, args.message)?;

    let selection = merge_selection(config::load_saved_selection(&store).await?, &args);
    let prefs = config::load_ui_preferences(&store).await?;
    let generators = client.fetch_models().await.unwrap_or_else(|err| {
        warn!(url = %app_config.ollama_url, "Could not list models: {}", err);
        Vec::new()
    });

    let dialog = DiagramDialog::new(
        conversation.id,
        message_id,
        subject,
        client.clone(),
        store.clone(),
    )
    .with_selection(selection.clone());
    let mut updates = dialog.subscribe();

    let mut handle = match dialog.start_generation().await? {
        Some(handle) => handle,
        None => bail!("A diagram is already being generated"),
    };
    config::save_selection(&store, &selection).await?;

    let renderer = TerminalRenderer;
    let mut stderr = std::io::stderr();
    loop {
        tokio::select! {
            joined = &mut handle => {
                joined.context("Generation task failed")?;
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = render_dialog(&updates.borrow_and_update(), &generators, &prefs);
                if view.show_progress {
                    write!(stderr, "\rGenerating...")?;
                } else if let Some(preview) = view.render_content(&renderer, prefs.content_scale) {
                    write!(stderr, "\r\x1b[2K{}", preview)?;
                }
                stderr.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Ctrl-C received");
                dialog.cancel_generation();
            }
        }
    }
    writeln!(stderr)?;

    let view = render_dialog(&dialog.snapshot(), &generators, &prefs);
    if let Some(notice) = &view.notice {
        eprintln!("{}", notice);
    }
    if let Some(error) = view.error_banner {
        dialog.close();
        bail!(error);
    }
    if let Some(text) = view.render_content(&renderer, prefs.content_scale) {
        println!("{}", text);
    }

    if args.commit {
        if matches!(view.content, ContentView::Block { .. }) && view.commit_enabled {
            let inserted = dialog.commit_result().await?;
            info!(message_id = inserted, "Diagram inserted into conversation {}", conversation.id);
        } else {
            warn!("Nothing to insert into the conversation");
        }
    }

    dialog.close();
    Ok(())
}
