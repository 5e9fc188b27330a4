//! The diagram dialog controller.
//!
//! A dialog is opened on one message of a conversation. It owns the user's
//! [`Selection`], runs at most one streaming generation at a time and, on
//! request, inserts the repaired result back into the conversation.
//!
//! All state lives in a [`watch`] channel: every mutation (user action,
//! partial delivery, finalization) goes through `send_modify` or
//! `send_if_modified`, and front ends re-render from [`DiagramDialog::subscribe`].

use crate::db::{ConversationStore, DiagramMessage};
use crate::error::{DialogError, GenerationError};
use crate::ollama_api::{GenerationService, PartialCallback};
use crate::prompt::{build_prompt, GenerationRequest};
use crate::repair::repair_diagram_text;
use crate::selection::Selection;
use crate::session::{GenerationState, PLACEHOLDER_TEXT};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Default)]
pub struct DialogState {
    pub selection: Selection,
    pub generation: GenerationState,
    /// Repaired text of the last finished attempt.
    pub result: Option<String>,
    /// Generator that produced `result`.
    pub result_generator: Option<String>,
    /// Validation or generation failure shown to the user.
    pub error: Option<String>,
    /// Benign status, e.g. after the user stopped a generation.
    pub notice: Option<String>,
    pub closed: bool,
}

impl DialogState {
    /// Text to preview: the live partial while generating, otherwise the result.
    pub fn content(&self) -> Option<&str> {
        self.generation
            .partial_text()
            .or(self.result.as_deref())
            .filter(|text| !text.is_empty())
    }

    pub fn can_commit(&self) -> bool {
        !self.generation.is_running()
            && self
                .result
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }
}

pub struct DiagramDialog {
    conversation_id: i64,
    message_id: i64,
    subject: String,
    state: Arc<watch::Sender<DialogState>>,
    service: Arc<dyn GenerationService>,
    store: Arc<dyn ConversationStore>,
}

impl DiagramDialog {
    pub fn new(
        conversation_id: i64,
        message_id: i64,
        subject: impl Into<String>,
        service: Arc<dyn GenerationService>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let (state, _) = watch::channel(DialogState::default());
        Self {
            conversation_id,
            message_id,
            subject: subject.into(),
            state: Arc::new(state),
            service,
            store,
        }
    }

    pub fn with_selection(self, selection: Selection) -> Self {
        self.state.send_modify(|s| s.selection = selection);
        self
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    pub fn message_id(&self) -> i64 {
        self.message_id
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DialogState {
        self.state.borrow().clone()
    }

    pub fn update_selection(&self, update: impl FnOnce(&mut Selection)) {
        self.state.send_modify(|s| update(&mut s.selection));
    }

    fn report(&self, err: DialogError) -> DialogError {
        warn!(conversation_id = self.conversation_id, "{}", err);
        let message = err.to_string();
        self.state.send_modify(|s| s.error = Some(message));
        err
    }

    async fn build_request(&self, selection: &Selection) -> Result<(GenerationRequest, String), DialogError> {
        let Some((diagram_type, output_syntax, generator)) = selection.complete() else {
            return Err(DialogError::InvalidSelection);
        };

        let conversation = self
            .store
            .conversation(self.conversation_id)
            .await?
            .ok_or(DialogError::InvalidSelection)?;

        let system_context = conversation
            .system_message()
            .ok_or(DialogError::NoSystemMessage)?
            .message
            .clone();

        let request = GenerationRequest {
            conversation_id: self.conversation_id,
            message_id: self.message_id,
            subject: self.subject.clone(),
            diagram_type,
            output_syntax,
            generator: generator.to_string(),
            custom_instruction: selection.custom_instruction.clone(),
        };
        Ok((request, system_context))
    }

    /// Starts a generation with the current selection.
    ///
    /// Returns `Ok(None)` without doing anything while another generation is
    /// in flight. On success the returned task resolves once the attempt has
    /// been finalized.
    pub async fn start_generation(&self) -> Result<Option<JoinHandle<()>>, DialogError> {
        if self.state.borrow().generation.cancellation_token().is_some() {
            debug!("Generation already running, ignoring start");
            return Ok(None);
        }

        let selection = self.state.borrow().selection.clone();
        let (request, system_context) = match self.build_request(&selection).await {
            Ok(built) => built,
            Err(err) => return Err(self.report(err)),
        };

        let cancellation_token = CancellationToken::new();
        let started = self.state.send_if_modified(|s| {
            if s.generation.cancellation_token().is_some() {
                return false;
            }
            s.generation = GenerationState::generating(cancellation_token.clone());
            s.error = None;
            s.notice = None;
            true
        });
        if !started {
            debug!("Generation started concurrently, ignoring start");
            return Ok(None);
        }

        let prompt = build_prompt(&request, &system_context);
        info!(
            conversation_id = request.conversation_id,
            message_id = request.message_id,
            generator = %request.generator,
            diagram_type = %request.diagram_type,
            output_syntax = %request.output_syntax,
            "Starting diagram generation"
        );

        let state = Arc::clone(&self.state);
        let service = Arc::clone(&self.service);
        Ok(Some(tokio::spawn(run_generation(
            state,
            service,
            request,
            prompt,
            cancellation_token,
        ))))
    }

    /// Signals the running generation to stop. The attempt resolves to
    /// `Idle` once the stream reports the cancellation.
    pub fn cancel_generation(&self) -> bool {
        let token = self.state.borrow().generation.cancellation_token().cloned();
        match token {
            Some(token) => {
                info!(conversation_id = self.conversation_id, "Cancelling diagram generation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Appends the result to the conversation and closes the dialog.
    pub async fn commit_result(&self) -> Result<i64, DialogError> {
        let (running, result, generator) = {
            let s = self.state.borrow();
            (
                s.generation.is_running(),
                s.result.clone(),
                s.result_generator.clone().or_else(|| s.selection.generator.clone()),
            )
        };

        if running {
            return Err(self.report(DialogError::GenerationInFlight));
        }
        let Some(text) = result.filter(|text| !text.trim().is_empty()) else {
            return Err(self.report(DialogError::NoResult));
        };
        let Some(generator) = generator else {
            return Err(self.report(DialogError::InvalidSelection));
        };

        let message = DiagramMessage::new(text, generator);
        let message_id = match self.store.append_message(self.conversation_id, message).await {
            Ok(id) => id,
            Err(err) => return Err(self.report(err.into())),
        };

        self.close();
        Ok(message_id)
    }

    /// Tears the dialog down, cancelling any live generation.
    pub fn close(&self) {
        let token = self.state.borrow().generation.cancellation_token().cloned();
        if let Some(token) = token {
            if !token.is_cancelled() {
                info!(conversation_id = self.conversation_id, "Dialog closed during generation, cancelling");
                token.cancel();
            }
        }

        self.state.send_if_modified(|s| {
            let changed = !s.closed;
            s.closed = true;
            changed
        });
    }
}

impl Drop for DiagramDialog {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_generation(
    state: Arc<watch::Sender<DialogState>>,
    service: Arc<dyn GenerationService>,
    request: GenerationRequest,
    prompt: String,
    cancellation_token: CancellationToken,
) {
    let partial_state = Arc::clone(&state);
    let on_partial: PartialCallback = Box::new(move |text: String| {
        if text.is_empty() {
            return;
        }
        trace!(len = text.len(), "Partial diagram text");
        partial_state.send_if_modified(|s| s.generation.replace_partial(text));
    });

    let outcome = service
        .stream(&request.generator, &prompt, cancellation_token, on_partial)
        .await;

    finalize(&state, &request.generator, outcome);
}

/// Resolves an attempt. Runs exactly once per attempt and always clears the cancel handle.
fn finalize(state: &watch::Sender<DialogState>, generator: &str, outcome: Result<String, GenerationError>) {
    state.send_modify(|s| {
        let last_text = s
            .generation
            .partial_text()
            .unwrap_or(PLACEHOLDER_TEXT)
            .to_string();

        let text = match outcome {
            Ok(final_text) => {
                // The returned text is the newest known text; a silent stream leaves the placeholder.
                let known = if final_text.is_empty() { last_text } else { final_text };
                let repaired = repair_diagram_text(&known);
                info!(len = repaired.len(), "Diagram generation completed");
                s.generation = GenerationState::Completed(repaired.clone());
                repaired
            }
            Err(err) if err.is_cancelled() => {
                info!("Diagram generation interrupted");
                s.generation = GenerationState::Idle;
                s.notice = Some(err.to_string());
                repair_diagram_text(&last_text)
            }
            Err(err) => {
                warn!(error = %err, "Diagram generation failed");
                let message = err.to_string();
                s.generation = GenerationState::Failed(message.clone());
                s.error = Some(message);
                repair_diagram_text(&last_text)
            }
        };

        s.result = Some(text).filter(|t| !t.is_empty());
        s.result_generator = Some(generator.to_string());
    });
}
