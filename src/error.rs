// Error types shared across the dialog, the store and the Ollama client

use thiserror::Error;

/// Failure of a streaming generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Interrupted")]
    Cancelled,

    #[error("Failed to make API call: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API call failed with status: {0}")]
    Status(reqwest::StatusCode),

    #[error("Generator reported an error: {0}")]
    Backend(String),

    #[error("Malformed stream line: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("Unknown message role: {0}")]
    InvalidRole(String),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the diagram dialog. The `Display` text is what the user sees.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("Invalid selection: choose a diagram type, an output syntax and a generator for an existing conversation")]
    InvalidSelection,

    #[error("No system message: the conversation must start with a system message")]
    NoSystemMessage,

    #[error("Nothing to insert: generate a diagram first")]
    NoResult,

    #[error("A diagram is still being generated")]
    GenerationInFlight,

    #[error(transparent)]
    Store(#[from] StoreError),
}
