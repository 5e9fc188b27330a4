// Handles communication with external AI API (Ollama)

use crate::error::GenerationError;
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Receives the full text generated so far, never a delta.
pub type PartialCallback = Box<dyn FnMut(String) + Send>;

/// A backend that streams generated text for a prompt.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Streams a completion, calling `on_partial` with the accumulated text
    /// after every update. Resolves with the final text, or with
    /// [`GenerationError::Cancelled`] once `cancellation_token` fires.
    async fn stream(
        &self,
        generator: &str,
        prompt: &str,
        cancellation_token: CancellationToken,
        on_partial: PartialCallback,
    ) -> Result<String, GenerationError>;
}

#[derive(Deserialize)]
struct AIResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

static RE_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*<think>.*?</think>\s*").expect("valid regex"));

/// Drops a leading reasoning block. While the block is still open nothing is visible yet.
pub fn strip_think(text: &str) -> String {
    if let Some(found) = RE_THINK.find(text) {
        return text[found.end()..].to_string();
    }
    if text.trim_start().starts_with("<think>") {
        return String::new();
    }
    text.to_string()
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists the locally installed models, i.e. the available generators.
    pub async fn fetch_models(&self) -> Result<Vec<String>, GenerationError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status()));
        }

        let tags: TagsResponse = response.json().await?;
        let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        debug!(count = models.len(), "Loaded models");
        Ok(models)
    }
}

/// Applies one NDJSON line to the accumulated text. Returns `true` when the
/// generator reported it is done.
fn apply_line(line: &[u8], full_response: &mut String) -> Result<bool, GenerationError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }

    let parsed: AIResponse = serde_json::from_str(line)?;
    if let Some(error) = parsed.error {
        return Err(GenerationError::Backend(error));
    }

    full_response.push_str(&parsed.response);
    Ok(parsed.done)
}

#[async_trait]
impl GenerationService for OllamaClient {
    async fn stream(
        &self,
        generator: &str,
        prompt: &str,
        cancellation_token: CancellationToken,
        mut on_partial: PartialCallback,
    ) -> Result<String, GenerationError> {
        let request_body = serde_json::json!({
            "model": generator,
            "prompt": prompt,
            "stream": true,
        });

        debug!(generator, "Sending generation request");
        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                info!("Generation cancelled before the response arrived");
                return Err(GenerationError::Cancelled);
            }
            response = request => response?,
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Generation request rejected");
            return Err(GenerationError::Status(response.status()));
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut full_response = String::new();
        let mut done = false;

        while !done {
            let chunk = tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    info!("Generation task was cancelled");
                    return Err(GenerationError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };
            pending.extend_from_slice(&chunk?);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let before = full_response.len();
                done = apply_line(&line, &mut full_response)?;
                if full_response.len() != before {
                    trace!(len = full_response.len(), "Partial response");
                    on_partial(strip_think(&full_response));
                }
                if done {
                    break;
                }
            }
        }

        // The last line may arrive without a trailing newline.
        if !done && !pending.is_empty() {
            let before = full_response.len();
            apply_line(&pending, &mut full_response)?;
            if full_response.len() != before {
                on_partial(strip_think(&full_response));
            }
        }

        Ok(strip_think(&full_response))
    }
}
