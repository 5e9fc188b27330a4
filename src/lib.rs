//! Diagram generation for chat conversations.
//!
//! A [`dialog::DiagramDialog`] asks a local Ollama model to summarize a
//! message as a diagram, streams the output, patches common generator
//! mistakes and can insert the result back into the conversation.

pub mod commands;
pub mod config;
pub mod db;
pub mod dialog;
pub mod error;
pub mod ollama_api;
pub mod prompt;
pub mod repair;
pub mod selection;
pub mod session;
pub mod view;
