// Tracks the lifecycle of a single diagram generation attempt

use tokio_util::sync::CancellationToken;

/// Text shown while the generator has not produced anything yet.
pub const PLACEHOLDER_TEXT: &str = "Loading...";

#[derive(Debug, Clone, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating {
        partial_text: String,
        cancellation_token: CancellationToken,
    },
    Completed(String),
    Failed(String),
}

impl GenerationState {
    pub fn generating(cancellation_token: CancellationToken) -> Self {
        GenerationState::Generating {
            partial_text: PLACEHOLDER_TEXT.to_string(),
            cancellation_token,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, GenerationState::Generating { .. })
    }

    /// The live cancel handle, if a generation is in flight.
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        match self {
            GenerationState::Generating {
                cancellation_token, ..
            } => Some(cancellation_token),
            _ => None,
        }
    }

    /// Replaces the partial text with the full text-so-far. Returns whether
    /// anything changed so watchers are only woken on real updates.
    pub fn replace_partial(&mut self, text: String) -> bool {
        match self {
            GenerationState::Generating { partial_text, .. } if !text.is_empty() => {
                if *partial_text == text {
                    return false;
                }
                *partial_text = text;
                true
            }
            _ => false,
        }
    }

    pub fn partial_text(&self) -> Option<&str> {
        match self {
            GenerationState::Generating { partial_text, .. } => Some(partial_text),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GenerationState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generating_starts_with_placeholder() {
        let state = GenerationState::generating(CancellationToken::new());
        assert!(state.is_running());
        assert_eq!(state.partial_text(), Some(PLACEHOLDER_TEXT));
        assert!(state.cancellation_token().is_some());
    }

    #[test]
    fn partial_text_is_replaced_not_appended() {
        let mut state = GenerationState::generating(CancellationToken::new());
        assert!(state.replace_partial("@startuml".into()));
        assert!(state.replace_partial("@startuml\nA->B".into()));
        assert_eq!(state.partial_text(), Some("@startuml\nA->B"));
    }

    #[test]
    fn empty_partials_are_ignored() {
        let mut state = GenerationState::generating(CancellationToken::new());
        assert!(!state.replace_partial(String::new()));
        assert_eq!(state.partial_text(), Some(PLACEHOLDER_TEXT));
    }

    #[test]
    fn partials_do_not_touch_finished_states() {
        let mut state = GenerationState::Completed("done".into());
        assert!(!state.replace_partial("late".into()));
        assert!(state.cancellation_token().is_none());
        assert!(matches!(state, GenerationState::Completed(ref t) if t == "done"));
    }
}
