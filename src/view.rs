// Presentation model for the diagram dialog

use crate::dialog::DialogState;
use crate::selection::{DiagramType, OutputSyntax, Selection};
use crate::session::GenerationState;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentScale {
    Small,
    #[default]
    Normal,
    Large,
}

impl ContentScale {
    pub fn font_size(&self) -> u16 {
        match self {
            ContentScale::Small => 12,
            ContentScale::Normal => 14,
            ContentScale::Large => 16,
        }
    }
}

impl FromStr for ContentScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(ContentScale::Small),
            "normal" => Ok(ContentScale::Normal),
            "large" => Ok(ContentScale::Large),
            other => Err(format!("unknown content scale: {}", other)),
        }
    }
}

/// Read-only UI preferences owned by the host application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiPreferences {
    pub mobile: bool,
    pub content_scale: ContentScale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Text is still streaming and may not parse yet.
    Streaming,
    Diagram,
}

/// Renders diagram-bearing text. Implemented by the host front end.
pub trait DiagramRenderer {
    fn render(&self, text: &str, mode: RenderMode, scale: ContentScale) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsPanel {
    pub diagram_types: Vec<Choice>,
    pub output_syntaxes: Vec<Choice>,
    pub generators: Vec<Choice>,
    pub custom_instruction: String,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentView {
    Block { text: String, mode: RenderMode },
    /// Content exists but the progress indicator stands in for it.
    Hidden,
    Divider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Play,
    Refresh,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryButton {
    pub label: &'static str,
    pub icon: Icon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogView {
    pub options: Option<OptionsPanel>,
    pub error_banner: Option<String>,
    pub notice: Option<String>,
    pub show_progress: bool,
    pub content: ContentView,
    pub commit_enabled: bool,
    pub primary: PrimaryButton,
    pub font_size: u16,
}

impl DialogView {
    pub fn render_content(&self, renderer: &dyn DiagramRenderer, scale: ContentScale) -> Option<String> {
        match &self.content {
            ContentView::Block { text, mode } => Some(renderer.render(text, *mode, scale)),
            _ => None,
        }
    }
}

fn options_panel(selection: &Selection, generators: &[String], prefs: &UiPreferences) -> OptionsPanel {
    let diagram_types = DiagramType::ALL
        .iter()
        .map(|t| Choice {
            value: t.as_str().to_string(),
            label: t.label().to_string(),
            selected: selection.diagram_type == Some(*t),
        })
        .collect();

    let output_syntaxes = OutputSyntax::ALL
        .iter()
        .map(|s| Choice {
            value: s.as_str().to_string(),
            label: s.label().to_string(),
            selected: selection.output_syntax == Some(*s),
        })
        .collect();

    let generators = generators
        .iter()
        .map(|g| Choice {
            value: g.clone(),
            label: g.clone(),
            selected: selection.generator.as_deref() == Some(g.as_str()),
        })
        .collect();

    OptionsPanel {
        diagram_types,
        output_syntaxes,
        generators,
        custom_instruction: selection.custom_instruction.clone(),
        columns: if prefs.mobile { 2 } else { 4 },
    }
}

fn primary_button(state: &DialogState) -> PrimaryButton {
    match state.generation {
        GenerationState::Generating { .. } => PrimaryButton {
            label: "Stop",
            icon: Icon::Stop,
        },
        _ if state.result.is_some() => PrimaryButton {
            label: "Regenerate",
            icon: Icon::Refresh,
        },
        _ => PrimaryButton {
            label: "Generate",
            icon: Icon::Play,
        },
    }
}

/// Builds the view for the current dialog state. `generators` are the
/// available generator ids, supplied by the host.
pub fn render_dialog(state: &DialogState, generators: &[String], prefs: &UiPreferences) -> DialogView {
    let expanded = state.selection.options_expanded;
    let generating = state.generation.is_running();

    let error_banner = state
        .error
        .clone()
        .or_else(|| state.generation.error_message().map(str::to_string));

    let content = match state.content() {
        None => ContentView::Divider,
        Some(text) if !generating || expanded => ContentView::Block {
            text: text.to_string(),
            mode: if generating {
                RenderMode::Streaming
            } else {
                RenderMode::Diagram
            },
        },
        Some(_) => ContentView::Hidden,
    };

    DialogView {
        options: expanded.then(|| options_panel(&state.selection, generators, prefs)),
        error_banner,
        notice: state.notice.clone(),
        show_progress: generating && !expanded,
        content,
        commit_enabled: state.can_commit(),
        primary: primary_button(state),
        font_size: prefs.content_scale.font_size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn generating(partial: &str, expanded: bool) -> DialogState {
        let mut state = DialogState::default();
        state.selection.options_expanded = expanded;
        state.generation = GenerationState::generating(CancellationToken::new());
        state.generation.replace_partial(partial.to_string());
        state
    }

    #[test]
    fn empty_dialog_shows_divider_and_generate() {
        let view = render_dialog(&DialogState::default(), &[], &UiPreferences::default());
        assert_eq!(view.content, ContentView::Divider);
        assert_eq!(view.primary.label, "Generate");
        assert_eq!(view.primary.icon, Icon::Play);
        assert!(!view.commit_enabled);
        assert!(!view.show_progress);
        assert!(view.options.is_none());
    }

    #[test]
    fn collapsed_generation_shows_progress_instead_of_preview() {
        let view = render_dialog(&generating("@startuml", false), &[], &UiPreferences::default());
        assert!(view.show_progress);
        assert_eq!(view.content, ContentView::Hidden);
        assert_eq!(view.primary.label, "Stop");
        assert_eq!(view.primary.icon, Icon::Stop);
        assert!(!view.commit_enabled);
    }

    #[test]
    fn expanded_generation_streams_preview_without_progress() {
        let view = render_dialog(&generating("@startuml", true), &[], &UiPreferences::default());
        assert!(!view.show_progress);
        assert_eq!(
            view.content,
            ContentView::Block {
                text: "@startuml".into(),
                mode: RenderMode::Streaming
            }
        );
    }

    #[test]
    fn finished_result_enables_commit_and_regenerate() {
        let mut state = DialogState::default();
        state.generation = GenerationState::Completed("```\n@startuml\n@enduml\n```".into());
        state.result = Some("```\n@startuml\n@enduml\n```".into());

        let view = render_dialog(&state, &[], &UiPreferences::default());
        assert!(view.commit_enabled);
        assert_eq!(view.primary.label, "Regenerate");
        assert!(matches!(view.content, ContentView::Block { mode: RenderMode::Diagram, .. }));
    }

    #[test]
    fn failure_shows_error_banner() {
        let mut state = DialogState::default();
        state.generation = GenerationState::Failed("API call failed with status: 500".into());

        let view = render_dialog(&state, &[], &UiPreferences::default());
        assert_eq!(view.error_banner.as_deref(), Some("API call failed with status: 500"));
    }

    #[test]
    fn validation_error_shows_banner_while_idle() {
        let mut state = DialogState::default();
        state.error = Some("No system message: the conversation must start with a system message".into());

        let view = render_dialog(&state, &[], &UiPreferences::default());
        assert!(matches!(state.generation, GenerationState::Idle));
        assert_eq!(view.error_banner, state.error);
        assert_eq!(view.content, ContentView::Divider);
        assert_eq!(view.primary.label, "Generate");
    }

    #[test]
    fn options_panel_marks_selection_and_follows_layout() {
        let mut state = DialogState::default();
        state.selection = Selection {
            diagram_type: Some(DiagramType::Mindmap),
            output_syntax: Some(OutputSyntax::PlantUml),
            generator: Some("llama3".into()),
            custom_instruction: "short".into(),
            options_expanded: true,
        };
        let prefs = UiPreferences {
            mobile: true,
            content_scale: ContentScale::Large,
        };

        let view = render_dialog(&state, &["llama3".into(), "qwen2".into()], &prefs);
        let panel = view.options.unwrap();
        assert_eq!(panel.columns, 2);
        assert_eq!(view.font_size, 16);
        let selected: Vec<&str> = panel
            .diagram_types
            .iter()
            .chain(&panel.output_syntaxes)
            .chain(&panel.generators)
            .filter(|c| c.selected)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(selected, vec!["mindmap", "plant_uml", "llama3"]);
    }

    struct Upper;

    impl DiagramRenderer for Upper {
        fn render(&self, text: &str, _mode: RenderMode, _scale: ContentScale) -> String {
            text.to_uppercase()
        }
    }

    #[test]
    fn content_is_delegated_to_renderer() {
        let view = render_dialog(&generating("a->b", true), &[], &UiPreferences::default());
        assert_eq!(
            view.render_content(&Upper, ContentScale::Normal).as_deref(),
            Some("A->B")
        );
    }
}
