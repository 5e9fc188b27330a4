// Builds the prompt sent to the generator

use crate::selection::{DiagramType, OutputSyntax};

/// Everything needed for one generation attempt. Frozen once the stream starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub conversation_id: i64,
    pub message_id: i64,
    pub subject: String,
    pub diagram_type: DiagramType,
    pub output_syntax: OutputSyntax,
    pub generator: String,
    pub custom_instruction: String,
}

fn syntax_hint(syntax: OutputSyntax) -> &'static str {
    match syntax {
        OutputSyntax::PlantUml => {
            "Use PlantUML. Start with the matching @start marker (for example @startuml or @startmindmap) and end with its @end marker."
        }
        OutputSyntax::Mermaid => "Use Mermaid syntax.",
        OutputSyntax::Graphviz => "Use Graphviz DOT syntax.",
    }
}

fn diagram_hint(diagram_type: DiagramType) -> String {
    match diagram_type {
        DiagramType::Auto => "the diagram type that best fits the content".to_string(),
        other => format!("a {}", other.label().to_lowercase()),
    }
}

/// Composes the prompt from the selection, the conversation's system message
/// and the text being summarized.
pub fn build_prompt(request: &GenerationRequest, system_context: &str) -> String {
    let mut prompt = String::new();

    let system_context = system_context.trim();
    if !system_context.is_empty() {
        prompt.push_str("Conversation context:\n");
        prompt.push_str(system_context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!(
        "Summarize the content below as {}. {} Respond with only the diagram source inside a single fenced code block, without explanations.",
        diagram_hint(request.diagram_type),
        syntax_hint(request.output_syntax),
    ));

    let instruction = request.custom_instruction.trim();
    if !instruction.is_empty() {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(instruction);
    }

    prompt.push_str(&format!("\n\nContent:\n```\n{}\n```", request.subject));
    prompt
}
