// User choices collected by the diagram dialog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    /// Let the generator pick whatever fits the content best.
    Auto,
    Flowchart,
    Sequence,
    Class,
    State,
    Activity,
    Mindmap,
    UseCase,
    Component,
    Gantt,
}

impl DiagramType {
    pub const ALL: [DiagramType; 10] = [
        DiagramType::Auto,
        DiagramType::Flowchart,
        DiagramType::Sequence,
        DiagramType::Class,
        DiagramType::State,
        DiagramType::Activity,
        DiagramType::Mindmap,
        DiagramType::UseCase,
        DiagramType::Component,
        DiagramType::Gantt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramType::Auto => "auto",
            DiagramType::Flowchart => "flowchart",
            DiagramType::Sequence => "sequence",
            DiagramType::Class => "class",
            DiagramType::State => "state",
            DiagramType::Activity => "activity",
            DiagramType::Mindmap => "mindmap",
            DiagramType::UseCase => "use_case",
            DiagramType::Component => "component",
            DiagramType::Gantt => "gantt",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiagramType::Auto => "Auto",
            DiagramType::Flowchart => "Flowchart",
            DiagramType::Sequence => "Sequence diagram",
            DiagramType::Class => "Class diagram",
            DiagramType::State => "State diagram",
            DiagramType::Activity => "Activity diagram",
            DiagramType::Mindmap => "Mind map",
            DiagramType::UseCase => "Use case diagram",
            DiagramType::Component => "Component diagram",
            DiagramType::Gantt => "Gantt chart",
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagramType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown diagram type: {}", s))
    }
}

/// Diagram description language the generator should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputSyntax {
    PlantUml,
    Mermaid,
    Graphviz,
}

impl OutputSyntax {
    pub const ALL: [OutputSyntax; 3] = [
        OutputSyntax::PlantUml,
        OutputSyntax::Mermaid,
        OutputSyntax::Graphviz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSyntax::PlantUml => "plant_uml",
            OutputSyntax::Mermaid => "mermaid",
            OutputSyntax::Graphviz => "graphviz",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputSyntax::PlantUml => "PlantUML",
            OutputSyntax::Mermaid => "Mermaid",
            OutputSyntax::Graphviz => "Graphviz DOT",
        }
    }
}

impl fmt::Display for OutputSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputSyntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputSyntax::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown output syntax: {}", s))
    }
}

/// Local dialog choices. Fields are independent; nothing is validated until
/// a generation is requested, and nothing is reset between attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub diagram_type: Option<DiagramType>,
    pub output_syntax: Option<OutputSyntax>,
    pub generator: Option<String>,
    pub custom_instruction: String,
    pub options_expanded: bool,
}

impl Selection {
    /// Returns the three required choices when all of them are present.
    pub fn complete(&self) -> Option<(DiagramType, OutputSyntax, &str)> {
        let generator = self.generator.as_deref().filter(|g| !g.trim().is_empty())?;
        Some((self.diagram_type?, self.output_syntax?, generator))
    }

    pub fn toggle_options(&mut self) {
        self.options_expanded = !self.options_expanded;
    }
}
