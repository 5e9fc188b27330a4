//! Post-processing for generator output.
//!
//! Models regularly emit PlantUML without a surrounding code fence, close a
//! mind map twice, or leave an empty fenced block next to the real one. The
//! rules below patch those mistakes. They are plain text substitutions and
//! must run in order.

use regex::Regex;
use std::sync::LazyLock;

const FENCE: &str = "```";

static DOUBLE_MINDMAP_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@endmindmap(?:\n@enduml)+").expect("valid regex"));

static EMPTY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:\n```)+").expect("valid regex"));

/// Applies the fixups once. Running it again on its own output is a no-op.
pub fn repair_diagram_text(text: &str) -> String {
    let mut repaired = if text.starts_with("@start") {
        format!("{FENCE}\n{text}\n{FENCE}")
    } else {
        text.to_string()
    };

    repaired = DOUBLE_MINDMAP_END
        .replace_all(&repaired, "@endmindmap")
        .into_owned();

    EMPTY_FENCE.replace_all(&repaired, FENCE).into_owned()
}
