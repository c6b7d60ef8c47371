use colloquy_core::orchestrator::{RunState, RunStatus};
use colloquy_core::transcript::{MessageKind, Transcript};

/// Render a finished transcript as a markdown conversation log.
pub fn render_markdown(transcript: &Transcript) -> String {
    let mut blocks = Vec::new();

    for m in transcript {
        match m.kind {
            MessageKind::Text => {
                let content = m.content.trim();
                if !content.is_empty() {
                    blocks.push(format!("**{}**:\n\n{}", m.speaker.name, content));
                }
            }
            MessageKind::ToolRequest => {
                let (tool, arguments) = match m.tool_call {
                    Some(ref call) => (
                        call.name.as_str(),
                        serde_json::to_string_pretty(&call.arguments).unwrap_or_else(|_| m.content.clone()),
                    ),
                    None => ("unknown", m.content.clone()),
                };
                blocks.push(format!(
                    "**Tool Call**: `{}` is calling `{}` with arguments:\n```json\n{}\n```",
                    m.speaker.name, tool, arguments
                ));
            }
            MessageKind::ToolResult => {
                let tool = m.tool_call.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown");
                let line = match m.error {
                    None => format!("**Tool Result**: `{tool}` returned data successfully."),
                    Some(kind) => format!("**Tool Result**: `{tool}` reported `{kind}`: {}", m.content.trim()),
                };
                blocks.push(line);
            }
        }
    }

    blocks.join("\n\n")
}

/// One-line summary of how the run ended.
pub fn status_line(state: &RunState) -> String {
    let turns = match state.turn_count {
        1 => "1 turn".to_string(),
        n => format!("{n} turns"),
    };
    match state.status {
        RunStatus::Completed => format!(
            "Completed after {turns} ({})",
            state.stop_reason.as_deref().unwrap_or("done")
        ),
        RunStatus::Cancelled => format!("Cancelled after {turns}"),
        RunStatus::Failed => format!(
            "Failed after {turns}: {} {}",
            state.error.map(|k| k.to_string()).unwrap_or_default(),
            state.reason.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        RunStatus::Running => format!("Running ({turns})"),
    }
}
