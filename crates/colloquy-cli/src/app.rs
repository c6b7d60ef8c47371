use anyhow::Result;
use colloquy_core::agent::{HumanInput, TurnEvent};
use colloquy_core::orchestrator::{RunEvent, RunState};
use colloquy_core::Settings;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::human::StdinInput;
use crate::render::{render_markdown, status_line};

/// Run one task with the configured team, streaming progress to the terminal.
pub async fn run_task(settings: &Settings, task: &str, output: Option<&Path>) -> Result<RunState> {
    let human_input: Option<Arc<dyn HumanInput>> = if settings
        .participants
        .iter()
        .any(|p| p.role == colloquy_core::AgentRole::Human)
    {
        Some(Arc::new(StdinInput::new()))
    } else {
        None
    };

    let team = settings.build_team(human_input)?;
    let mut handle = team.start_run(task);

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling run");
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    if let Some(mut events) = handle.take_events() {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    }

    let state = handle.result().await?;
    let markdown = render_markdown(&state.transcript);
    match output {
        Some(path) => {
            std::fs::write(path, &markdown)?;
            eprintln!("Transcript written to {}", path.display());
        }
        None => println!("\n---\n\n{markdown}"),
    }
    eprintln!("{}", status_line(&state));
    Ok(state)
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::SpeakerSelected { speaker, turn } => {
            eprintln!("\n── turn {turn}: {speaker} ──");
        }
        RunEvent::Turn { event, .. } => match event {
            TurnEvent::TextDelta(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::ToolRequest(call) => eprintln!("\n[tool: {} {}]", call.name, call.arguments),
            TurnEvent::ToolResult(result) => {
                let icon = match result.error {
                    None => "ok".to_string(),
                    Some(kind) => kind.to_string(),
                };
                eprintln!("[{}: {icon}]", result.call.name);
            }
            TurnEvent::TurnEnd => println!(),
            TurnEvent::TurnFailed { kind, reason } => eprintln!("\nTurn failed ({kind}): {reason}"),
        },
        RunEvent::TurnRetried {
            speaker,
            attempt,
            kind,
            reason,
        } => eprintln!("\n{speaker} failed ({kind}): {reason}; retrying (attempt {attempt})"),
        RunEvent::RunStarted { .. } | RunEvent::TurnCompleted { .. } | RunEvent::RunFinished { .. } => {}
    }
}
