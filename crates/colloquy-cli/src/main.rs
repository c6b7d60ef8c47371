use anyhow::{bail, Result};
use clap::Parser;
use colloquy_core::agent::AgentRole;
use colloquy_core::config::ParticipantSettings;
use colloquy_core::scheduler::SelectionMode;
use colloquy_core::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Colloquy - run a team of model-backed agents on one task")]
#[command(version)]
struct Cli {
    /// The task handed to the team
    task: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the model of every participant
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama server URL
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum number of turns
    #[arg(long)]
    max_turns: Option<u32>,

    /// Let a model pick the next speaker instead of a fixed rotation
    #[arg(long)]
    selector: bool,

    /// Add a human participant with this name who answers on stdin
    #[arg(long)]
    human: Option<String>,

    /// Phrase that ends the run when a participant says it (repeatable)
    #[arg(long = "stop-on")]
    stop_on: Vec<String>,

    /// Write the final markdown transcript to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut settings = match cli.config {
        Some(ref path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    if let Some(ref model) = cli.model {
        settings.llm.default_model = model.clone();
        for p in &mut settings.participants {
            p.model = Some(model.clone());
        }
    }
    if let Some(ref url) = cli.base_url {
        settings.llm.base_url = url.clone();
    }
    if let Some(max_turns) = cli.max_turns {
        settings.team.max_turns = max_turns;
    }
    if cli.selector {
        settings.team.selection = SelectionMode::Selector;
    }
    if !cli.stop_on.is_empty() {
        settings.team.termination_markers = cli.stop_on.clone();
    }
    if let Some(ref name) = cli.human {
        settings.participants.push(ParticipantSettings {
            name: name.clone(),
            role: AgentRole::Human,
            description: "A person who reviews the work and can approve it".to_string(),
            model: None,
            system_prompt: None,
            tools: Vec::new(),
            temperature: None,
            top_k: None,
            reflect_on_tool_use: true,
            max_tool_rounds: None,
        });
    }

    if cli.save_config {
        let path = cli.config.clone().unwrap_or_else(Settings::config_path);
        settings.save_to(&path)?;
        eprintln!("Configuration written to {}", path.display());
        return Ok(());
    }

    let Some(task) = cli.task else {
        bail!("no task given; pass the task as the first argument");
    };

    let state = colloquy_cli::app::run_task(&settings, &task, cli.output.as_deref()).await?;
    if !state.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
