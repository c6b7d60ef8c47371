use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentAdapter, AgentRole, HumanAgent, HumanInput, ModelAgent, ParticipantId};
use crate::error::{ColloquyError, Result};
use crate::llm::{LlmClient, OllamaClient, SamplingOptions, DEFAULT_OLLAMA_URL};
use crate::orchestrator::{InvalidSelectionFallback, Team, TeamOptions};
use crate::scheduler::{ModelSelector, SelectionMode, SelectionPolicy};
use crate::termination::{MarkerMatch, MentionCondition};
use crate::tools::{ToolGateway, ToolRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub team: TeamSettings,
    #[serde(default = "default_participants")]
    pub participants: Vec<ParticipantSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub base_url: String,
    /// Used by participants without their own model and by the selector.
    pub default_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamSettings {
    pub selection: SelectionMode,
    pub max_turns: u32,
    pub termination_markers: Vec<String>,
    pub marker_match: MarkerMatch,
    pub on_invalid_selection: InvalidSelectionFallback,
    pub allow_repeated_speaker: bool,
    pub turn_retries: u32,
    pub history_window: Option<usize>,
    /// Model behind dynamic selection; falls back to `llm.default_model`.
    pub selector_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSettings {
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub description: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    #[serde(default = "default_true")]
    pub reflect_on_tool_use: bool,
    pub max_tool_rounds: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl ParticipantSettings {
    pub fn id(&self) -> ParticipantId {
        ParticipantId::new(&self.name, self.role, &self.description)
    }

    fn sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature,
            top_k: self.top_k,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: "granite3.3:8b".to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            selection: SelectionMode::RoundRobin,
            max_turns: 3,
            termination_markers: Vec::new(),
            marker_match: MarkerMatch::Substring,
            on_invalid_selection: InvalidSelectionFallback::Abort,
            allow_repeated_speaker: true,
            turn_retries: 0,
            history_window: None,
            selector_model: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            team: TeamSettings::default(),
            participants: default_participants(),
        }
    }
}

/// The literature-review team: a researcher with arXiv search, a reviewer
/// and a writer.
fn default_participants() -> Vec<ParticipantSettings> {
    vec![
        ParticipantSettings {
            name: "Researcher".to_string(),
            role: AgentRole::Researcher,
            description: "Searches arXiv and collects candidate papers".to_string(),
            model: Some("llama3.1:8b".to_string()),
            system_prompt: None,
            tools: vec!["arxiv_search".to_string()],
            temperature: Some(0.2),
            top_k: Some(10),
            reflect_on_tool_use: false,
            max_tool_rounds: None,
        },
        ParticipantSettings {
            name: "Reviewer".to_string(),
            role: AgentRole::Reviewer,
            description: "Selects the most relevant papers".to_string(),
            model: Some("granite3.3:8b".to_string()),
            system_prompt: None,
            tools: Vec::new(),
            temperature: Some(0.7),
            top_k: Some(50),
            reflect_on_tool_use: true,
            max_tool_rounds: None,
        },
        ParticipantSettings {
            name: "Writer".to_string(),
            role: AgentRole::Writer,
            description: "Writes the literature review".to_string(),
            model: Some("granite3.3:8b".to_string()),
            system_prompt: None,
            tools: Vec::new(),
            temperature: Some(0.7),
            top_k: Some(50),
            reflect_on_tool_use: true,
            max_tool_rounds: None,
        },
    ]
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colloquy")
            .join("config.toml")
    }

    /// Load from the default location, or defaults if it is missing or broken.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config"),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ColloquyError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ColloquyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self, registry: &ToolRegistry, has_human_input: bool) -> Result<()> {
        if self.participants.is_empty() {
            return Err(ColloquyError::Config("no participants configured".into()));
        }
        if self.team.max_turns == 0 {
            return Err(ColloquyError::Config("team.max_turns must be at least 1".into()));
        }
        if self.team.history_window == Some(0) {
            return Err(ColloquyError::Config("team.history_window must be at least 1".into()));
        }

        let mut names = HashSet::new();
        for p in &self.participants {
            if p.name.trim().is_empty() {
                return Err(ColloquyError::Config("participant name must not be empty".into()));
            }
            if p.role == AgentRole::User || p.name == ParticipantId::user().name {
                return Err(ColloquyError::Config(format!(
                    "'{}': the user role is reserved for the task message",
                    p.name
                )));
            }
            if !names.insert(p.name.as_str()) {
                return Err(ColloquyError::Config(format!("duplicate participant name '{}'", p.name)));
            }
            if let Some(unknown) = p.tools.iter().find(|t| !registry.contains(t)) {
                return Err(ColloquyError::Config(format!(
                    "participant '{}' uses unknown tool '{unknown}'",
                    p.name
                )));
            }
            if p.role == AgentRole::Human && !has_human_input {
                return Err(ColloquyError::Config(format!(
                    "participant '{}' is human but no input source was provided",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Build a team talking to the configured Ollama server.
    pub fn build_team(&self, human_input: Option<Arc<dyn HumanInput>>) -> Result<Team> {
        let timeout = Duration::from_secs(self.llm.request_timeout_secs);
        let base_url = self.llm.base_url.clone();
        self.build_team_with(
            ToolRegistry::builtin(),
            human_input,
            |model: &str, options: SamplingOptions| -> Arc<dyn LlmClient> {
                Arc::new(
                    OllamaClient::new(model)
                        .with_base_url(&base_url)
                        .with_timeout(timeout)
                        .with_options(options),
                )
            },
        )
    }

    /// Build a team with injected backends. `make_client` is called once per
    /// distinct model and sampling configuration.
    pub fn build_team_with<F>(
        &self,
        registry: ToolRegistry,
        human_input: Option<Arc<dyn HumanInput>>,
        mut make_client: F,
    ) -> Result<Team>
    where
        F: FnMut(&str, SamplingOptions) -> Arc<dyn LlmClient>,
    {
        self.validate(&registry, human_input.is_some())?;

        let gateway = Arc::new(ToolGateway::new(registry));
        let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
        let mut client_for = |model: &str, options: SamplingOptions| {
            let key = format!("{model}|{:?}|{:?}", options.temperature, options.top_k);
            clients
                .entry(key)
                .or_insert_with(|| make_client(model, options))
                .clone()
        };

        let mut adapters = Vec::with_capacity(self.participants.len());
        for p in &self.participants {
            if p.role == AgentRole::Human {
                // validated above
                let Some(ref input) = human_input else {
                    return Err(ColloquyError::Config("missing human input".into()));
                };
                adapters.push(AgentAdapter::from(HumanAgent::new(p.id(), input.clone())));
                continue;
            }

            let model = p.model.as_deref().unwrap_or(&self.llm.default_model);
            let mut agent = ModelAgent::new(p.id(), client_for(model, p.sampling()))
                .with_reflect_on_tool_use(p.reflect_on_tool_use);
            if let Some(ref prompt) = p.system_prompt {
                agent = agent.with_system_prompt(prompt);
            }
            if !p.tools.is_empty() {
                agent = agent.with_tools(gateway.clone(), p.tools.clone());
            }
            if let Some(rounds) = p.max_tool_rounds {
                agent = agent.with_max_tool_rounds(rounds);
            }
            if let Some(window) = self.team.history_window {
                agent = agent.with_history_window(window);
            }
            adapters.push(AgentAdapter::from(agent));
        }

        let policy = match self.team.selection {
            SelectionMode::RoundRobin => SelectionPolicy::RoundRobin,
            SelectionMode::Selector => {
                let model = self
                    .team
                    .selector_model
                    .as_deref()
                    .unwrap_or(&self.llm.default_model);
                let llm = client_for(model, SamplingOptions::default());
                SelectionPolicy::Dynamic(Arc::new(ModelSelector::new(llm)))
            }
        };

        let mut team = Team::new(adapters, policy, self.team.max_turns)?
            .with_allow_repeated_speaker(self.team.allow_repeated_speaker)
            .with_options(TeamOptions {
                turn_retries: self.team.turn_retries,
                on_invalid_selection: self.team.on_invalid_selection,
            });
        if !self.team.termination_markers.is_empty() {
            team = team.with_termination(MentionCondition::new(
                self.team.termination_markers.clone(),
                self.team.marker_match,
            )?);
        }
        Ok(team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_literature_review_team() {
        let settings = Settings::default();
        let names: Vec<_> = settings.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Researcher", "Reviewer", "Writer"]);
        assert_eq!(settings.team.max_turns, 3);
        assert_eq!(settings.team.selection, SelectionMode::RoundRobin);

        let researcher = &settings.participants[0];
        assert_eq!(researcher.model.as_deref(), Some("llama3.1:8b"));
        assert_eq!(researcher.tools, vec!["arxiv_search"]);
        assert!(!researcher.reflect_on_tool_use);
    }

    #[test]
    fn validate_rejects_bad_teams() {
        let registry = ToolRegistry::builtin();

        let mut s = Settings::default();
        s.participants[1].name = "Researcher".into();
        assert!(matches!(s.validate(&registry, false), Err(ColloquyError::Config(_))));

        let mut s = Settings::default();
        s.participants[0].tools = vec!["web_search".into()];
        assert!(s.validate(&registry, false).is_err());

        let mut s = Settings::default();
        s.participants[2].role = AgentRole::Human;
        assert!(s.validate(&registry, false).is_err());
        assert!(s.validate(&registry, true).is_ok());

        let mut s = Settings::default();
        s.team.max_turns = 0;
        assert!(s.validate(&registry, false).is_err());
    }

    #[test]
    fn partial_team_section_fills_defaults() {
        let toml = r#"
            [llm]
            base_url = "http://gpu-box:11434"
            default_model = "qwen2.5:7b"
            request_timeout_secs = 60

            [team]
            selection = "selector"
            termination_markers = ["APPROVE"]
            marker_match = "whole_word"

            [[participants]]
            name = "Planner"
            role = "assistant"
        "#;
        let s: Settings = toml::from_str(toml).unwrap();
        assert_eq!(s.team.selection, SelectionMode::Selector);
        assert_eq!(s.team.max_turns, 3);
        assert_eq!(s.team.marker_match, MarkerMatch::WholeWord);
        assert!(s.participants[0].reflect_on_tool_use);
        assert!(s.participants[0].tools.is_empty());
    }
}
