pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod scheduler;
pub mod termination;
pub mod tools;
pub mod transcript;

// Re-export key types
pub use agent::{AgentAdapter, AgentRole, HumanAgent, HumanInput, ModelAgent, ParticipantId, TurnEvent};
pub use config::Settings;
pub use error::{ColloquyError, ErrorKind};
pub use llm::{LlmClient, LlmResponse, Message, OllamaClient, Role, StreamEvent};
pub use orchestrator::{RunEvent, RunHandle, RunState, RunStatus, Team, TeamOptions};
pub use scheduler::{ModelSelector, Selection, SelectionPolicy, SpeakerSelector, TurnScheduler};
pub use termination::{
    MentionCondition, SignalCondition, StepCeiling, TerminationCondition, TerminationEvaluator,
    TerminationSignal,
};
pub use tools::{Tool, ToolCall, ToolGateway, ToolRegistry, ToolResult};
pub use transcript::{MessageKind, Transcript, TranscriptAggregator};
