mod human;
mod model;
mod participant;

pub use human::{ChannelInput, HumanAgent, HumanInput};
pub use model::{ApprovalFn, ModelAgent, DEFAULT_MAX_TOOL_ROUNDS};
pub use participant::{AgentRole, ParticipantId};

use crate::error::ErrorKind;
use crate::tools::{ToolCall, ToolResult};
use crate::transcript::Transcript;
use futures::Stream;
use std::pin::Pin;

/// What a participant produces while it holds the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    TextDelta(String),
    ToolRequest(ToolCall),
    ToolResult(ToolResult),
    TurnEnd,
    /// The turn could not be completed. Always the last event of its stream.
    TurnFailed { kind: ErrorKind, reason: String },
}

/// Lazily produced events of one turn. Nothing runs until it is polled.
pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = TurnEvent> + Send + 'a>>;

/// A participant behind the uniform turn-producing capability.
pub enum AgentAdapter {
    ModelBacked(ModelAgent),
    HumanBacked(HumanAgent),
}

impl AgentAdapter {
    pub fn participant(&self) -> &ParticipantId {
        match self {
            AgentAdapter::ModelBacked(agent) => agent.participant(),
            AgentAdapter::HumanBacked(agent) => agent.participant(),
        }
    }

    /// Produce the events of one turn given the transcript so far.
    pub fn produce_turn(&self, view: Transcript) -> TurnStream<'_> {
        match self {
            AgentAdapter::ModelBacked(agent) => agent.produce_turn(view),
            AgentAdapter::HumanBacked(agent) => agent.produce_turn(view),
        }
    }
}

impl From<ModelAgent> for AgentAdapter {
    fn from(agent: ModelAgent) -> Self {
        AgentAdapter::ModelBacked(agent)
    }
}

impl From<HumanAgent> for AgentAdapter {
    fn from(agent: HumanAgent) -> Self {
        AgentAdapter::HumanBacked(agent)
    }
}
