use crate::agent::{ParticipantId, TurnEvent, TurnStream};
use crate::error::ColloquyError;
use crate::transcript::Transcript;
use async_stream::stream;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Source of a person's replies. Any text is accepted.
#[async_trait::async_trait]
pub trait HumanInput: Send + Sync {
    /// Wait until the person answers. Must suspend, not spin.
    async fn request_input(
        &self,
        participant: &ParticipantId,
        transcript: &Transcript,
    ) -> Result<String, ColloquyError>;
}

/// Human input fed through a channel, for UIs and tests.
pub struct ChannelInput {
    responses: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ChannelInput {
    /// Returns the input and the sender a UI pushes replies into.
    pub fn new() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                responses: Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl HumanInput for ChannelInput {
    async fn request_input(
        &self,
        participant: &ParticipantId,
        _transcript: &Transcript,
    ) -> Result<String, ColloquyError> {
        let mut responses = self.responses.lock().await;
        responses.recv().await.ok_or_else(|| {
            ColloquyError::DependencyUnavailable(format!(
                "input channel for {participant} was closed"
            ))
        })
    }
}

/// A participant whose turn is whatever a person types.
pub struct HumanAgent {
    participant: ParticipantId,
    input: Arc<dyn HumanInput>,
}

impl HumanAgent {
    pub fn new(participant: ParticipantId, input: Arc<dyn HumanInput>) -> Self {
        Self { participant, input }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn produce_turn(&self, view: Transcript) -> TurnStream<'_> {
        Box::pin(stream! {
            debug!(participant = %self.participant, "Waiting for human input");
            match self.input.request_input(&self.participant, &view).await {
                Ok(text) => {
                    yield TurnEvent::TextDelta(text);
                    yield TurnEvent::TurnEnd;
                }
                Err(e) => {
                    yield TurnEvent::TurnFailed { kind: e.kind(), reason: e.to_string() };
                }
            }
        })
    }
}
