use crate::agent::ParticipantId;
use crate::error::ErrorKind;
use crate::tools::ToolCall;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ToolRequest,
    ToolResult,
}

/// One immutable entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub speaker: ParticipantId,
    pub content: String,
    pub kind: MessageKind,
    pub sequence_no: u64,
    /// The call a tool request or tool result belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Classification of a failed or empty tool result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl Message {
    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }

    pub fn call_id(&self) -> Option<&str> {
        self.tool_call.as_ref().map(|c| c.id.as_str())
    }
}

/// The ordered record of a run. Only the aggregator can append to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn append(
        &mut self,
        speaker: ParticipantId,
        kind: MessageKind,
        content: String,
        tool_call: Option<ToolCall>,
        error: Option<ErrorKind>,
    ) -> &Message {
        let sequence_no = self.messages.len() as u64;
        self.messages.push(Message {
            speaker,
            content,
            kind,
            sequence_no,
            tool_call,
            error,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Speaker of the most recent message not spoken by `user`.
    pub fn last_speaker(&self) -> Option<&ParticipantId> {
        self.messages
            .iter()
            .rev()
            .map(|m| &m.speaker)
            .find(|s| **s != ParticipantId::user())
    }

    /// Bounded view: the opening task message plus the last `max_messages`
    /// entries. Sequence numbers are preserved.
    pub fn window(&self, max_messages: usize) -> Transcript {
        if self.messages.len() <= max_messages.saturating_add(1) {
            return self.clone();
        }
        if max_messages == 0 {
            return Transcript {
                messages: self.messages[..1].to_vec(),
            };
        }
        let mut start = self.messages.len() - max_messages;
        // never cut a tool result off from its request
        if self.messages[start].kind == MessageKind::ToolResult && start > 1 {
            start -= 1;
        }
        let mut messages = Vec::with_capacity(self.messages.len() - start + 1);
        messages.push(self.messages[0].clone());
        messages.extend_from_slice(&self.messages[start..]);
        Transcript { messages }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
