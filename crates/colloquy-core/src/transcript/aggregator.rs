use crate::agent::{ParticipantId, TurnEvent};
use crate::error::ColloquyError;
use crate::transcript::message::{MessageKind, Transcript};
use tracing::debug;

struct OpenText {
    speaker: ParticipantId,
    content: String,
}

/// Folds the event stream of the speaking participant into the transcript.
///
/// Consecutive text deltas from one speaker accumulate in a single open
/// message, which is committed when a tool event, a turn boundary or a
/// different speaker arrives.
pub struct TranscriptAggregator {
    transcript: Transcript,
    open: Option<OpenText>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::new(),
            open: None,
        }
    }

    pub fn ingest(&mut self, speaker: &ParticipantId, event: &TurnEvent) -> Result<(), ColloquyError> {
        match event {
            TurnEvent::TextDelta(text) => {
                if text.is_empty() {
                    return Ok(());
                }
                let same_speaker = self.open.as_ref().is_some_and(|o| o.speaker == *speaker);
                if same_speaker {
                    if let Some(open) = self.open.as_mut() {
                        open.content.push_str(text);
                    }
                } else {
                    self.close_open();
                    self.open = Some(OpenText {
                        speaker: speaker.clone(),
                        content: text.clone(),
                    });
                }
            }
            TurnEvent::ToolRequest(call) => {
                self.close_open();
                if call.requester != *speaker {
                    return Err(ColloquyError::Transcript(format!(
                        "{} emitted a tool request attributed to {}",
                        speaker, call.requester
                    )));
                }
                let content = call.arguments.to_string();
                self.transcript.append(
                    speaker.clone(),
                    MessageKind::ToolRequest,
                    content,
                    Some(call.clone()),
                    None,
                );
            }
            TurnEvent::ToolResult(result) => {
                self.close_open();
                let paired = self.transcript.last().is_some_and(|last| {
                    last.kind == MessageKind::ToolRequest
                        && last.speaker == *speaker
                        && last.call_id() == Some(result.call.id.as_str())
                });
                if !paired || result.call.requester != *speaker {
                    return Err(ColloquyError::Transcript(format!(
                        "tool result for call {} from {} has no matching request",
                        result.call.id, speaker
                    )));
                }
                self.transcript.append(
                    speaker.clone(),
                    MessageKind::ToolResult,
                    result.output.clone(),
                    Some(result.call.clone()),
                    result.error,
                );
            }
            TurnEvent::TurnEnd | TurnEvent::TurnFailed { .. } => self.close_open(),
        }
        Ok(())
    }

    /// Append a whole text message, closing any open one first.
    pub fn post(&mut self, speaker: &ParticipantId, content: impl Into<String>) {
        self.close_open();
        let content = content.into();
        if content.is_empty() {
            return;
        }
        self.transcript
            .append(speaker.clone(), MessageKind::Text, content, None, None);
    }

    /// Commit the open text message, if any.
    pub fn close_open(&mut self) {
        if let Some(open) = self.open.take() {
            debug!(speaker = %open.speaker, chars = open.content.len(), "Closing text message");
            self.transcript
                .append(open.speaker, MessageKind::Text, open.content, None, None);
        }
    }

    pub fn has_open_text(&self) -> bool {
        self.open.is_some()
    }

    /// Number of committed messages.
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() && self.open.is_none()
    }

    /// Read-only view of the committed messages.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Owned copy of the committed messages.
    pub fn snapshot(&self) -> Transcript {
        self.transcript.clone()
    }

    pub fn into_transcript(mut self) -> Transcript {
        self.close_open();
        self.transcript
    }
}

impl Default for TranscriptAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::{ToolCall, ToolResult};
    use serde_json::json;

    fn researcher() -> ParticipantId {
        ParticipantId::assistant("Researcher")
    }

    fn reviewer() -> ParticipantId {
        ParticipantId::assistant("Reviewer")
    }

    fn delta(s: &str) -> TurnEvent {
        TurnEvent::TextDelta(s.to_string())
    }

    #[test]
    fn consecutive_deltas_coalesce_into_one_message() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        for piece in ["Hel", "lo ", "wor", "ld"] {
            agg.ingest(&r, &delta(piece)).unwrap();
        }
        agg.ingest(&r, &TurnEvent::TurnEnd).unwrap();

        let transcript = agg.snapshot();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "Hello world");
        assert_eq!(transcript.messages()[0].kind, MessageKind::Text);
    }

    #[test]
    fn empty_delta_is_a_no_op() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        agg.ingest(&r, &delta("")).unwrap();
        assert!(!agg.has_open_text());
        agg.ingest(&r, &TurnEvent::TurnEnd).unwrap();
        assert!(agg.snapshot().is_empty());
    }

    #[test]
    fn open_message_is_not_visible_until_closed() {
        let mut agg = TranscriptAggregator::new();
        agg.ingest(&researcher(), &delta("partial")).unwrap();
        assert_eq!(agg.len(), 0);
        agg.close_open();
        assert_eq!(agg.snapshot().messages()[0].content, "partial");
    }

    #[test]
    fn speaker_change_closes_open_message() {
        let mut agg = TranscriptAggregator::new();
        agg.ingest(&researcher(), &delta("one")).unwrap();
        agg.ingest(&reviewer(), &delta("two")).unwrap();
        agg.ingest(&reviewer(), &TurnEvent::TurnEnd).unwrap();

        let t = agg.snapshot();
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0].speaker.name, "Researcher");
        assert_eq!(t.messages()[1].speaker.name, "Reviewer");
        assert_eq!(t.messages()[1].sequence_no, 1);
    }

    #[test]
    fn tool_events_split_text_and_stay_adjacent() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        let call = ToolCall::new("arxiv_search", json!({"query": "agents"}), r.clone());

        agg.ingest(&r, &delta("Searching")).unwrap();
        agg.ingest(&r, &TurnEvent::ToolRequest(call.clone())).unwrap();
        agg.ingest(&r, &TurnEvent::ToolResult(ToolResult::success(call.clone(), "Paper 1")))
            .unwrap();
        agg.ingest(&r, &delta("Found one")).unwrap();
        agg.ingest(&r, &TurnEvent::TurnEnd).unwrap();

        let kinds: Vec<_> = agg.snapshot().iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Text,
                MessageKind::ToolRequest,
                MessageKind::ToolResult,
                MessageKind::Text
            ]
        );
        let t = agg.snapshot();
        assert_eq!(t.messages()[1].call_id(), t.messages()[2].call_id());
    }

    #[test]
    fn orphan_tool_result_is_rejected() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        let call = ToolCall::new("arxiv_search", json!({}), r.clone());
        let result = ToolResult::failure(call, ErrorKind::EmptyResult, "none");
        assert!(agg.ingest(&r, &TurnEvent::ToolResult(result)).is_err());
        assert!(agg.snapshot().is_empty());
    }

    #[test]
    fn tool_result_from_other_speaker_is_rejected() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        let call = ToolCall::new("arxiv_search", json!({}), r.clone());
        agg.ingest(&r, &TurnEvent::ToolRequest(call.clone())).unwrap();
        let result = ToolResult::success(call, "x");
        assert!(agg
            .ingest(&reviewer(), &TurnEvent::ToolResult(result))
            .is_err());
    }

    #[test]
    fn failed_turn_commits_partial_text() {
        let mut agg = TranscriptAggregator::new();
        let r = researcher();
        agg.ingest(&r, &delta("half a thou")).unwrap();
        agg.ingest(
            &r,
            &TurnEvent::TurnFailed {
                kind: ErrorKind::DependencyUnavailable,
                reason: "stream dropped".into(),
            },
        )
        .unwrap();
        assert_eq!(agg.snapshot().messages()[0].content, "half a thou");
    }
}
