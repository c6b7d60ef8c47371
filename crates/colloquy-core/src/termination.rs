//! Composable stop conditions, evaluated by the driver after every turn.
//!
//! Conditions are pure: the same transcript and turn count always give the
//! same answer. The evaluator ORs them together.

use crate::agent::ParticipantId;
use crate::error::{ColloquyError, Result};
use crate::transcript::Transcript;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a condition may look at.
#[derive(Debug, Clone, Copy)]
pub struct TerminationContext<'a> {
    pub transcript: &'a Transcript,
    pub turn_count: u32,
}

impl<'a> TerminationContext<'a> {
    pub fn new(transcript: &'a Transcript, turn_count: u32) -> Self {
        Self {
            transcript,
            turn_count,
        }
    }
}

pub trait TerminationCondition: Send + Sync {
    /// Short label reported as the stop reason.
    fn name(&self) -> &str;

    fn is_met(&self, ctx: &TerminationContext<'_>) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMatch {
    /// Case-insensitive substring anywhere in the message.
    #[default]
    Substring,
    /// Case-insensitive, bounded by word boundaries.
    WholeWord,
    /// The trimmed message equals the marker, ignoring case.
    WholeMessage,
}

/// Met when the most recent text message of a participant carries a marker.
pub struct MentionCondition {
    markers: Vec<String>,
    mode: MarkerMatch,
    patterns: Vec<Regex>,
}

impl MentionCondition {
    pub fn new(markers: Vec<String>, mode: MarkerMatch) -> Result<Self> {
        let markers: Vec<String> = markers
            .into_iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();

        let patterns = match mode {
            MarkerMatch::WholeWord => markers
                .iter()
                .map(|m| {
                    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(m)))
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| ColloquyError::Config(format!("marker '{m}': {e}")))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            markers,
            mode,
            patterns,
        })
    }

    pub fn substring<S: Into<String>>(markers: impl IntoIterator<Item = S>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            mode: MarkerMatch::Substring,
            patterns: Vec::new(),
        }
    }

    pub fn matches(&self, content: &str) -> bool {
        match self.mode {
            MarkerMatch::Substring => {
                let content = content.to_lowercase();
                self.markers.iter().any(|m| content.contains(m.as_str()))
            }
            MarkerMatch::WholeWord => self.patterns.iter().any(|re| re.is_match(content)),
            MarkerMatch::WholeMessage => {
                let content = content.trim().to_lowercase();
                self.markers.iter().any(|m| *m == content)
            }
        }
    }
}

impl TerminationCondition for MentionCondition {
    fn name(&self) -> &str {
        "mention"
    }

    fn is_met(&self, ctx: &TerminationContext<'_>) -> bool {
        // tool traffic and the task itself never end a run
        match ctx.transcript.last() {
            Some(last) if last.is_text() && last.speaker != ParticipantId::user() => {
                self.matches(&last.content)
            }
            _ => false,
        }
    }
}

pub struct StepCeiling {
    max_turns: u32,
}

impl StepCeiling {
    pub fn new(max_turns: u32) -> Self {
        Self { max_turns }
    }
}

impl TerminationCondition for StepCeiling {
    fn name(&self) -> &str {
        "max_turns"
    }

    fn is_met(&self, ctx: &TerminationContext<'_>) -> bool {
        ctx.turn_count >= self.max_turns
    }
}

/// Flag external code raises to end the run after the current turn.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal(Arc<AtomicBool>);

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SignalCondition {
    signal: TerminationSignal,
}

impl SignalCondition {
    pub fn new(signal: TerminationSignal) -> Self {
        Self { signal }
    }
}

impl TerminationCondition for SignalCondition {
    fn name(&self) -> &str {
        "signal"
    }

    fn is_met(&self, _ctx: &TerminationContext<'_>) -> bool {
        self.signal.is_set()
    }
}

#[derive(Default)]
pub struct TerminationEvaluator {
    conditions: Vec<Box<dyn TerminationCondition>>,
}

impl TerminationEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl TerminationCondition + 'static) -> Self {
        self.push(Box::new(condition));
        self
    }

    pub fn push(&mut self, condition: Box<dyn TerminationCondition>) {
        self.conditions.push(condition);
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn evaluate(&self, ctx: &TerminationContext<'_>) -> bool {
        self.triggered(ctx).is_some()
    }

    /// Name of the first satisfied condition.
    pub fn triggered(&self, ctx: &TerminationContext<'_>) -> Option<&str> {
        self.conditions
            .iter()
            .find(|c| c.is_met(ctx))
            .map(|c| c.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TurnEvent;
    use crate::transcript::TranscriptAggregator;

    fn transcript_ending_with(text: &str) -> Transcript {
        let mut agg = TranscriptAggregator::new();
        agg.post(&ParticipantId::user(), "Review papers on multi-agent systems");
        let reviewer = ParticipantId::assistant("Reviewer");
        agg.ingest(&reviewer, &TurnEvent::TextDelta(text.to_string()))
            .unwrap();
        agg.ingest(&reviewer, &TurnEvent::TurnEnd).unwrap();
        agg.into_transcript()
    }

    #[test]
    fn substring_mention_is_case_insensitive() {
        let cond = MentionCondition::substring(["APPROVE"]);
        let t = transcript_ending_with("Looks good, approved.");
        assert!(cond.is_met(&TerminationContext::new(&t, 1)));
    }

    #[test]
    fn anchored_modes_avoid_incidental_matches() {
        let t = transcript_ending_with("I am not okay with the broken table");

        let substring = MentionCondition::new(vec!["ok".into()], MarkerMatch::Substring).unwrap();
        assert!(substring.is_met(&TerminationContext::new(&t, 1)));

        let word = MentionCondition::new(vec!["ok".into()], MarkerMatch::WholeWord).unwrap();
        assert!(!word.is_met(&TerminationContext::new(&t, 1)));

        let whole = MentionCondition::new(vec!["ok".into()], MarkerMatch::WholeMessage).unwrap();
        assert!(!whole.is_met(&TerminationContext::new(&t, 1)));
        let t = transcript_ending_with("  OK \n");
        assert!(whole.is_met(&TerminationContext::new(&t, 1)));
    }

    #[test]
    fn task_message_alone_never_matches() {
        let mut agg = TranscriptAggregator::new();
        agg.post(&ParticipantId::user(), "reply APPROVE when done");
        let t = agg.into_transcript();
        let cond = MentionCondition::substring(["approve"]);
        assert!(!cond.is_met(&TerminationContext::new(&t, 0)));
    }

    #[test]
    fn step_ceiling_and_or_composition() {
        let t = transcript_ending_with("still working");
        let eval = TerminationEvaluator::new()
            .with(MentionCondition::substring(["approved"]))
            .with(StepCeiling::new(3));

        assert!(!eval.evaluate(&TerminationContext::new(&t, 2)));
        assert_eq!(eval.triggered(&TerminationContext::new(&t, 3)), Some("max_turns"));
    }

    #[test]
    fn signal_condition_follows_the_flag() {
        let signal = TerminationSignal::new();
        let eval = TerminationEvaluator::new().with(SignalCondition::new(signal.clone()));
        let t = Transcript::new();
        assert!(!eval.evaluate(&TerminationContext::new(&t, 0)));
        signal.set();
        assert!(eval.evaluate(&TerminationContext::new(&t, 0)));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let t = transcript_ending_with("approved");
        let eval = TerminationEvaluator::new().with(MentionCondition::substring(["approved"]));
        let ctx = TerminationContext::new(&t, 1);
        let first = eval.evaluate(&ctx);
        assert!((0..10).all(|_| eval.evaluate(&ctx) == first));
    }
}
