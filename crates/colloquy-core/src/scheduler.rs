use crate::agent::ParticipantId;
use crate::error::{ColloquyError, Result};
use crate::llm::{LlmClient, Message};
use crate::transcript::Transcript;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Decision function behind dynamic selection.
#[async_trait::async_trait]
pub trait SpeakerSelector: Send + Sync {
    /// Name the participant that should speak next. The answer is checked
    /// against `eligible` by the scheduler, not here.
    async fn select(&self, transcript: &Transcript, eligible: &[ParticipantId]) -> Result<String>;
}

#[derive(Clone)]
pub enum SelectionPolicy {
    /// Deterministic cyclic order over the configured participants.
    RoundRobin,
    Dynamic(Arc<dyn SpeakerSelector>),
}

impl std::fmt::Debug for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::RoundRobin => f.write_str("RoundRobin"),
            SelectionPolicy::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// Selection mode as written in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    RoundRobin,
    Selector,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Speaker(ParticipantId),
    /// The turn ceiling is reached. Normal completion.
    NoEligibleSpeaker,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerState {
    AwaitingSelection,
    Selected(ParticipantId),
}

pub struct TurnScheduler {
    participants: Vec<ParticipantId>,
    policy: SelectionPolicy,
    max_turns: u32,
    allow_repeated_speaker: bool,
    next_index: usize,
    state: SchedulerState,
}

impl TurnScheduler {
    pub fn new(participants: Vec<ParticipantId>, policy: SelectionPolicy, max_turns: u32) -> Self {
        Self {
            participants,
            policy,
            max_turns,
            allow_repeated_speaker: true,
            next_index: 0,
            state: SchedulerState::AwaitingSelection,
        }
    }

    /// Only consulted by dynamic selection.
    pub fn with_allow_repeated_speaker(mut self, allow: bool) -> Self {
        self.allow_repeated_speaker = allow;
        self
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Forget rotation position and any selection in progress.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.state = SchedulerState::AwaitingSelection;
    }

    /// Pick who speaks next.
    ///
    /// Returns `NoEligibleSpeaker` once `turn_count` reaches `max_turns`,
    /// whatever the policy. A dynamic pick outside the eligible set is
    /// `ColloquyError::InvalidSelection`.
    pub async fn next_speaker(&mut self, transcript: &Transcript, turn_count: u32) -> Result<Selection> {
        if let SchedulerState::Selected(ref current) = self.state {
            return Err(ColloquyError::Other(format!(
                "turn of {current} has not been completed"
            )));
        }
        if turn_count >= self.max_turns || self.participants.is_empty() {
            return Ok(Selection::NoEligibleSpeaker);
        }

        let speaker = match self.policy {
            SelectionPolicy::RoundRobin => {
                let speaker = self.participants[self.next_index % self.participants.len()].clone();
                self.next_index = (self.next_index + 1) % self.participants.len();
                speaker
            }
            SelectionPolicy::Dynamic(ref selector) => {
                let eligible = self.eligible(transcript);
                if eligible.len() == 1 {
                    eligible[0].clone()
                } else {
                    let answer = selector.select(transcript, &eligible).await?;
                    eligible
                        .iter()
                        .find(|p| p.name == answer.trim())
                        .cloned()
                        .ok_or(ColloquyError::InvalidSelection { selected: answer })?
                }
            }
        };

        debug!(speaker = %speaker, turn = turn_count + 1, "Selected next speaker");
        self.state = SchedulerState::Selected(speaker.clone());
        Ok(Selection::Speaker(speaker))
    }

    /// Force the given participant to hold the next turn.
    pub fn assign(&mut self, participant: ParticipantId) -> Result<()> {
        if !self.participants.contains(&participant) {
            return Err(ColloquyError::InvalidSelection {
                selected: participant.name,
            });
        }
        self.state = SchedulerState::Selected(participant);
        Ok(())
    }

    /// Mark the selected speaker's turn as over.
    pub fn complete_turn(&mut self) {
        self.state = SchedulerState::AwaitingSelection;
    }

    fn eligible(&self, transcript: &Transcript) -> Vec<ParticipantId> {
        let previous = transcript.last_speaker();
        if self.allow_repeated_speaker || self.participants.len() < 2 {
            return self.participants.clone();
        }
        self.participants
            .iter()
            .filter(|p| Some(*p) != previous)
            .cloned()
            .collect()
    }
}

/// Dynamic selection driven by a language model.
///
/// The model sees every participant's role and description plus the text
/// of the conversation and answers with one name. Mentions of eligible
/// names are located in the answer and the earliest wins; if none is
/// mentioned the raw answer is returned and the scheduler rejects it.
pub struct ModelSelector {
    llm: Arc<dyn LlmClient>,
    instructions: String,
}

impl ModelSelector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            instructions: SELECTOR_PROMPT.to_string(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    fn build_prompt(&self, transcript: &Transcript, eligible: &[ParticipantId]) -> String {
        let roles = eligible
            .iter()
            .map(|p| format!("{} ({}): {}", p.name, p.role.name(), p.description))
            .collect::<Vec<_>>()
            .join("\n");
        let names = eligible
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let history = transcript
            .iter()
            .filter(|m| m.is_text())
            .map(|m| format!("{}: {}", m.speaker.name, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        self.instructions
            .replace("{roles}", &roles)
            .replace("{participants}", &names)
            .replace("{history}", &history)
    }
}

/// Find the eligible name mentioned earliest in `answer`.
pub fn match_participant(answer: &str, eligible: &[ParticipantId]) -> Option<String> {
    eligible
        .iter()
        .filter_map(|p| {
            let pattern = format!(r"\b{}\b", regex::escape(&p.name));
            let re = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;
            re.find(answer).map(|m| (m.start(), p.name.clone()))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, name)| name)
}

#[async_trait::async_trait]
impl SpeakerSelector for ModelSelector {
    async fn select(&self, transcript: &Transcript, eligible: &[ParticipantId]) -> Result<String> {
        let prompt = self.build_prompt(transcript, eligible);
        let response = self
            .llm
            .chat(&[Message::system(prompt), Message::user("Who speaks next?")], &[])
            .await?;
        let answer = response.message.content.trim().to_string();
        debug!(answer = %answer, "Selector answered");
        Ok(match_participant(&answer, eligible).unwrap_or(answer))
    }
}

const SELECTOR_PROMPT: &str = r#"You coordinate a team working on a shared task.

Team members:
{roles}

Conversation so far:
{history}

Choose who should speak next from: {participants}.
Reply with the name only."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRole;

    fn team() -> Vec<ParticipantId> {
        vec![
            ParticipantId::new("Researcher", AgentRole::Researcher, "finds papers"),
            ParticipantId::new("Reviewer", AgentRole::Reviewer, "selects papers"),
            ParticipantId::new("Writer", AgentRole::Writer, "writes the review"),
        ]
    }

    struct FixedSelector(&'static str);

    #[async_trait::async_trait]
    impl SpeakerSelector for FixedSelector {
        async fn select(&self, _: &Transcript, _: &[ParticipantId]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    async fn pick(s: &mut TurnScheduler, turn: u32) -> Selection {
        let selection = s.next_speaker(&Transcript::new(), turn).await.unwrap();
        s.complete_turn();
        selection
    }

    #[tokio::test]
    async fn round_robin_cycles_in_order() {
        let mut s = TurnScheduler::new(team(), SelectionPolicy::RoundRobin, 10);
        let mut names = Vec::new();
        for turn in 0..4 {
            if let Selection::Speaker(p) = pick(&mut s, turn).await {
                names.push(p.name);
            }
        }
        assert_eq!(names, vec!["Researcher", "Reviewer", "Writer", "Researcher"]);
    }

    #[tokio::test]
    async fn ceiling_yields_no_eligible_speaker() {
        let mut s = TurnScheduler::new(team(), SelectionPolicy::RoundRobin, 2);
        assert_eq!(pick(&mut s, 2).await, Selection::NoEligibleSpeaker);

        let dynamic = SelectionPolicy::Dynamic(Arc::new(FixedSelector("Writer")));
        let mut s = TurnScheduler::new(team(), dynamic, 1);
        assert_eq!(pick(&mut s, 1).await, Selection::NoEligibleSpeaker);
    }

    #[tokio::test]
    async fn dynamic_selection_outside_eligible_set_is_rejected() {
        let policy = SelectionPolicy::Dynamic(Arc::new(FixedSelector("Editor")));
        let mut s = TurnScheduler::new(team(), policy, 5);
        let err = s.next_speaker(&Transcript::new(), 0).await.unwrap_err();
        assert!(matches!(err, ColloquyError::InvalidSelection { ref selected } if selected == "Editor"));
        assert_eq!(*s.state(), SchedulerState::AwaitingSelection);
    }

    #[tokio::test]
    async fn selecting_twice_without_completing_is_an_error() {
        let mut s = TurnScheduler::new(team(), SelectionPolicy::RoundRobin, 5);
        s.next_speaker(&Transcript::new(), 0).await.unwrap();
        assert!(s.next_speaker(&Transcript::new(), 0).await.is_err());
    }

    #[test]
    fn assign_rejects_strangers() {
        let mut s = TurnScheduler::new(team(), SelectionPolicy::RoundRobin, 5);
        assert!(s.assign(ParticipantId::assistant("Editor")).is_err());
        assert!(s.assign(team()[1].clone()).is_ok());
    }

    #[test]
    fn earliest_mentioned_name_wins() {
        let eligible = team();
        assert_eq!(
            match_participant("I think the writer, then the Reviewer", &eligible).as_deref(),
            Some("Writer")
        );
        assert_eq!(match_participant("Reviewers?", &eligible), None);
    }
}
