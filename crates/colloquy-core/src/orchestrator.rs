use crate::agent::{AgentAdapter, ParticipantId, TurnEvent};
use crate::error::{ColloquyError, ErrorKind, Result};
use crate::scheduler::{Selection, SelectionPolicy, TurnScheduler};
use crate::termination::{StepCeiling, TerminationCondition, TerminationContext, TerminationEvaluator};
use crate::transcript::{Transcript, TranscriptAggregator};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// What the driver does when dynamic selection names an ineligible participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidSelectionFallback {
    /// Fail the run with `InvalidSelection`.
    #[default]
    Abort,
    /// Hand the turn back to whoever spoke last; abort if nobody has.
    PreviousSpeaker,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub transcript: Transcript,
    pub turn_count: u32,
    pub status: RunStatus,
    /// Classification of the failure when `status` is `Failed`.
    pub error: Option<ErrorKind>,
    pub reason: Option<String>,
    /// Name of the condition that completed the run.
    pub stop_reason: Option<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            transcript: Transcript::new(),
            turn_count: 0,
            status: RunStatus::Running,
            error: None,
            reason: None,
            stop_reason: None,
        }
    }

    /// Leave `Running`. Later transitions are ignored.
    fn finish(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    fn complete(&mut self, stop_reason: impl Into<String>) {
        if self.finish(RunStatus::Completed) {
            self.stop_reason = Some(stop_reason.into());
        }
    }

    fn fail(&mut self, kind: ErrorKind, reason: impl Into<String>) {
        if self.finish(RunStatus::Failed) {
            self.error = Some(kind);
            self.reason = Some(reason.into());
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Progress notifications for live rendering.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted { task: String },
    SpeakerSelected { speaker: ParticipantId, turn: u32 },
    Turn { speaker: ParticipantId, event: TurnEvent },
    /// A failed attempt that committed nothing is being run again.
    TurnRetried {
        speaker: ParticipantId,
        attempt: u32,
        kind: ErrorKind,
        reason: String,
    },
    TurnCompleted { speaker: ParticipantId, turn_count: u32 },
    RunFinished { status: RunStatus, error: Option<ErrorKind> },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamOptions {
    /// Extra attempts for a failed turn that committed nothing.
    pub turn_retries: u32,
    pub on_invalid_selection: InvalidSelectionFallback,
}

enum TurnOutcome {
    Completed,
    Cancelled,
    Failed { kind: ErrorKind, reason: String },
}

/// A configured set of participants plus the policies that run them.
pub struct Team {
    adapters: Vec<AgentAdapter>,
    scheduler: TurnScheduler,
    evaluator: TerminationEvaluator,
    options: TeamOptions,
}

impl Team {
    /// The evaluator starts with a step ceiling at `max_turns`.
    pub fn new(adapters: Vec<AgentAdapter>, policy: SelectionPolicy, max_turns: u32) -> Result<Self> {
        if adapters.is_empty() {
            return Err(ColloquyError::Config("a team needs at least one participant".into()));
        }
        if max_turns == 0 {
            return Err(ColloquyError::Config("max_turns must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for adapter in &adapters {
            let name = &adapter.participant().name;
            if *adapter.participant() == ParticipantId::user() {
                return Err(ColloquyError::Config("'user' is reserved for the task message".into()));
            }
            if !seen.insert(name.clone()) {
                return Err(ColloquyError::Config(format!("duplicate participant name '{name}'")));
            }
        }

        let participants = adapters.iter().map(|a| a.participant().clone()).collect();
        Ok(Self {
            adapters,
            scheduler: TurnScheduler::new(participants, policy, max_turns),
            evaluator: TerminationEvaluator::new().with(StepCeiling::new(max_turns)),
            options: TeamOptions::default(),
        })
    }

    pub fn with_termination(mut self, condition: impl TerminationCondition + 'static) -> Self {
        self.evaluator.push(Box::new(condition));
        self
    }

    pub fn with_options(mut self, options: TeamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_allow_repeated_speaker(mut self, allow: bool) -> Self {
        self.scheduler = self.scheduler.with_allow_repeated_speaker(allow);
        self
    }

    pub fn participants(&self) -> &[ParticipantId] {
        self.scheduler.participants()
    }

    pub fn max_turns(&self) -> u32 {
        self.scheduler.max_turns()
    }

    /// Run the task to a terminal state.
    ///
    /// Cancellation is observed at every await: while selecting, while
    /// waiting for the next turn event, and between turns. Everything
    /// committed before it was observed stays in the transcript.
    pub async fn run(
        &mut self,
        task: impl Into<String>,
        cancel: CancellationToken,
        events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> RunState {
        let task = task.into();
        let emit = |event: RunEvent| {
            if let Some(ref tx) = events {
                let _ = tx.send(event);
            }
        };

        self.scheduler.reset();
        let mut agg = TranscriptAggregator::new();
        agg.post(&ParticipantId::user(), task.clone());
        let mut state = RunState::new();

        info!(participants = self.adapters.len(), max_turns = self.max_turns(), "Run started");
        emit(RunEvent::RunStarted { task });

        while !state.status.is_terminal() {
            if cancel.is_cancelled() {
                state.finish(RunStatus::Cancelled);
                break;
            }

            let selection = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                selection = self.scheduler.next_speaker(agg.transcript(), state.turn_count) => Some(selection),
            };
            let Some(selection) = selection else {
                state.finish(RunStatus::Cancelled);
                break;
            };

            let speaker = match selection {
                Ok(Selection::Speaker(speaker)) => speaker,
                Ok(Selection::NoEligibleSpeaker) => {
                    state.complete("no_eligible_speaker");
                    break;
                }
                Err(e) if e.kind() == ErrorKind::InvalidSelection => {
                    let previous = agg.transcript().last_speaker().cloned();
                    match (self.options.on_invalid_selection, previous) {
                        (InvalidSelectionFallback::PreviousSpeaker, Some(previous))
                            if self.scheduler.assign(previous.clone()).is_ok() =>
                        {
                            warn!(error = %e, fallback = %previous, "Invalid selection, reusing previous speaker");
                            previous
                        }
                        _ => {
                            warn!(error = %e, "Invalid selection, aborting run");
                            state.fail(ErrorKind::InvalidSelection, e.to_string());
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Speaker selection failed");
                    state.fail(e.kind(), e.to_string());
                    break;
                }
            };

            let Some(adapter) = self.adapters.iter().find(|a| *a.participant() == speaker) else {
                state.fail(ErrorKind::InvalidSelection, format!("no adapter for {speaker}"));
                break;
            };

            let turn = state.turn_count + 1;
            debug!(speaker = %speaker, turn, "Turn started");
            emit(RunEvent::SpeakerSelected {
                speaker: speaker.clone(),
                turn,
            });

            let mut attempt = 0;
            let outcome = loop {
                let committed_before = agg.len();
                let outcome = drive_turn(adapter, &speaker, &mut agg, &cancel, &emit).await;
                match outcome {
                    TurnOutcome::Failed { kind, reason }
                        if attempt < self.options.turn_retries && agg.len() == committed_before =>
                    {
                        attempt += 1;
                        warn!(speaker = %speaker, %kind, %reason, attempt, "Retrying failed turn");
                        emit(RunEvent::TurnRetried {
                            speaker: speaker.clone(),
                            attempt,
                            kind,
                            reason,
                        });
                    }
                    other => break other,
                }
            };

            match outcome {
                TurnOutcome::Completed => {}
                TurnOutcome::Cancelled => {
                    info!(speaker = %speaker, "Run cancelled mid-turn");
                    state.finish(RunStatus::Cancelled);
                    break;
                }
                TurnOutcome::Failed { kind, reason } => {
                    warn!(speaker = %speaker, %kind, %reason, "Turn failed");
                    emit(RunEvent::Turn {
                        speaker: speaker.clone(),
                        event: TurnEvent::TurnFailed {
                            kind,
                            reason: reason.clone(),
                        },
                    });
                    state.fail(kind, format!("{speaker}: {reason}"));
                    break;
                }
            }

            self.scheduler.complete_turn();
            state.turn_count += 1;
            emit(RunEvent::TurnCompleted {
                speaker: speaker.clone(),
                turn_count: state.turn_count,
            });

            let ctx = TerminationContext::new(agg.transcript(), state.turn_count);
            if let Some(reason) = self.evaluator.triggered(&ctx) {
                debug!(reason, turn_count = state.turn_count, "Termination condition met");
                let reason = reason.to_string();
                state.complete(reason);
            }
        }

        state.transcript = agg.into_transcript();
        info!(
            status = ?state.status,
            turns = state.turn_count,
            messages = state.transcript.len(),
            "Run finished"
        );
        emit(RunEvent::RunFinished {
            status: state.status,
            error: state.error,
        });
        state
    }

    /// Spawn the run on the current tokio runtime.
    pub fn start_run(mut self, task: impl Into<String>) -> RunHandle {
        let task = task.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(task, token, Some(tx)).await });
        RunHandle {
            cancel,
            join,
            events: Some(rx),
        }
    }
}

/// Feed one turn's events into the aggregator until the turn ends.
///
/// A `TurnFailed` event is not emitted here; the caller reports it once it
/// knows the turn will not be retried.
async fn drive_turn<F: Fn(RunEvent)>(
    adapter: &AgentAdapter,
    speaker: &ParticipantId,
    agg: &mut TranscriptAggregator,
    cancel: &CancellationToken,
    emit: &F,
) -> TurnOutcome {
    let mut stream = adapter.produce_turn(agg.snapshot());

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = stream.next() => Some(next),
        };

        let Some(next) = next else {
            agg.close_open();
            return TurnOutcome::Cancelled;
        };
        let Some(event) = next else {
            agg.close_open();
            return TurnOutcome::Failed {
                kind: ErrorKind::TurnFailed,
                reason: "turn ended without a TurnEnd event".into(),
            };
        };

        if !matches!(event, TurnEvent::TurnFailed { .. }) {
            emit(RunEvent::Turn {
                speaker: speaker.clone(),
                event: event.clone(),
            });
        }

        if let Err(e) = agg.ingest(speaker, &event) {
            agg.close_open();
            return TurnOutcome::Failed {
                kind: e.kind(),
                reason: e.to_string(),
            };
        }

        match event {
            TurnEvent::TurnEnd => return TurnOutcome::Completed,
            TurnEvent::TurnFailed { kind, reason } => return TurnOutcome::Failed { kind, reason },
            _ => {}
        }
    }
}

/// Handle to a run spawned with [`Team::start_run`].
pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<RunState>,
    events: Option<mpsc::UnboundedReceiver<RunEvent>>,
}

impl RunHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the progress channel. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RunEvent>> {
        self.events.take()
    }

    /// Wait for the terminal state.
    pub async fn result(self) -> Result<RunState> {
        self.join
            .await
            .map_err(|e| ColloquyError::Other(format!("run task panicked: {e}")))
    }
}
