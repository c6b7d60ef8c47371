use crate::agent::{ParticipantId, TurnEvent, TurnStream};
use crate::error::ErrorKind;
use crate::llm::{LlmClient, Message, StreamEvent, ToolCallIntent};
use crate::tools::{ToolCall, ToolDefinition, ToolGateway, ToolResult};
use crate::transcript::{MessageKind, Transcript};
use async_stream::stream;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Callback invoked before tool execution. Returns true to approve, false to deny.
pub type ApprovalFn = Box<
    dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync,
>;

/// A participant whose turns are generated by a language model.
pub struct ModelAgent {
    participant: ParticipantId,
    llm: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
    gateway: Option<Arc<ToolGateway>>,
    tools: Vec<String>,
    reflect_on_tool_use: bool,
    max_tool_rounds: usize,
    history_window: Option<usize>,
    approval_fn: Option<ApprovalFn>,
}

impl ModelAgent {
    pub fn new(participant: ParticipantId, llm: Arc<dyn LlmClient>) -> Self {
        let system_prompt = participant.role.system_prompt().map(str::to_string);
        Self {
            participant,
            llm,
            system_prompt,
            gateway: None,
            tools: Vec::new(),
            reflect_on_tool_use: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            history_window: None,
            approval_fn: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Give the agent access to the named tools of a shared gateway.
    pub fn with_tools(mut self, gateway: Arc<ToolGateway>, names: Vec<String>) -> Self {
        self.gateway = Some(gateway);
        self.tools = names;
        self
    }

    /// When false, the turn ends right after tool results instead of
    /// re-entering generation.
    pub fn with_reflect_on_tool_use(mut self, reflect: bool) -> Self {
        self.reflect_on_tool_use = reflect;
        self
    }

    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_history_window(mut self, max_messages: usize) -> Self {
        self.history_window = Some(max_messages);
        self
    }

    pub fn with_approval(mut self, f: ApprovalFn) -> Self {
        self.approval_fn = Some(f);
        self
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn tool_names(&self) -> &[String] {
        &self.tools
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        match self.gateway {
            Some(ref gateway) => gateway.definitions_for(&self.tools),
            None => Vec::new(),
        }
    }

    /// Build the model's working context from the transcript.
    /// Other speakers' text is attributed by name; their tool traffic is left out.
    fn build_context(&self, view: &Transcript) -> Vec<Message> {
        let view = match self.history_window {
            Some(n) => view.window(n),
            None => view.clone(),
        };

        let mut messages = Vec::with_capacity(view.len() + 1);
        if let Some(ref system) = self.system_prompt {
            messages.push(Message::system(system));
        }

        for m in view.iter() {
            let own = m.speaker == self.participant;
            match m.kind {
                MessageKind::Text if own => messages.push(Message::assistant(&m.content)),
                MessageKind::Text if m.speaker == ParticipantId::user() => {
                    messages.push(Message::user(&m.content))
                }
                MessageKind::Text => {
                    messages.push(Message::user(format!("[{}] {}", m.speaker.name, m.content)))
                }
                MessageKind::ToolRequest if own => {
                    if let Some(ref call) = m.tool_call {
                        messages.push(Message::assistant_with_tools(
                            "",
                            vec![ToolCallIntent {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            }],
                        ));
                    }
                }
                MessageKind::ToolResult if own => {
                    if let Some(id) = m.call_id() {
                        messages.push(Message::tool_result(id, &m.content));
                    }
                }
                MessageKind::ToolRequest | MessageKind::ToolResult => {}
            }
        }
        messages
    }

    async fn run_tool(&self, call: ToolCall) -> ToolResult {
        if let Some(ref approval_fn) = self.approval_fn {
            let approved = (approval_fn)(call.name.clone(), call.arguments.clone()).await;
            if !approved {
                debug!(tool = %call.name, agent = %self.participant, "Tool call denied");
                return ToolResult::failure(call, ErrorKind::Denied, "Tool execution denied by user");
            }
        }

        match self.gateway {
            Some(ref gateway) if self.tools.iter().any(|t| *t == call.name) => {
                gateway.invoke(call).await
            }
            _ => {
                let message = format!(
                    "Tool '{}' is not available to {}",
                    call.name, self.participant
                );
                ToolResult::failure(call, ErrorKind::InvalidArgument, message)
            }
        }
    }

    pub fn produce_turn(&self, view: Transcript) -> TurnStream<'_> {
        Box::pin(stream! {
            let mut context = self.build_context(&view);
            let tool_definitions = self.tool_definitions();
            let mut generations = 0usize;

            loop {
                if generations > self.max_tool_rounds {
                    warn!(agent = %self.participant, rounds = self.max_tool_rounds, "Exceeded maximum tool rounds");
                    yield TurnEvent::TurnFailed {
                        kind: ErrorKind::TurnFailed,
                        reason: format!("exceeded maximum tool rounds ({})", self.max_tool_rounds),
                    };
                    return;
                }
                generations += 1;
                debug!(agent = %self.participant, generation = generations, "Requesting model output");

                let mut rx = match self.llm.chat_stream(&context, &tool_definitions).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(agent = %self.participant, error = %e, "Model backend failed");
                        yield TurnEvent::TurnFailed { kind: e.kind(), reason: e.to_string() };
                        return;
                    }
                };

                let mut content = String::new();
                let mut intents: Vec<ToolCallIntent> = Vec::new();
                // (id, name, arguments) in arrival order
                let mut pending: Vec<(String, String, String)> = Vec::new();

                while let Some(event) = rx.next().await {
                    match event {
                        StreamEvent::TextDelta(delta) => {
                            content.push_str(&delta);
                            yield TurnEvent::TextDelta(delta);
                        }
                        StreamEvent::ToolCallStart { id, name } => {
                            pending.push((id, name, String::new()));
                        }
                        StreamEvent::ToolCallDelta { id, arguments_delta } => {
                            if let Some(entry) = pending.iter_mut().find(|(pid, _, _)| *pid == id) {
                                entry.2.push_str(&arguments_delta);
                            }
                        }
                        StreamEvent::ToolCallEnd { id } => {
                            if let Some(pos) = pending.iter().position(|(pid, _, _)| *pid == id) {
                                let (id, name, arguments) = pending.remove(pos);
                                intents.push(ToolCallIntent { id, name, arguments });
                            }
                        }
                        StreamEvent::Done => break,
                        StreamEvent::Error(err) => {
                            warn!(agent = %self.participant, error = %err, "Model stream failed");
                            yield TurnEvent::TurnFailed {
                                kind: ErrorKind::DependencyUnavailable,
                                reason: err,
                            };
                            return;
                        }
                    }
                }

                // Calls the backend never closed explicitly
                intents.extend(
                    pending
                        .drain(..)
                        .map(|(id, name, arguments)| ToolCallIntent { id, name, arguments }),
                );

                if intents.is_empty() {
                    yield TurnEvent::TurnEnd;
                    return;
                }

                context.push(Message::assistant_with_tools(content, intents.clone()));

                for intent in &intents {
                    let arguments = intent
                        .parse_arguments()
                        .unwrap_or_else(|_| Value::String(intent.arguments.clone()));
                    let call = ToolCall {
                        id: intent.id.clone(),
                        name: intent.name.clone(),
                        arguments,
                        requester: self.participant.clone(),
                    };

                    yield TurnEvent::ToolRequest(call.clone());
                    let result = self.run_tool(call).await;
                    context.push(Message::tool_result(&intent.id, result.render_for_model()));
                    yield TurnEvent::ToolResult(result);
                }

                if !self.reflect_on_tool_use {
                    yield TurnEvent::TurnEnd;
                    return;
                }
            }
        })
    }
}
