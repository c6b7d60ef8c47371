#![allow(dead_code)]

use colloquy_core::error::ColloquyError;
use colloquy_core::llm::{LlmClient, LlmResponse, Message, StreamEvent};
use colloquy_core::tools::{Tool, ToolDefinition, ToolOutput};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock LLM replaying scripted stream event sequences, one per call, in order.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Vec<StreamEvent>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answers every call with the same text.
    pub fn repeating(text: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| text_reply(text)).collect())
    }

    /// Message lists received so far.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        let events = self.responses.lock().unwrap().pop_front().unwrap_or_default();
        let content: String = events
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta(t) => Some(t),
                _ => None,
            })
            .collect();
        Ok(LlmResponse {
            message: Message::assistant(content),
            usage: None,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<UnboundedReceiver<StreamEvent>, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        let events = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![StreamEvent::Done]);

        let (mut tx, rx) = unbounded();
        for event in events {
            tx.start_send(event).unwrap();
        }
        Ok(rx)
    }
}

/// Mock LLM that streams a prefix and then stalls forever.
pub struct StallingLlm {
    prefix: Vec<StreamEvent>,
    // keeps the channel open
    senders: Mutex<Vec<UnboundedSender<StreamEvent>>>,
}

impl StallingLlm {
    pub fn new(prefix: Vec<StreamEvent>) -> Self {
        Self {
            prefix,
            senders: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for StallingLlm {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ColloquyError> {
        futures::future::pending().await
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<UnboundedReceiver<StreamEvent>, ColloquyError> {
        let (mut tx, rx) = unbounded();
        for event in self.prefix.clone() {
            tx.start_send(event).unwrap();
        }
        self.senders.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Mock LLM whose backend is unreachable.
pub struct DownLlm;

#[async_trait::async_trait]
impl LlmClient for DownLlm {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ColloquyError> {
        Err(ColloquyError::Llm("connection refused".into()))
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<UnboundedReceiver<StreamEvent>, ColloquyError> {
        Err(ColloquyError::Llm("connection refused".into()))
    }
}

pub fn text_reply(text: &str) -> Vec<StreamEvent> {
    vec![StreamEvent::TextDelta(text.to_string()), StreamEvent::Done]
}

pub fn tool_reply(id: &str, name: &str, arguments: Value) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
        },
        StreamEvent::ToolCallDelta {
            id: id.to_string(),
            arguments_delta: arguments.to_string(),
        },
        StreamEvent::ToolCallEnd { id: id.to_string() },
        StreamEvent::Done,
    ]
}

/// Search tool double that counts how often its backend is reached.
pub struct CountingSearch {
    pub calls: Arc<AtomicUsize>,
    reply: Option<String>,
}

impl CountingSearch {
    pub fn returning(reply: &str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            reply: Some(reply.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            reply: None,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CountingSearch {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Searches a paper index"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 1},
                "max_results": {"type": "integer", "exclusiveMinimum": 1, "maximum": 1000}
            },
            "required": ["query", "max_results"]
        })
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ColloquyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.reply {
            Some(ref text) => ToolOutput::Text(text.clone()),
            None => ToolOutput::Empty,
        })
    }
}
