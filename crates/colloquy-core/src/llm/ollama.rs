use crate::error::ColloquyError;
use crate::llm::traits::*;
use crate::tools::ToolDefinition;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Sampling options forwarded to Ollama for one participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl SamplingOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_k.is_none()
    }
}

/// Client for local Ollama models, speaking the `/api/chat` NDJSON protocol.
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    options: SamplingOptions,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            options: SamplingOptions::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_ollama_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                if let Some(ref tool_calls) = m.tool_calls {
                    let tcs: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            let args = tc
                                .parse_arguments()
                                .unwrap_or(Value::Object(Default::default()));
                            serde_json::json!({
                                "function": {
                                    "name": tc.name,
                                    "arguments": args,
                                }
                            })
                        })
                        .collect();
                    serde_json::json!({
                        "role": "assistant",
                        "content": m.content,
                        "tool_calls": tcs,
                    })
                } else {
                    serde_json::json!({
                        "role": m.role,
                        "content": m.content,
                    })
                }
            })
            .collect()
    }

    fn build_tool_defs(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolDefinition], stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: Self::to_ollama_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(Self::build_tool_defs(tools))
            },
            stream,
            options: if self.options.is_empty() {
                None
            } else {
                Some(self.options)
            },
        }
    }

    async fn post(&self, body: &OllamaRequest) -> Result<reqwest::Response, ColloquyError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ColloquyError::Llm(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ColloquyError::Llm(format!(
                "Ollama API error ({}): {}",
                status, text
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Translate one NDJSON chunk into stream events.
/// Ollama delivers each tool call whole, so it becomes a start/delta/end triple.
fn chunk_events(chunk: OllamaChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(error) = chunk.error {
        events.push(StreamEvent::Error(error));
        return events;
    }

    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(StreamEvent::TextDelta(message.content));
        }
        for tc in message.tool_calls {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            events.push(StreamEvent::ToolCallStart {
                id: id.clone(),
                name: tc.function.name,
            });
            events.push(StreamEvent::ToolCallDelta {
                id: id.clone(),
                arguments_delta: tc.function.arguments.to_string(),
            });
            events.push(StreamEvent::ToolCallEnd { id });
        }
    }

    if chunk.done {
        events.push(StreamEvent::Done);
    }
    events
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ColloquyError> {
        let body = self.request_body(messages, tools, false);
        let response = self.post(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ColloquyError::Llm(format!("Failed to read Ollama response: {e}")))?;

        let chunk: OllamaChunk = serde_json::from_str(&text)
            .map_err(|e| ColloquyError::Llm(format!("Failed to parse Ollama response: {e}")))?;
        if let Some(error) = chunk.error {
            return Err(ColloquyError::Llm(format!("Ollama error: {error}")));
        }

        let usage = match (chunk.prompt_eval_count, chunk.eval_count) {
            (Some(input), Some(output)) => Some(Usage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        };

        let (content, tool_calls) = match chunk.message {
            Some(m) => (m.content, m.tool_calls),
            None => (String::new(), Vec::new()),
        };

        let intents: Vec<ToolCallIntent> = tool_calls
            .into_iter()
            .map(|tc| ToolCallIntent {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                name: tc.function.name,
                arguments: tc.function.arguments.to_string(),
            })
            .collect();

        let message = if intents.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tools(content, intents)
        };

        Ok(LlmResponse { message, usage })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ColloquyError> {
        let body = self.request_body(messages, tools, true);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::unbounded();
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut buffer = LineBuffer::default();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(StreamEvent::Error(e.to_string()));
                        return;
                    }
                };

                buffer.push(&chunk);

                while let Some(line) = buffer.next_line() {
                    if is_blank(&line) {
                        continue;
                    }

                    let parsed = match serde_json::from_slice::<OllamaChunk>(&line) {
                        Ok(p) => p,
                        Err(e) => {
                            let _ = tx.unbounded_send(StreamEvent::Error(format!(
                                "Stream deserialization error: {e}"
                            )));
                            return;
                        }
                    };

                    for event in chunk_events(parsed) {
                        let terminal =
                            matches!(event, StreamEvent::Done | StreamEvent::Error(_));
                        let _ = tx.unbounded_send(event);
                        if terminal {
                            return;
                        }
                    }
                }
            }

            // Trailing line without a newline
            let rest = buffer.take_rest();
            if !is_blank(&rest) {
                if let Ok(parsed) = serde_json::from_slice::<OllamaChunk>(&rest) {
                    for event in chunk_events(parsed) {
                        let terminal =
                            matches!(event, StreamEvent::Done | StreamEvent::Error(_));
                        let _ = tx.unbounded_send(event);
                        if terminal {
                            return;
                        }
                    }
                }
            }

            let _ = tx.unbounded_send(StreamEvent::Done);
        });

        Ok(rx)
    }
}

/// Reassembles newline-delimited lines from raw network chunks.
///
/// Bytes are kept undecoded until a whole line is present, so a multi-byte
/// character split across two chunks arrives intact.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line, without its newline.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.bytes.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
        line.pop();
        Some(line)
    }

    fn take_rest(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
