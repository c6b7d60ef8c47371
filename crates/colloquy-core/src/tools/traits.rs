use crate::agent::ParticipantId;
use crate::error::{ColloquyError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// What a tool backend hands back on a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    /// The call was valid but found nothing.
    Empty,
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the arguments. The gateway validates calls against it
    /// before `execute` is reached.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<ToolOutput, ColloquyError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A participant's request to run a named tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub requester: ParticipantId,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value, requester: ParticipantId) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
            requester,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// The uniform envelope every tool invocation produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub output: String,
    pub error: Option<ErrorKind>,
}

impl ToolResult {
    pub fn success(call: ToolCall, output: impl Into<String>) -> Self {
        Self {
            call,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(call: ToolCall, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            call,
            output: message.into(),
            error: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Text fed back to the requesting model.
    pub fn render_for_model(&self) -> String {
        match self.error {
            None => self.output.clone(),
            Some(ErrorKind::EmptyResult) => format!("No results: {}", self.output),
            Some(kind) => format!("Error ({kind}): {}", self.output),
        }
    }
}

pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry holding every tool this crate ships.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::ArxivSearchTool::new()));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Definitions restricted to the given names, in the order given.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .map(|t| t.to_definition())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
