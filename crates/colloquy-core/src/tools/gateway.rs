use crate::error::ErrorKind;
use crate::tools::schema::validate_arguments;
use crate::tools::traits::{ToolCall, ToolDefinition, ToolOutput, ToolRegistry, ToolResult};
use tracing::{debug, warn};

/// Validates and executes tool calls, folding every outcome into a [`ToolResult`].
///
/// The gateway never retries and never returns an `Err`: malformed input,
/// empty results and backend failures all come back as result envelopes.
pub struct ToolGateway {
    registry: ToolRegistry,
}

impl ToolGateway {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        self.registry.definitions_for(names)
    }

    pub async fn invoke(&self, call: ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            let message = format!("Tool '{}' not found", call.name);
            return ToolResult::failure(call, ErrorKind::InvalidArgument, message);
        };

        if let Err(message) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            debug!(tool = %call.name, %message, "Rejected tool arguments");
            return ToolResult::failure(call, ErrorKind::InvalidArgument, message);
        }

        debug!(tool = %call.name, requester = %call.requester, "Executing tool");
        match tool.execute(call.arguments.clone()).await {
            Ok(ToolOutput::Text(output)) => ToolResult::success(call, output),
            Ok(ToolOutput::Empty) => {
                let message = format!("'{}' returned no results", call.name);
                ToolResult::failure(call, ErrorKind::EmptyResult, message)
            }
            Err(e) => {
                let kind = match e.kind() {
                    ErrorKind::InvalidArgument => ErrorKind::InvalidArgument,
                    _ => ErrorKind::DependencyUnavailable,
                };
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(call, kind, e.to_string())
            }
        }
    }
}
