//! Tool-call dispatch.
//!
//! When a run stops with `requires_action`, the relay answers every tool call
//! it recognizes and submits the outputs in one batch. Recognition happens by
//! exact function name through a [`ToolResolver`]; calls no resolver knows
//! are dropped from the submission.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::assistants::types::{ToolCall, ToolOutput};

/// Decoded tool-call arguments.
pub type ToolArguments = Map<String, Value>;

/// Decode tool-call argument text.
///
/// Empty text, malformed JSON and JSON that is not an object all yield an
/// empty argument set; the latter two are logged.
pub fn parse_arguments(raw: &str) -> ToolArguments {
    let raw = raw.trim();
    if raw.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(arguments = %other, "Tool arguments are not a JSON object, ignoring them");
            Map::new()
        }
        Err(e) => {
            error!("Failed to parse arguments: {e}");
            Map::new()
        }
    }
}

/// Resolves a tool call by function name.
#[async_trait]
pub trait ToolResolver: Send + Sync {
    /// Produce the output for `name`, or `None` when the function is unknown.
    async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Option<String>;
}

/// Fixed table of canned tool outputs.
#[derive(Debug, Clone)]
pub struct CannedTools {
    outputs: HashMap<String, String>,
}

impl Default for CannedTools {
    fn default() -> Self {
        Self::empty()
            .with_output("get_current_temperature", "57")
            .with_output("get_rain_probability", "0.06")
            .with_output("create_item", "Something happened")
    }
}

impl CannedTools {
    pub fn empty() -> Self {
        Self {
            outputs: HashMap::new(),
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), output.into());
        self
    }
}

#[async_trait]
impl ToolResolver for CannedTools {
    async fn call_tool(&self, name: &str, _arguments: &ToolArguments) -> Option<String> {
        self.outputs.get(name).cloned()
    }
}

/// Turns a batch of requested tool calls into the outputs to submit.
#[derive(Clone)]
pub struct ToolDispatcher {
    resolver: Arc<dyn ToolResolver>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(CannedTools::default()))
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher").finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(resolver: Arc<dyn ToolResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve every call, preserving request order. Unknown functions
    /// produce no entry.
    pub async fn resolve(&self, calls: &[ToolCall]) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            let arguments = parse_arguments(&call.arguments);
            info!(
                tool = %call.function_name,
                call_id = %call.id,
                "resolving tool call"
            );
            for (name, value) in &arguments {
                info!("  {name}: {value}");
            }

            match self.resolver.call_tool(&call.function_name, &arguments).await {
                Some(output) => outputs.push(ToolOutput {
                    tool_call_id: call.id.clone(),
                    output,
                }),
                None => warn!(
                    tool = %call.function_name,
                    call_id = %call.id,
                    "no resolver for tool, leaving it unanswered"
                ),
            }
        }

        info!(count = outputs.len(), "tool outputs resolved");
        outputs
    }
}
