//! Assistants v2 wire types.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! remote payloads is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A function the assistant may ask the relay to call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl FunctionDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }
}

/// Tool attached to an assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    Function { function: FunctionDefinition },
    CodeInterpreter,
    FileSearch,
}

impl AssistantTool {
    pub fn function(definition: FunctionDefinition) -> Self {
        Self::Function {
            function: definition,
        }
    }
}

/// `POST /assistants` body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAssistantRequest {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<AssistantTool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Remote conversation. Owned by the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `POST /threads/{thread_id}/messages` body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest {
    pub role: &'static str,
    pub content: String,
}

impl CreateMessageRequest {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// `POST /threads/{thread_id}/runs` body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    pub stream: bool,
}

/// `POST /threads/{thread_id}/runs/{run_id}/submit_tool_outputs` body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
    pub stream: bool,
}

/// Run object carried by `thread.run.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunLastError>,
}

impl Run {
    /// Tool calls the run is waiting on, if any.
    pub fn required_tool_calls(&self) -> Vec<ToolCall> {
        self.required_action
            .as_ref()
            .and_then(|action| action.submit_tool_outputs.as_ref())
            .map(|submit| submit.tool_calls.iter().cloned().map(ToolCall::from).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputsAction {
    #[serde(default)]
    pub tool_calls: Vec<RequiredToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunLastError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// A tool invocation requested by a run.
///
/// `arguments` is the raw JSON text sent by the remote service; it is decoded
/// lazily by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        function_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            arguments: arguments.into(),
        }
    }
}

impl From<RequiredToolCall> for ToolCall {
    fn from(call: RequiredToolCall) -> Self {
        Self {
            id: call.id,
            function_name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

/// Result of one tool call, submitted back to the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

// ---------------------------------------------------------------------------
// Streaming payloads
// ---------------------------------------------------------------------------

/// `thread.message.delta` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaEvent {
    pub id: String,
    #[serde(default)]
    pub delta: MessageDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub content: Vec<MessageContentDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContentDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContentDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContentDelta {
    #[serde(default)]
    pub value: Option<String>,
}

/// `thread.message.created` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// `thread.run.step.delta` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RunStepDeltaEvent {
    pub id: String,
    #[serde(default)]
    pub delta: RunStepDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStepDelta {
    #[serde(default)]
    pub step_details: Option<StepDetailsDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDetailsDelta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
    #[serde(default)]
    pub code_interpreter: Option<CodeInterpreterDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeInterpreterDelta {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub outputs: Vec<CodeInterpreterOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeInterpreterOutput {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub logs: Option<String>,
}

/// `thread.run.step.completed` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RunStep {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}
