//! Remote assistant service.
//!
//! [`AssistantBackend`] is the seam between the relay and the hosted
//! Assistants API: thread creation, message append, streamed runs and
//! streamed tool-output submission. [`AssistantsClient`] is the reqwest
//! implementation; tests substitute scripted backends.

use async_trait::async_trait;

use crate::error::RelayError;

pub mod client;
pub mod events;
pub mod types;

pub use client::AssistantsClient;
pub use events::{RunEvent, RunEventDecoder, RunEventStream, decode_run_events};
pub use types::{
    Assistant, AssistantTool, CreateAssistantRequest, FunctionDefinition, Thread, ThreadMessage,
    ToolCall, ToolOutput,
};

/// Operations the relay needs from the remote assistant service.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Register an assistant. Called once at startup.
    async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> Result<Assistant, RelayError>;

    async fn create_thread(&self) -> Result<Thread, RelayError>;

    /// Append a user message to a thread.
    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, RelayError>;

    /// Start a run on `thread_id` and stream its events.
    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RunEventStream, RelayError>;

    /// Submit tool outputs for a run waiting on them and stream the resumed run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_outputs: Vec<ToolOutput>,
    ) -> Result<RunEventStream, RelayError>;
}
