//! Run event decoding.
//!
//! The Assistants API streams `event: <name>` / `data: <json>` SSE frames.
//! [`RunEventDecoder`] turns each frame into zero or more [`RunEvent`]s and
//! synthesizes the "created" notifications (first text part of a message,
//! first delta of a tool call) that the wire format only implies.

use std::collections::HashSet;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use super::types::{
    MessageDeltaEvent, MessageObject, Run, RunStep, RunStepDeltaEvent, ToolCall,
};
use crate::error::RelayError;

/// Events observed during one streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    RunCreated {
        run_id: String,
    },
    MessageCreated {
        message_id: String,
    },
    MessageDelta {
        message_id: String,
    },
    /// First delta of a text content part.
    TextCreated {
        message_id: String,
        index: usize,
    },
    TextDelta {
        message_id: String,
        index: usize,
        value: String,
    },
    /// First delta of a function tool call inside a run step.
    ToolCallCreated {
        call: ToolCall,
    },
    CodeInterpreter {
        input: Option<String>,
        logs: Vec<String>,
    },
    RunStepDelta {
        step_id: String,
    },
    RunStepDone {
        step_id: String,
        status: String,
    },
    RequiresAction {
        run_id: String,
        tool_calls: Vec<ToolCall>,
    },
    RunCompleted {
        run_id: String,
    },
    /// failed / cancelled / expired / incomplete
    RunFailed {
        run_id: String,
        status: String,
        message: String,
    },
    Error {
        message: String,
    },
    End,
}

pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, RelayError>> + Send>>;

const DONE_MARKER: &str = "[DONE]";

/// Stateful SSE frame decoder for one streaming session.
#[derive(Debug, Default, Clone)]
pub struct RunEventDecoder {
    seen_text_parts: HashSet<(String, usize)>,
    seen_tool_calls: HashSet<(String, usize)>,
}

impl RunEventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a single SSE frame.
    pub fn decode(&mut self, event: &str, data: &str) -> Result<Vec<RunEvent>, RelayError> {
        let data = data.trim();
        if event == "done" || data == DONE_MARKER {
            return Ok(vec![RunEvent::End]);
        }

        match event {
            "thread.run.created" => {
                let run: Run = parse(event, data)?;
                Ok(vec![RunEvent::RunCreated { run_id: run.id }])
            }
            "thread.run.requires_action" => {
                let run: Run = parse(event, data)?;
                let tool_calls = run.required_tool_calls();
                Ok(vec![RunEvent::RequiresAction {
                    run_id: run.id,
                    tool_calls,
                }])
            }
            "thread.run.completed" => {
                let run: Run = parse(event, data)?;
                Ok(vec![RunEvent::RunCompleted { run_id: run.id }])
            }
            "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.incomplete" => {
                let run: Run = parse(event, data)?;
                let message = run
                    .last_error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("run {}", run.status));
                Ok(vec![RunEvent::RunFailed {
                    run_id: run.id,
                    status: run.status,
                    message,
                }])
            }
            "thread.run.step.delta" => {
                let step: RunStepDeltaEvent = parse(event, data)?;
                Ok(self.decode_step_delta(step))
            }
            "thread.run.step.completed" => {
                let step: RunStep = parse(event, data)?;
                Ok(vec![RunEvent::RunStepDone {
                    step_id: step.id,
                    status: step.status,
                }])
            }
            "thread.message.created" => {
                let message: MessageObject = parse(event, data)?;
                Ok(vec![RunEvent::MessageCreated {
                    message_id: message.id,
                }])
            }
            "thread.message.delta" => {
                let delta: MessageDeltaEvent = parse(event, data)?;
                Ok(self.decode_message_delta(delta))
            }
            "error" => Ok(vec![RunEvent::Error {
                message: error_message(data),
            }]),
            _ => Ok(Vec::new()),
        }
    }

    fn decode_message_delta(&mut self, delta: MessageDeltaEvent) -> Vec<RunEvent> {
        let message_id = delta.id;
        let mut out = vec![RunEvent::MessageDelta {
            message_id: message_id.clone(),
        }];

        for part in delta.delta.content {
            if part.kind != "text" {
                continue;
            }
            if self.seen_text_parts.insert((message_id.clone(), part.index)) {
                out.push(RunEvent::TextCreated {
                    message_id: message_id.clone(),
                    index: part.index,
                });
            }
            if let Some(value) = part.text.and_then(|t| t.value)
                && !value.is_empty()
            {
                out.push(RunEvent::TextDelta {
                    message_id: message_id.clone(),
                    index: part.index,
                    value,
                });
            }
        }
        out
    }

    fn decode_step_delta(&mut self, step: RunStepDeltaEvent) -> Vec<RunEvent> {
        let step_id = step.id;
        let mut out = vec![RunEvent::RunStepDelta {
            step_id: step_id.clone(),
        }];

        let Some(details) = step.delta.step_details else {
            return out;
        };

        for call in details.tool_calls {
            let first = self.seen_tool_calls.insert((step_id.clone(), call.index));
            match call.kind.as_str() {
                "function" if first => {
                    let (name, arguments) = call
                        .function
                        .map(|f| (f.name.unwrap_or_default(), f.arguments.unwrap_or_default()))
                        .unwrap_or_default();
                    out.push(RunEvent::ToolCallCreated {
                        call: ToolCall::new(call.id.unwrap_or_default(), name, arguments),
                    });
                }
                "code_interpreter" => {
                    if let Some(ci) = call.code_interpreter {
                        let logs: Vec<String> = ci
                            .outputs
                            .into_iter()
                            .filter(|o| o.kind == "logs")
                            .filter_map(|o| o.logs)
                            .collect();
                        let input = ci.input.filter(|s| !s.is_empty());
                        if input.is_some() || !logs.is_empty() {
                            out.push(RunEvent::CodeInterpreter { input, logs });
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }
}

fn parse<T: DeserializeOwned>(event: &str, data: &str) -> Result<T, RelayError> {
    serde_json::from_str(data)
        .map_err(|e| RelayError::ParseError(format!("Failed to parse `{event}` payload: {e}")))
}

fn error_message(data: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return data.to_string();
    };
    value
        .get("message")
        .or_else(|| value.get("error").and_then(|e| e.get("message")))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Convert a raw SSE byte stream into a stream of [`RunEvent`]s.
///
/// The stream ends after [`RunEvent::End`]. A transport or decoding failure,
/// or a connection that closes before the `done` frame, is yielded once as an
/// error and ends the stream.
pub fn decode_run_events<S, B, E>(byte_stream: S) -> RunEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let out = async_stream::stream! {
        let mut sse_stream = Box::pin(byte_stream.eventsource());
        let mut decoder = RunEventDecoder::new();

        while let Some(item) = sse_stream.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(RelayError::StreamError(format!("SSE stream error: {e}")));
                    return;
                }
            };

            let events = match decoder.decode(&frame.event, &frame.data) {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for event in events {
                let end = event == RunEvent::End;
                yield Ok(event);
                if end {
                    return;
                }
            }
        }

        yield Err(RelayError::StreamError("stream closed before [DONE]".to_string()));
    };

    Box::pin(out)
}
