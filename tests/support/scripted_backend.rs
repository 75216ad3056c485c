//! Test support: an in-memory `AssistantBackend` that replays scripted run
//! sessions, plus SSE fixture loading.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use assistant_relay::assistants::types::{
    Assistant, CreateAssistantRequest, Thread, ThreadMessage, ToolOutput,
};
use assistant_relay::assistants::{AssistantBackend, RunEvent, RunEventStream, decode_run_events};
use assistant_relay::config::{OpenAiConfig, RelayConfig, TurnSettings};
use assistant_relay::error::{RelayError, Result};
use async_trait::async_trait;

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("assistants")
        .join("sse")
        .join(name)
}

/// Load an `.sse` fixture and split it into one byte chunk per SSE event.
pub fn load_sse_fixture(name: &str) -> Vec<std::result::Result<Vec<u8>, std::io::Error>> {
    let raw = std::fs::read_to_string(fixture_path(name)).expect("read fixture file");
    let normalized = raw.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(|chunk| chunk.trim_end_matches('\n'))
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| Ok(format!("{chunk}\n\n").into_bytes()))
        .collect()
}

pub fn fixture_body(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("read fixture file")
}

/// One scripted remote session.
pub enum Session {
    /// Decode an SSE fixture file.
    Fixture(&'static str),
    /// Yield these events, then end.
    Events(Vec<RunEvent>),
    /// Yield these events, then stay open until dropped. The flag is set
    /// when the stream is dropped.
    Hanging(Vec<RunEvent>, Arc<AtomicBool>),
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Session {
    fn into_stream(self) -> RunEventStream {
        match self {
            Session::Fixture(name) => {
                decode_run_events(futures::stream::iter(load_sse_fixture(name)))
            }
            Session::Events(events) => Box::pin(futures::stream::iter(
                events.into_iter().map(Ok::<_, RelayError>),
            )),
            Session::Hanging(events, flag) => {
                let guard = DropFlag(flag);
                Box::pin(async_stream::stream! {
                    let _guard = guard;
                    for event in events {
                        yield Ok::<_, RelayError>(event);
                    }
                    futures::future::pending::<()>().await;
                })
            }
        }
    }
}

/// Calls observed by the backend.
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub assistants_created: usize,
    pub threads_created: usize,
    pub messages: Vec<(String, String)>,
    pub runs: Vec<(String, String)>,
    pub submissions: Vec<(String, Vec<ToolOutput>)>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    sessions: Mutex<VecDeque<Session>>,
    calls: Mutex<Calls>,
    fail_all: bool,
    fail_messages: bool,
}

impl ScriptedBackend {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            ..Default::default()
        }
    }

    /// Every remote call fails as if the service were unreachable.
    pub fn unreachable() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    /// Appending a message fails with a remote 404.
    pub fn rejecting_messages() -> Self {
        Self {
            fail_messages: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.fail_all {
            return Err(RelayError::HttpError("connection refused".into()));
        }
        Ok(())
    }

    fn next_session(&self) -> Result<RunEventStream> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RelayError::InternalError("no scripted session left".into()))?;
        Ok(session.into_stream())
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_assistant(&self, _request: &CreateAssistantRequest) -> Result<Assistant> {
        self.check_reachable()?;
        self.calls.lock().unwrap().assistants_created += 1;
        Ok(Assistant {
            id: "asst_scripted".into(),
            name: Some("Weather forecast assistant".into()),
            model: Some("gpt-4o".into()),
        })
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.check_reachable()?;
        self.calls.lock().unwrap().threads_created += 1;
        Ok(Thread {
            id: "thread_abc".into(),
            created_at: None,
            metadata: None,
        })
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        self.check_reachable()?;
        if self.fail_messages {
            return Err(RelayError::api_error(
                404,
                format!("No thread found with id '{thread_id}'."),
            ));
        }
        self.calls
            .lock()
            .unwrap()
            .messages
            .push((thread_id.to_string(), content.to_string()));
        Ok(ThreadMessage {
            id: "msg_user".into(),
            thread_id: Some(thread_id.to_string()),
            role: Some("user".into()),
        })
    }

    async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunEventStream> {
        self.check_reachable()?;
        self.calls
            .lock()
            .unwrap()
            .runs
            .push((thread_id.to_string(), assistant_id.to_string()));
        self.next_session()
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        tool_outputs: Vec<ToolOutput>,
    ) -> Result<RunEventStream> {
        self.check_reachable()?;
        self.calls
            .lock()
            .unwrap()
            .submissions
            .push((run_id.to_string(), tool_outputs));
        self.next_session()
    }
}

pub fn test_config() -> RelayConfig {
    RelayConfig::new(OpenAiConfig::new("sk-test"))
}

pub fn test_config_with(turn: TurnSettings) -> RelayConfig {
    test_config().with_turn_settings(turn)
}
