//! Stream driver.
//!
//! Consumes the remote run event streams of one chat turn on a dedicated
//! task and feeds the bridge. Tool-call rounds are handled in a loop:
//!
//! ```text
//! Streaming --requires_action--> Resolving --> Resubmitting --> Streaming
//!     |                                                            |
//!     +------------- pass ends without pending action -------------+--> Done
//! ```
//!
//! Every pass writes into the same sender, so chunks from resubmitted and
//! follow-up sessions are spliced into the original response in arrival
//! order. The single terminal item is pushed once the whole loop is over.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info};

use super::bridge::ChunkSender;
use super::cancel::CancelHandle;
use crate::assistants::types::ToolCall;
use crate::assistants::{AssistantBackend, RunEvent, RunEventStream};
use crate::config::TurnSettings;
use crate::error::{RelayError, Result};
use crate::tools::{ToolDispatcher, parse_arguments};

/// Run that stopped to wait for tool outputs.
#[derive(Debug)]
struct PendingAction {
    run_id: String,
    tool_calls: Vec<ToolCall>,
}

/// Drives the remote streaming sessions of chat turns.
#[derive(Clone)]
pub struct StreamDriver {
    backend: Arc<dyn AssistantBackend>,
    dispatcher: ToolDispatcher,
    assistant_id: String,
    settings: TurnSettings,
}

impl std::fmt::Debug for StreamDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDriver")
            .field("assistant_id", &self.assistant_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StreamDriver {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        dispatcher: ToolDispatcher,
        assistant_id: impl Into<String>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            assistant_id: assistant_id.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Drive `session` (an already opened run stream on `thread_id`) to the
    /// end of the turn on a new task.
    ///
    /// The task pushes exactly one terminal item into `sender` unless
    /// `cancel` fires first, in which case it stops reading the remote
    /// stream and enqueues nothing further.
    pub fn spawn(
        &self,
        thread_id: String,
        session: RunEventStream,
        sender: ChunkSender,
        cancel: CancelHandle,
    ) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(
            async move { driver.run(thread_id, session, sender, cancel).await }
                .in_current_span(),
        )
    }

    async fn run(
        self,
        thread_id: String,
        session: RunEventStream,
        sender: ChunkSender,
        cancel: CancelHandle,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            result = self.drive(&thread_id, session, &sender) => result,
        };

        match outcome {
            Ok(()) => {
                debug!(%thread_id, "turn complete");
                sender.finish();
            }
            Err(RelayError::Cancelled) => {
                debug!(%thread_id, "turn cancelled, remote stream dropped");
            }
            Err(e) => {
                error!(%thread_id, error = %e, "turn failed");
                sender.fail(e.user_message());
            }
        }
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut session: RunEventStream,
        sender: &ChunkSender,
    ) -> Result<()> {
        let mut rounds = 0usize;
        let mut resumed = false;

        loop {
            match self.pump(&mut session, sender).await? {
                Some(action) => {
                    rounds += 1;
                    if rounds > self.settings.max_tool_rounds {
                        return Err(RelayError::ToolRoundLimit(self.settings.max_tool_rounds));
                    }

                    info!(
                        run_id = %action.run_id,
                        round = rounds,
                        calls = action.tool_calls.len(),
                        "run requires action"
                    );
                    let outputs = self.dispatcher.resolve(&action.tool_calls).await;
                    session = self
                        .backend
                        .submit_tool_outputs(thread_id, &action.run_id, outputs)
                        .await?;
                    resumed = true;
                }
                None if resumed && self.settings.follow_up_run => {
                    debug!(%thread_id, "opening follow-up run");
                    resumed = false;
                    session = self
                        .backend
                        .stream_run(thread_id, &self.assistant_id)
                        .await?;
                }
                None => return Ok(()),
            }
        }
    }

    /// Drain one session into the bridge. Returns the action the run is
    /// waiting on, if any.
    async fn pump(
        &self,
        session: &mut RunEventStream,
        sender: &ChunkSender,
    ) -> Result<Option<PendingAction>> {
        let mut pending = None;

        while let Some(event) = session.next().await {
            match event? {
                RunEvent::TextCreated { .. } => {
                    sender.push(self.settings.text_prefix.as_str());
                }
                RunEvent::TextDelta { value, .. } => {
                    sender.push(value);
                }
                RunEvent::ToolCallCreated { call } => {
                    let arguments = parse_arguments(&call.arguments);
                    info!(tool = %call.function_name, "tool call created with arguments:");
                    for (name, value) in &arguments {
                        info!("  {name}: {value}");
                    }
                    if self.settings.announce_tool_calls {
                        sender.push(format!("\ntool call > {}\n", call.function_name));
                    }
                }
                RunEvent::CodeInterpreter { input, logs } => {
                    if let Some(input) = input {
                        sender.push(input);
                    }
                    if !logs.is_empty() {
                        sender.push("\noutput >");
                        for log in logs {
                            sender.push(log);
                        }
                    }
                }
                RunEvent::RequiresAction { run_id, tool_calls } => {
                    pending = Some(PendingAction { run_id, tool_calls });
                }
                RunEvent::RunFailed {
                    run_id,
                    status,
                    message,
                } => {
                    return Err(RelayError::RunFailed {
                        run_id,
                        status,
                        message,
                    });
                }
                RunEvent::Error { message } => {
                    return Err(RelayError::StreamError(message));
                }
                RunEvent::End => break,
                other => debug!(event = ?other, "run event"),
            }
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistants::types::{Assistant, CreateAssistantRequest, Thread, ThreadMessage, ToolOutput};
    use crate::streaming::bridge::{Chunk, channel};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend whose follow-up sessions are taken from a script.
    #[derive(Default)]
    struct Scripted {
        sessions: Mutex<VecDeque<Vec<RunEvent>>>,
        submitted: Mutex<Vec<(String, Vec<ToolOutput>)>>,
        runs_opened: Mutex<usize>,
    }

    impl Scripted {
        fn with_sessions(sessions: Vec<Vec<RunEvent>>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                ..Default::default()
            }
        }

        fn next_session(&self) -> Result<RunEventStream> {
            let events = self
                .sessions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| RelayError::InternalError("script exhausted".into()))?;
            Ok(session(events))
        }
    }

    #[async_trait]
    impl AssistantBackend for Scripted {
        async fn create_assistant(&self, _request: &CreateAssistantRequest) -> Result<Assistant> {
            unreachable!()
        }

        async fn create_thread(&self) -> Result<Thread> {
            unreachable!()
        }

        async fn create_message(&self, _thread_id: &str, _content: &str) -> Result<ThreadMessage> {
            unreachable!()
        }

        async fn stream_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<RunEventStream> {
            *self.runs_opened.lock().unwrap() += 1;
            self.next_session()
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            run_id: &str,
            tool_outputs: Vec<ToolOutput>,
        ) -> Result<RunEventStream> {
            self.submitted
                .lock()
                .unwrap()
                .push((run_id.to_string(), tool_outputs));
            self.next_session()
        }
    }

    fn session(events: Vec<RunEvent>) -> RunEventStream {
        Box::pin(futures::stream::iter(
            events.into_iter().map(Ok::<_, RelayError>),
        ))
    }

    fn text(message_id: &str, value: &str) -> RunEvent {
        RunEvent::TextDelta {
            message_id: message_id.into(),
            index: 0,
            value: value.into(),
        }
    }

    fn requires_action(run_id: &str) -> RunEvent {
        RunEvent::RequiresAction {
            run_id: run_id.into(),
            tool_calls: vec![ToolCall::new(
                "call_1",
                "get_current_temperature",
                r#"{"location":"SF"}"#,
            )],
        }
    }

    async fn drain(mut rx: crate::streaming::bridge::ChunkReceiver) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.push(chunk);
        }
        out
    }

    fn driver(backend: Arc<Scripted>, settings: TurnSettings) -> StreamDriver {
        StreamDriver::new(backend, ToolDispatcher::default(), "asst_1", settings)
    }

    #[tokio::test]
    async fn plain_run_ends_with_single_sentinel() {
        let backend = Arc::new(Scripted::default());
        let (tx, rx) = channel();
        driver(backend, TurnSettings::default())
            .spawn(
                "thread_1".into(),
                session(vec![
                    RunEvent::TextCreated {
                        message_id: "m".into(),
                        index: 0,
                    },
                    text("m", "Hi"),
                    text("m", "!"),
                    RunEvent::RunCompleted {
                        run_id: "run_1".into(),
                    },
                    RunEvent::End,
                ]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![
                Chunk::Text("\nassistant > ".into()),
                Chunk::Text("Hi".into()),
                Chunk::Text("!".into()),
                Chunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn tool_round_splices_nested_chunks_before_sentinel() {
        let backend = Arc::new(Scripted::with_sessions(vec![
            vec![text("m2", "It is 57F."), RunEvent::End],
            vec![text("m3", " Anything else?"), RunEvent::End],
        ]));
        let (tx, rx) = channel();
        driver(backend.clone(), TurnSettings::default())
            .spawn(
                "thread_1".into(),
                session(vec![
                    text("m1", "Checking"),
                    requires_action("run_1"),
                    RunEvent::End,
                ]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![
                Chunk::Text("Checking".into()),
                Chunk::Text("It is 57F.".into()),
                Chunk::Text(" Anything else?".into()),
                Chunk::Done,
            ]
        );

        let submitted = backend.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, "run_1");
        assert_eq!(
            submitted[0].1,
            vec![ToolOutput {
                tool_call_id: "call_1".into(),
                output: "57".into()
            }]
        );
        assert_eq!(*backend.runs_opened.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn follow_up_run_can_be_disabled() {
        let backend = Arc::new(Scripted::with_sessions(vec![vec![
            text("m2", "57F"),
            RunEvent::End,
        ]]));
        let settings = TurnSettings {
            follow_up_run: false,
            ..Default::default()
        };
        let (tx, rx) = channel();
        driver(backend.clone(), settings)
            .spawn(
                "thread_1".into(),
                session(vec![requires_action("run_1"), RunEvent::End]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![Chunk::Text("57F".into()), Chunk::Done]
        );
        assert_eq!(*backend.runs_opened.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn remote_failure_becomes_terminal_failure() {
        let backend = Arc::new(Scripted::default());
        let (tx, rx) = channel();
        driver(backend, TurnSettings::default())
            .spawn(
                "thread_1".into(),
                session(vec![
                    text("m", "partial"),
                    RunEvent::RunFailed {
                        run_id: "run_1".into(),
                        status: "failed".into(),
                        message: "Rate limit reached".into(),
                    },
                ]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![
                Chunk::Text("partial".into()),
                Chunk::Failed("assistant run failed".into()),
            ]
        );
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let backend = Arc::new(Scripted::with_sessions(vec![vec![
            requires_action("run_1"),
            RunEvent::End,
        ]]));
        let settings = TurnSettings {
            max_tool_rounds: 1,
            ..Default::default()
        };
        let (tx, rx) = channel();
        driver(backend, settings)
            .spawn(
                "thread_1".into(),
                session(vec![requires_action("run_1"), RunEvent::End]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![Chunk::Failed("tool round limit of 1 exceeded".into())]
        );
    }

    #[tokio::test]
    async fn tool_call_and_code_interpreter_chunks() {
        let backend = Arc::new(Scripted::default());
        let (tx, rx) = channel();
        driver(backend, TurnSettings::default())
            .spawn(
                "thread_1".into(),
                session(vec![
                    RunEvent::ToolCallCreated {
                        call: ToolCall::new("call_1", "get_rain_probability", ""),
                    },
                    RunEvent::CodeInterpreter {
                        input: Some("print(2)".into()),
                        logs: vec!["2\n".into()],
                    },
                    RunEvent::End,
                ]),
                tx,
                CancelHandle::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            drain(rx).await,
            vec![
                Chunk::Text("\ntool call > get_rain_probability\n".into()),
                Chunk::Text("print(2)".into()),
                Chunk::Text("\noutput >".into()),
                Chunk::Text("2\n".into()),
                Chunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_without_terminal_item() {
        let backend = Arc::new(Scripted::default());
        let (tx, mut rx) = channel();
        let cancel = CancelHandle::new();
        let pending: RunEventStream = Box::pin(
            futures::stream::iter(vec![Ok::<_, RelayError>(text("m", "first"))])
                .chain(futures::stream::pending()),
        );

        let handle = driver(backend, TurnSettings::default()).spawn(
            "thread_1".into(),
            pending,
            tx,
            cancel.clone(),
        );

        assert_eq!(rx.recv().await, Some(Chunk::Text("first".into())));
        cancel.cancel();
        handle.await.unwrap();

        // The sender was dropped without a terminal item.
        assert!(matches!(rx.recv().await, Some(Chunk::Failed(_))));
    }
}
