//! Relay service.
//!
//! Owns the long-lived state of the relay: the remote backend, the assistant
//! registered at startup and the stream driver. Handlers call into it through
//! an `Arc` held in the axum state.

use std::sync::Arc;

use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::assistants::{AssistantBackend, Thread};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::streaming::{CancelHandle, ChunkStream, StreamDriver, channel, chunk_stream};
use crate::tools::ToolDispatcher;

#[derive(Clone)]
pub struct RelayService {
    backend: Arc<dyn AssistantBackend>,
    driver: StreamDriver,
    assistant_id: String,
}

impl std::fmt::Debug for RelayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayService")
            .field("assistant_id", &self.assistant_id)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl RelayService {
    /// Register the configured assistant (or adopt the configured id) and
    /// build the service with the default canned tool table.
    pub async fn bootstrap(config: &RelayConfig, backend: Arc<dyn AssistantBackend>) -> Result<Self> {
        Self::bootstrap_with_dispatcher(config, backend, ToolDispatcher::default()).await
    }

    pub async fn bootstrap_with_dispatcher(
        config: &RelayConfig,
        backend: Arc<dyn AssistantBackend>,
        dispatcher: ToolDispatcher,
    ) -> Result<Self> {
        let assistant_id = match &config.assistant.id {
            Some(id) => {
                info!(assistant_id = %id, "using configured assistant");
                id.clone()
            }
            None => {
                let assistant = backend
                    .create_assistant(&config.assistant.to_create_request())
                    .await?;
                info!(
                    assistant_id = %assistant.id,
                    model = %config.assistant.model,
                    "registered assistant"
                );
                assistant.id
            }
        };

        let driver = StreamDriver::new(
            backend.clone(),
            dispatcher,
            assistant_id.clone(),
            config.turn.clone(),
        );
        Ok(Self {
            backend,
            driver,
            assistant_id,
        })
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub async fn create_thread(&self) -> Result<Thread> {
        let thread = self.backend.create_thread().await?;
        info!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    /// Start a chat turn.
    ///
    /// The message is appended and the first run stream opened before this
    /// returns, so failures at that point reach the caller. Everything after
    /// arrives through the returned stream, which always ends with either the
    /// completion marker or an error item. Dropping it cancels the turn.
    pub async fn start_turn(&self, thread_id: &str, message: &str) -> Result<ChunkStream> {
        let turn_id = Uuid::new_v4();
        let span = info_span!("chat_turn", %turn_id, %thread_id);

        async {
            info!(chars = message.chars().count(), "chat request");
            self.backend.create_message(thread_id, message).await?;
            let session = self
                .backend
                .stream_run(thread_id, &self.assistant_id)
                .await?;

            let (sender, receiver) = channel();
            let cancel = CancelHandle::new();
            self.driver
                .spawn(thread_id.to_string(), session, sender, cancel.clone());

            Ok::<_, RelayError>(chunk_stream(
                receiver,
                self.driver.settings().done_marker.clone(),
                Some(cancel),
            ))
        }
        .instrument(span)
        .await
    }
}
