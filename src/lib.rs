//! # assistant-relay
//!
//! SSE chat relay in front of the OpenAI Assistants API.
//!
#![deny(unsafe_code)]

//! The relay creates conversation threads on the hosted assistant service,
//! appends user messages to them and streams the assistant's reply back to
//! the caller as server-sent events. Tool calls requested by the run are
//! answered in-process and resubmitted, with the resumed output spliced into
//! the same response.
//!
//! ## Layout
//!
//! - [`assistants`]: typed client for the remote API and its run event stream
//! - [`streaming`]: chunk bridge, stream driver and response consumer
//! - [`tools`]: tool-call dispatch
//! - [`service`]: startup lifecycle and per-turn orchestration
//! - [`server`]: axum router and handlers
//! - [`config`], [`error`], [`telemetry`]: ambient plumbing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use assistant_relay::prelude::*;
//!
//! let config = RelayConfig::from_env()?;
//! let client = AssistantsClient::from_config(config.openai.clone())?;
//! let relay = RelayService::bootstrap(&config, Arc::new(client)).await?;
//! server::serve(&config.server, AppState::new(relay)).await?;
//! ```

pub mod assistants;
pub mod config;
pub mod error;
pub mod server;
pub mod service;
pub mod streaming;
pub mod telemetry;
pub mod tools;

pub use error::{RelayError, Result};

/// Commonly used types.
pub mod prelude {
    pub use crate::assistants::{AssistantBackend, AssistantsClient, RunEvent, RunEventStream};
    pub use crate::config::{OpenAiConfig, RelayConfig, TurnSettings};
    pub use crate::error::{RelayError, Result};
    pub use crate::server::{self, AppState, SseOptions};
    pub use crate::service::RelayService;
    pub use crate::streaming::{ChunkStream, TurnChunk};
    pub use crate::tools::{CannedTools, ToolDispatcher, ToolResolver};
}
