//! Streaming core of a chat turn.
//!
//! - [`bridge`]: unbounded chunk queue between the driver task and the
//!   response body
//! - [`driver`]: consumes remote run events and handles tool-call rounds
//! - [`consumer`]: turns the queue into the stream the HTTP layer writes out
//! - [`cancel`]: cancellation handle tied to the response body

pub mod bridge;
pub mod cancel;
pub mod consumer;
pub mod driver;

pub use bridge::{Chunk, ChunkReceiver, ChunkSender, channel};
pub use cancel::CancelHandle;
pub use consumer::{ChunkStream, TurnChunk, chunk_stream};
pub use driver::StreamDriver;
