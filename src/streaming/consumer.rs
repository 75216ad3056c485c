//! Response generator for one chat turn.
//!
//! Drains a [`ChunkReceiver`] into a lazy stream the HTTP layer can write
//! out one chunk at a time.

use std::pin::Pin;

use futures::Stream;
use tracing::debug;

use super::bridge::{Chunk, ChunkReceiver};
use super::cancel::CancelHandle;

/// Item yielded to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnChunk {
    /// Assistant output.
    Text(String),
    /// Final item of a successful turn, carrying the configured completion
    /// marker. It is a completion signal, not content.
    Done(String),
    /// Final item of a failed turn.
    Error(String),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = TurnChunk> + Send>>;

/// Build the chunk stream for a turn.
///
/// When `cancel` is given, dropping the returned stream (for example because
/// the client went away) cancels it.
pub fn chunk_stream(
    mut receiver: ChunkReceiver,
    done_marker: impl Into<String>,
    cancel: Option<CancelHandle>,
) -> ChunkStream {
    let done_marker = done_marker.into();
    let guard = cancel.map(|c| c.drop_guard());

    let s = async_stream::stream! {
        let _guard = guard;
        while let Some(chunk) = receiver.recv().await {
            match chunk {
                Chunk::Text(text) => {
                    debug!(chunk = %text, "next chunk");
                    yield TurnChunk::Text(text);
                }
                Chunk::Done => {
                    yield TurnChunk::Done(done_marker);
                    break;
                }
                Chunk::Failed(message) => {
                    yield TurnChunk::Error(message);
                    break;
                }
            }
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::bridge::channel;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_text_then_done_marker() {
        let (tx, rx) = channel();
        tx.push("Hello");
        tx.push(" world");
        tx.finish();

        let chunks: Vec<_> = chunk_stream(rx, "[done]", None).collect().await;
        assert_eq!(
            chunks,
            vec![
                TurnChunk::Text("Hello".into()),
                TurnChunk::Text(" world".into()),
                TurnChunk::Done("[done]".into()),
            ]
        );
    }

    #[tokio::test]
    async fn failure_ends_the_stream() {
        let (tx, rx) = channel();
        tx.push("partial");
        tx.fail("upstream error 500: boom");

        let chunks: Vec<_> = chunk_stream(rx, "[done]", None).collect().await;
        assert_eq!(
            chunks,
            vec![
                TurnChunk::Text("partial".into()),
                TurnChunk::Error("upstream error 500: boom".into()),
            ]
        );
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_turn() {
        let (_tx, rx) = channel();
        let cancel = CancelHandle::new();
        let stream = chunk_stream(rx, "[done]", Some(cancel.clone()));
        assert!(!cancel.is_cancelled());
        drop(stream);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_late_chunks() {
        let (tx, rx) = channel();
        let mut stream = chunk_stream(rx, "[done]", None);

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.push("late");
            tx.finish();
        });

        assert_eq!(stream.next().await, Some(TurnChunk::Text("late".into())));
        assert_eq!(stream.next().await, Some(TurnChunk::Done("[done]".into())));
        assert_eq!(stream.next().await, None);
    }
}
