//! Chunk bridge between the stream driver and the response consumer.
//!
//! An unbounded single-producer/single-consumer queue. The producer never
//! waits on the consumer: the remote stream keeps delivering events at
//! network pace and a slow HTTP client must not stall it. End of stream is an
//! explicit item rather than channel closure.

use tokio::sync::mpsc;

/// Item carried by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    /// Successful end of the turn.
    Done,
    /// The turn ended with an error; the message is client-safe.
    Failed(String),
}

impl Chunk {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Done | Chunk::Failed(_))
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChunkSender { tx },
        ChunkReceiver {
            rx,
            terminated: false,
        },
    )
}

/// Producer half. Callable from any thread or task.
///
/// The terminal operations consume the sender, so a producer can enqueue at
/// most one terminal item.
#[derive(Debug)]
pub struct ChunkSender {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl ChunkSender {
    /// Enqueue a text chunk. Returns `false` once the receiver is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.tx.send(Chunk::Text(text.into())).is_ok()
    }

    /// Enqueue the end-of-stream sentinel.
    pub fn finish(self) -> bool {
        self.tx.send(Chunk::Done).is_ok()
    }

    /// Enqueue a failure as the final item.
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.tx.send(Chunk::Failed(message.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::UnboundedReceiver<Chunk>,
    terminated: bool,
}

impl ChunkReceiver {
    /// Wait for the next chunk.
    ///
    /// Returns `None` after a terminal item has been returned. A producer that
    /// disappears without a terminal item is reported as [`Chunk::Failed`].
    pub async fn recv(&mut self) -> Option<Chunk> {
        if self.terminated {
            return None;
        }
        let chunk = self.rx.recv().await.unwrap_or_else(|| {
            Chunk::Failed("stream producer stopped before completing".to_string())
        });
        self.terminated = chunk.is_terminal();
        Some(chunk)
    }
}
