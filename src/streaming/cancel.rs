//! Cancellation utilities
//!
//! A chat turn is cancelled when the HTTP response body carrying it is
//! dropped, which happens when the client disconnects.

use tokio_util::sync::{CancellationToken, DropGuard};

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The stream driver observing this handle stops
    /// reading the remote stream, which closes the upstream connection.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Guard that cancels this handle when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}
