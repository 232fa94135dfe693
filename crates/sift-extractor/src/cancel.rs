//! Cooperative cancellation for one extraction run

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation flag shared between a session and its running extraction
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel every holder of this token
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail early
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
