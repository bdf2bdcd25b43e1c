//! Cancellation support for stream sessions
//!
//! Lets the HTTP layer abort a session and ties the heartbeat to its
//! session's lifetime.

use tokio_util::sync::CancellationToken;

/// Wrapper around CancellationToken for session cancellation
#[derive(Clone, Debug)]
pub struct SessionCancellation {
    token: CancellationToken,
}

impl SessionCancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel the session and everything started from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, for child tasks
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for SessionCancellation {
    fn default() -> Self {
        Self::new()
    }
}
