//! Cooperative cancellation for dispatched operations.
//!
//! A [`CancellationTokenSource`] owns the right to trigger; the
//! [`CancellationToken`]s it hands out can only observe. Work running against
//! the daemon polls its token and fails with [`ConnectionError::Cancelled`]
//! once it has been triggered. Nothing is ever interrupted preemptively.

use crate::error::ConnectionError;
use tracing::debug;

/// Creates tokens and triggers them.
#[derive(Debug, Default)]
pub struct CancellationTokenSource {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A read-only view onto this source. All tokens from one source share
    /// the same state.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: self.inner.clone(),
        }
    }

    /// Trigger every token handed out by this source. Calling this more than
    /// once has no further effect.
    pub fn cancel(&self) {
        if !self.inner.is_cancelled() {
            debug!("Cancellation requested");
        }
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Observer side of a cancellation latch.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is triggered.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Convenience for work functions: `token.ensure_not_cancelled()?`.
    pub fn ensure_not_cancelled(&self) -> Result<(), ConnectionError> {
        if self.is_cancellation_requested() {
            Err(ConnectionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Used by the executor on forced stop.
    pub(crate) fn trigger(&self) {
        self.inner.cancel();
    }
}
