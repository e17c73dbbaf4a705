// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error taxonomy for future delivery and access (conc.future/ERR1-ERR2).

use std::fmt;
use std::sync::Arc;

/// A server-installed exception, re-raised verbatim from every subsequent
/// blocking or post-wait access.
///
/// Wrapping in `Arc` lets `get()`/`peek()` re-raise the same cause on repeat
/// access without requiring the caller's error type to implement `Clone`.
#[derive(Clone)]
pub struct Cause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Cause {
    /// Wrap any boxable error as a future's delivered exception.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Cause(Arc::new(err))
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Error surfaced by a future's blocking (`get`) or post-wait (`peek`) access.
///
/// `Cancelled` for a cancelled future,
/// `Exception` for a server-installed cause. Misuse conditions (peeking
/// before a blocking access, resetting a future with live waiters) are
/// `debug_assert!`/`panic!`, not part of this enum — they are programmer
/// errors, not recoverable outcomes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FutureError {
    /// The future was cancelled before a value or exception was delivered.
    #[error("future was cancelled")]
    Cancelled,
    /// The server installed an exception instead of a value.
    #[error(transparent)]
    Exception(#[from] Cause),
}
