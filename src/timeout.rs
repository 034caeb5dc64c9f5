//! Bounded-wait helper
//!
//! Every operation with an unbounded-but-practically-bounded duration (the
//! biometric prompt above all) goes through [`bounded`] instead of an ad hoc
//! race between futures, so cancellation and timeout behave the same way at
//! every call site.

use std::future::Future;
use std::time::Duration;

/// The bounded wait elapsed before the inner future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    /// The limit that was exceeded.
    pub limit: Duration,
}

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation exceeded its {:?} bound", self.limit)
    }
}

impl std::error::Error for Elapsed {}

/// Run `fut` with an upper bound on wall-clock time.
///
/// On expiry the inner future is dropped, which cancels it at its next
/// suspension point.
pub async fn bounded<F>(limit: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed { limit })
}
