//! Deadline and cancellation plumbing shared by every fetch.
//!
//! A [`FetchScope`] is created once per fetch. Each suspension point (HTTP
//! I/O, browser startup, CDP round-trips, settle sleeps) is awaited through
//! [`FetchScope::run`] or [`FetchScope::sleep`], which race it against the
//! caller's [`CancellationToken`] and the shared deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use trawl_common::FetchError;

pub use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct FetchScope {
    cancel: CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl FetchScope {
    /// Start a scope whose deadline is `budget` from now.
    ///
    /// ```
    /// use std::time::Duration;
    /// use trawl_runtime::{CancellationToken, FetchScope};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let cancel = CancellationToken::new();
    /// let scope = FetchScope::new(&cancel, Duration::from_secs(60));
    /// let value = scope.run(async { Ok(2 + 2) }).await.unwrap();
    /// assert_eq!(value, 4);
    /// # });
    /// ```
    pub fn new(cancel: &CancellationToken, budget: Duration) -> Self {
        Self {
            cancel: cancel.child_token(),
            deadline: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await `fut` unless the scope is cancelled or its deadline passes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(target: "trawl::scope", "fetch cancelled");
                Err(FetchError::Cancelled)
            }
            _ = sleep_until(self.deadline) => {
                tracing::debug!(target: "trawl::scope", budget_ms = self.budget.as_millis() as u64, "fetch deadline reached");
                Err(FetchError::Timeout(self.budget))
            }
            res = fut => res,
        }
    }

    /// Cancellable settle sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), FetchError> {
        self.run(async {
            sleep(duration).await;
            Ok(())
        })
        .await
    }
}
