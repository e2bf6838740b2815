use futures::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenOutcome {
    Fulfilled,
    Failed,
}

/// Opaque handle to one outstanding asynchronous operation. The token
/// settles exactly once; observers are notified on settlement but
/// cannot see whether the operation succeeded or failed — a boundary's
/// contract is "is the work done", not "did it succeed".
#[derive(Clone)]
pub struct AsyncToken {
    settled: Shared<BoxFuture<'static, ()>>,
}

impl AsyncToken {
    /// A token settled manually through the returned handle. Dropping
    /// the handle without settling counts as a failure settlement so
    /// observers never hang on an abandoned operation.
    pub fn pending() -> (Self, SettleHandle) {
        let (tx, rx) = oneshot::channel::<TokenOutcome>();
        let token = Self { settled: rx.map(|_| ()).boxed().shared() };
        (token, SettleHandle { tx: Some(tx) })
    }

    /// Wraps any future; the token settles when the operation
    /// completes, its output discarded.
    pub fn from_future<F>(operation: F) -> Self
    where
        F: Future + Send + 'static,
    {
        Self { settled: operation.map(|_| ()).boxed().shared() }
    }

    /// A future resolving on settlement. Clonable and awaitable from
    /// any number of observers.
    pub fn settled(&self) -> impl Future<Output = ()> + Send + Unpin + 'static {
        self.settled.clone()
    }
}

impl fmt::Debug for AsyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncToken")
    }
}

pub struct SettleHandle {
    tx: Option<oneshot::Sender<TokenOutcome>>,
}

impl SettleHandle {
    pub fn fulfill(mut self) {
        self.finish(TokenOutcome::Fulfilled);
    }

    pub fn fail(mut self) {
        self.finish(TokenOutcome::Failed);
    }

    fn finish(&mut self, outcome: TokenOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl fmt::Debug for SettleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettleHandle").field("settled", &self.tx.is_none()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfill_settles_every_observer() {
        let (token, handle) = AsyncToken::pending();
        let first = token.settled();
        let second = token.settled();

        handle.fulfill();
        first.await;
        second.await;
    }

    #[tokio::test]
    async fn test_failure_settles_like_success() {
        let (token, handle) = AsyncToken::pending();
        handle.fail();
        token.settled().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_settles() {
        let (token, handle) = AsyncToken::pending();
        drop(handle);
        token.settled().await;
    }

    #[tokio::test]
    async fn test_from_future_settles_on_completion() {
        let token = AsyncToken::from_future(async { 42 });
        token.settled().await;
    }

    #[tokio::test]
    async fn test_clones_share_settlement() {
        let (token, handle) = AsyncToken::pending();
        let clone = token.clone();
        handle.fulfill();
        clone.settled().await;
        token.settled().await;
    }
}
