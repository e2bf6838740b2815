use futures::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The episode timer every registration races against. With a
/// configured maximum wait it settles after that duration elapses;
/// without one it settles on the next scheduling turn, which is the
/// immediate-fallback policy.
#[derive(Clone)]
pub struct TimeoutSignal {
    completed: Arc<AtomicBool>,
    settled: Shared<BoxFuture<'static, ()>>,
}

impl TimeoutSignal {
    pub fn arm(max_duration: Option<Duration>) -> Self {
        let completed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&completed);
        let settled = async move {
            match max_duration {
                Some(wait) => tokio::time::sleep(wait).await,
                None => tokio::task::yield_now().await,
            }
            flag.store(true, Ordering::SeqCst);
        }
        .boxed()
        .shared();
        Self { completed, settled }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn settled(&self) -> impl Future<Output = ()> + Send + Unpin + 'static {
        self.settled.clone()
    }
}

impl fmt::Debug for TimeoutSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutSignal").field("completed", &self.is_completed()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_signal_settles_next_turn() {
        let signal = TimeoutSignal::arm(None);
        assert!(!signal.is_completed());

        signal.settled().await;
        assert!(signal.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_signal_waits_for_duration() {
        let signal = TimeoutSignal::arm(Some(Duration::from_millis(200)));

        let observer = tokio::spawn(signal.settled());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!signal.is_completed());

        tokio::time::sleep(Duration::from_millis(150)).await;
        observer.await.expect("observer task");
        assert!(signal.is_completed());
    }

    #[tokio::test]
    async fn test_clones_share_completion() {
        let signal = TimeoutSignal::arm(None);
        let clone = signal.clone();
        signal.settled().await;
        assert!(clone.is_completed());
    }
}
