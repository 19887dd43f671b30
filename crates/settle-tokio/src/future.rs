use std::borrow::Cow;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use settle_runtime::{FinishReason, Operation};

use crate::Instrumentation;

/// Future that keeps its resource busy until it resolves or is dropped.
pub struct TrackedFuture<F: Future> {
    inner: F,
    operation: Option<Operation>,
    classify: fn(&F::Output) -> FinishReason,
}

impl<F: Future> TrackedFuture<F> {
    fn new(inner: F, operation: Operation, classify: fn(&F::Output) -> FinishReason) -> Self {
        Self {
            inner,
            operation: Some(operation),
            classify,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.operation.is_none()
    }
}

impl<F: Future> Future for TrackedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is never moved out of `self`; `operation` and
        // `classify` are not structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };

        match inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => {
                if let Some(operation) = this.operation.take() {
                    operation.finish((this.classify)(&output));
                }
                Poll::Ready(output)
            }
        }
    }
}

fn always_completed<T>(_: &T) -> FinishReason {
    FinishReason::Completed
}

fn by_result<T, E>(output: &Result<T, E>) -> FinishReason {
    match output {
        Ok(_) => FinishReason::Completed,
        Err(_) => FinishReason::Error,
    }
}

/// Attaches idle tracking to any future.
///
/// ```rust,no_run
/// use settle_tokio::{FutureExt as _, Instrumentation};
///
/// # async fn fetch_profile() -> Result<String, std::io::Error> { Ok(String::new()) }
/// # async fn demo(instrumentation: Instrumentation) {
/// let profile = fetch_profile()
///     .tracked_try(&instrumentation, "fetch_profile")
///     .await;
/// # }
/// ```
pub trait FutureExt: IntoFuture + Sized {
    /// Starts an operation now and finishes it when the future resolves.
    fn tracked(
        self,
        instrumentation: &Instrumentation,
        label: impl Into<Cow<'static, str>>,
    ) -> TrackedFuture<Self::IntoFuture> {
        let operation = instrumentation.start(label);
        TrackedFuture::new(self.into_future(), operation, always_completed)
    }

    /// Like [`tracked`](Self::tracked), but an `Err` output finishes with
    /// [`FinishReason::Error`].
    fn tracked_try<T, E>(
        self,
        instrumentation: &Instrumentation,
        label: impl Into<Cow<'static, str>>,
    ) -> TrackedFuture<Self::IntoFuture>
    where
        Self: IntoFuture<Output = Result<T, E>>,
    {
        let operation = instrumentation.start(label);
        TrackedFuture::new(self.into_future(), operation, by_result)
    }
}

impl<F: IntoFuture + Sized> FutureExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, ImbalancePolicy};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn instrumentation() -> (Instrumentation, Arc<AtomicUsize>) {
        let instrumentation =
            Instrumentation::new(Config::default().imbalance(ImbalancePolicy::Panic));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        instrumentation
            .resource()
            .register_idle_transition_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        (instrumentation, calls)
    }

    #[tokio::test]
    async fn resolved_future_returns_output_and_goes_idle() {
        let (instrumentation, calls) = instrumentation();
        let fut = async { 40 + 2 }.tracked(&instrumentation, "answer");
        assert!(!instrumentation.is_idle_now());

        assert_eq!(fut.await, 42);
        assert!(instrumentation.is_idle_now());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_output_is_returned_unchanged() {
        let (instrumentation, calls) = instrumentation();
        let result: Result<u32, String> = async { Err("boom".to_string()) }
            .tracked_try(&instrumentation, "failing")
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert!(instrumentation.is_idle_now());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_future_is_cancelled() {
        let (instrumentation, calls) = instrumentation();
        let never = futures_util::future::pending::<()>().tracked(&instrumentation, "never");
        let timed_out = tokio::time::timeout(Duration::from_millis(10), never).await;

        assert!(timed_out.is_err());
        assert!(instrumentation.is_idle_now());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn operation_starts_before_first_poll() {
        let (instrumentation, _calls) = instrumentation();
        let fut = instrumentation.track("lazy", async {});
        assert!(!fut.is_finished());
        assert_eq!(instrumentation.resource().active_count(), 1);
        fut.await;
        assert!(instrumentation.is_idle_now());
    }

    #[tokio::test]
    async fn nested_tracked_futures_notify_once() {
        let (instrumentation, calls) = instrumentation();
        let inner_handle = instrumentation.clone();
        let outer = async move {
            let a = async { 1 }.tracked(&inner_handle, "inner-a");
            let b = async { 2 }.tracked(&inner_handle, "inner-b");
            a.await + b.await
        }
        .tracked(&instrumentation, "outer");

        assert_eq!(outer.await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
