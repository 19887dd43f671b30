use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use settle_runtime::{FinishReason, Operation};

use crate::Instrumentation;

/// Stream that keeps its resource busy until it ends, errors or is dropped.
pub struct TrackedStream<S: Stream> {
    inner: S,
    operation: Option<Operation>,
    is_error: fn(&S::Item) -> bool,
}

impl<S: Stream> TrackedStream<S> {
    fn new(inner: S, operation: Operation, is_error: fn(&S::Item) -> bool) -> Self {
        Self {
            inner,
            operation: Some(operation),
            is_error,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.operation.is_none()
    }

    fn finish(&mut self, reason: FinishReason) {
        if let Some(operation) = self.operation.take() {
            operation.finish(reason);
        }
    }
}

impl<S: Stream> Stream for TrackedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // SAFETY: `inner` is never moved out of `self`; the bookkeeping
        // fields are not structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };

        match inner.poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(item)) => {
                if (this.is_error)(&item) {
                    this.finish(FinishReason::Error);
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.finish(FinishReason::Completed);
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

fn never_error<T>(_: &T) -> bool {
    false
}

fn is_err<T, E>(item: &Result<T, E>) -> bool {
    item.is_err()
}

/// Attaches idle tracking to any stream.
pub trait StreamExt: Stream + Sized {
    /// Starts an operation now and finishes it when the stream ends.
    fn tracked(
        self,
        instrumentation: &Instrumentation,
        label: impl Into<Cow<'static, str>>,
    ) -> TrackedStream<Self> {
        let operation = instrumentation.start(label);
        TrackedStream::new(self, operation, never_error)
    }

    /// Like [`tracked`](Self::tracked), but the first `Err` item finishes the
    /// operation with [`FinishReason::Error`]. Items after it are still
    /// yielded.
    fn tracked_try<T, E>(
        self,
        instrumentation: &Instrumentation,
        label: impl Into<Cow<'static, str>>,
    ) -> TrackedStream<Self>
    where
        Self: Stream<Item = Result<T, E>>,
    {
        let operation = instrumentation.start(label);
        TrackedStream::new(self, operation, is_err)
    }
}

impl<S: Stream + Sized> StreamExt for S {}
