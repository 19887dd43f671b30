use settle_runtime::{FinishReason, Operation, OperationId};

/// Push-based consumer of a reactive pipeline.
///
/// A well-behaved source calls `on_next` any number of times followed by at
/// most one of `on_error` / `on_completed`.
pub trait Observer<T, E> {
    fn on_next(&mut self, value: T);

    fn on_error(&mut self, error: E);

    fn on_completed(&mut self);
}

impl<T, E, O> Observer<T, E> for &mut O
where
    O: Observer<T, E> + ?Sized,
{
    fn on_next(&mut self, value: T) {
        (**self).on_next(value)
    }

    fn on_error(&mut self, error: E) {
        (**self).on_error(error)
    }

    fn on_completed(&mut self) {
        (**self).on_completed()
    }
}

impl<T, E, O> Observer<T, E> for Box<O>
where
    O: Observer<T, E> + ?Sized,
{
    fn on_next(&mut self, value: T) {
        (**self).on_next(value)
    }

    fn on_error(&mut self, error: E) {
        (**self).on_error(error)
    }

    fn on_completed(&mut self) {
        (**self).on_completed()
    }
}

/// Observer decorator that finishes its operation on the first terminal signal.
///
/// Every signal reaches the downstream observer before the operation is
/// retired, so the idle callback never runs ahead of the data it covers.
/// Dropping the wrapper before a terminal signal counts as unsubscribing.
pub struct TrackedObserver<O> {
    inner: O,
    operation: Option<Operation>,
}

impl<O> TrackedObserver<O> {
    pub(crate) fn new(operation: Operation, inner: O) -> Self {
        Self {
            inner,
            operation: Some(operation),
        }
    }

    /// `None` once a terminal signal has been seen.
    pub fn operation_id(&self) -> Option<OperationId> {
        self.operation.as_ref().map(Operation::id)
    }

    pub fn is_finished(&self) -> bool {
        self.operation.is_none()
    }

    pub fn get_ref(&self) -> &O {
        &self.inner
    }

    /// Unwraps the downstream observer, cancelling the operation if it is still active.
    pub fn into_inner(mut self) -> O {
        if let Some(operation) = self.operation.take() {
            operation.finish(FinishReason::Cancelled);
        }
        self.inner
    }

    fn finish(&mut self, reason: FinishReason) {
        if let Some(operation) = self.operation.take() {
            operation.finish(reason);
        }
    }
}

impl<T, E, O> Observer<T, E> for TrackedObserver<O>
where
    O: Observer<T, E>,
{
    fn on_next(&mut self, value: T) {
        self.inner.on_next(value);
    }

    fn on_error(&mut self, error: E) {
        self.inner.on_error(error);
        self.finish(FinishReason::Error);
    }

    fn on_completed(&mut self) {
        self.inner.on_completed();
        self.finish(FinishReason::Completed);
    }
}
