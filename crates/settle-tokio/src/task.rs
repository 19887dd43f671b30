//! Tracked versions of [`tokio::spawn`] and [`tokio::task::spawn_blocking`].

use std::borrow::Cow;
use std::future::Future;

use settle_runtime::FinishReason;
use tokio::task::JoinHandle;

use crate::{FutureExt as _, Instrumentation};

/// Spawns a task that keeps `instrumentation` busy until it completes or is aborted.
///
/// The operation starts here, before the runtime first polls the task.
pub fn spawn<T, F>(
    instrumentation: &Instrumentation,
    name: impl Into<Cow<'static, str>>,
    future: F,
) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    tokio::spawn(future.tracked(instrumentation, name))
}

/// Runs `f` on the blocking pool; a panic in `f` finishes the operation as cancelled.
pub fn spawn_blocking<T, F>(
    instrumentation: &Instrumentation,
    name: impl Into<Cow<'static, str>>,
    f: F,
) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let operation = instrumentation.start(name);
    tokio::task::spawn_blocking(move || {
        let output = f();
        operation.finish(FinishReason::Completed);
        output
    })
}
