//! Instrumentation surface for async code under test.
//!
//! Every wrapper here starts an operation on an [`IdleResource`] when it is
//! created and finishes it on the wrapped value's terminal signal. Values,
//! items and errors pass through untouched.
//!
//! | Item | Wraps | Finishes on |
//! |---|---|---|
//! | [`TrackedObserver`] | an [`Observer`] | `on_completed`, `on_error`, drop |
//! | [`TrackedFuture`] | any `IntoFuture` | `Ready`, drop |
//! | [`TrackedStream`] | any `Stream` | end of stream, first `Err` (with `tracked_try`), drop |
//! | [`spawn`] / [`spawn_blocking`] | a task | task completion, abort |

use std::borrow::Cow;
use std::future::IntoFuture;
use std::sync::Arc;

pub(crate) mod future;
pub(crate) mod observer;
pub(crate) mod stream;
pub(crate) mod task;

pub use self::future::{FutureExt, TrackedFuture};
pub use self::observer::{Observer, TrackedObserver};
pub use self::stream::{StreamExt, TrackedStream};
pub use self::task::{spawn, spawn_blocking};

pub use settle_runtime::*;

/// Handle shared by instrumented code and the test driver.
///
/// Cloning is cheap; every clone points at the same [`IdleResource`].
#[derive(Clone, Debug)]
pub struct Instrumentation {
    resource: Arc<IdleResource>,
}

impl Instrumentation {
    pub fn new(config: Config) -> Self {
        Self::from_resource(IdleResource::new(config))
    }

    pub fn from_resource(resource: Arc<IdleResource>) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &Arc<IdleResource> {
        &self.resource
    }

    /// The resource as the test driver should see it.
    pub fn idling_resource(&self) -> Arc<dyn IdlingResource> {
        self.resource.clone()
    }

    pub fn is_idle_now(&self) -> bool {
        self.resource.is_idle_now()
    }

    /// Starts an operation with no wrapped value; finish it by hand.
    pub fn start(&self, label: impl Into<Cow<'static, str>>) -> Operation {
        self.resource.on_operation_start(label)
    }

    /// Starts an operation and wraps `observer` so its terminal signal finishes it.
    pub fn subscribe<O>(
        &self,
        label: impl Into<Cow<'static, str>>,
        observer: O,
    ) -> TrackedObserver<O> {
        TrackedObserver::new(self.start(label), observer)
    }

    /// Same as [`FutureExt::tracked`].
    pub fn track<F>(
        &self,
        label: impl Into<Cow<'static, str>>,
        future: F,
    ) -> TrackedFuture<F::IntoFuture>
    where
        F: IntoFuture,
    {
        future.tracked(self, label)
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(Config::from_env())
    }
}
