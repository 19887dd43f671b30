//! Tell a test driver when your async code has gone quiet.
//!
//! `settle` counts in-flight asynchronous operations (observer subscriptions,
//! futures, streams, spawned tasks) and reports the process as *idle* when
//! none are left. A UI or integration test driver polls
//! [`IdlingResource::is_idle_now`] or registers a callback that fires once
//! every time the count falls back to zero, so it can assert on state only
//! after background work has finished.
//!
//! # Using this crate
//!
//! Build one [`Instrumentation`] at startup and pass it to both sides:
//!
//! ```rust,no_run
//! use settle::{Config, FutureExt as _, IdlingResource as _, Instrumentation};
//!
//! # async fn load_cart() -> Result<u32, std::io::Error> { Ok(3) }
//! #[tokio::main]
//! async fn main() {
//!     settle::init_logging();
//!     let instrumentation = Instrumentation::new(Config::from_env().name("cart-screen"));
//!
//!     // Test driver side.
//!     let driver = instrumentation.idling_resource();
//!
//!     // Application side.
//!     let items = load_cart().tracked_try(&instrumentation, "load_cart").await;
//!
//!     assert!(driver.is_idle_now());
//!     # let _ = items;
//! }
//! ```
//!
//! # Troubleshooting a test that never goes idle
//!
//! Run with `SETTLE_LOG=debug` to log every start and finish with the
//! running count. `SETTLE_LOG=verbose` additionally dumps every pending
//! operation after each finish; with the `diagnostics` feature those dumps
//! include the backtrace of the code that started the operation.
//!
//! # Cargo features
//!
//! | Feature | Effect |
//! |---------|--------|
//! | *(default, none)* | Pending records carry label, thread and age. |
//! | `diagnostics` | Also captures start-site backtraces at `SETTLE_LOG=verbose`. |

pub use settle_tokio::*;

/// Installs a `tracing` fmt subscriber for test binaries.
///
/// Honors `RUST_LOG`, defaulting to `settle=debug`. Does nothing if a global
/// subscriber is already set.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("{LOG_TARGET}=debug")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
