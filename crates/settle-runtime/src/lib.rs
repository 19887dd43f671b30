//! Idle tracking for asynchronous work under test.
//!
//! An [`IdleResource`] counts operations between their start hook and their
//! terminal signal. A test driver polls [`IdlingResource::is_idle_now`] or
//! registers a [`ResourceCallback`] that fires once every time the count
//! falls back to zero.
//!
//! ```
//! use settle_runtime::{Config, IdleResource};
//! use settle_types::FinishReason;
//!
//! let resource = IdleResource::new(Config::default().name("login-screen"));
//! resource.register_idle_transition_callback(|| println!("idle"));
//!
//! let op = resource.on_operation_start("fetch-session");
//! assert!(!resource.is_idle_now());
//! op.finish(FinishReason::Completed); // prints "idle"
//! assert!(resource.is_idle_now());
//! ```
//!
//! # Cargo features
//!
//! | Feature | Effect |
//! |---------|--------|
//! | *(default, none)* | Pending-operation records carry thread and age only. |
//! | `diagnostics` | At [`LogLevel::Verbose`], records also carry the call site's backtrace. |

pub(crate) mod callback;
pub(crate) mod capture;
pub(crate) mod config;
pub(crate) mod pending;
pub(crate) mod resource;
pub(crate) mod tracker;

pub use self::callback::ResourceCallback;
pub use self::capture::current_thread_name;
pub use self::config::{
    Config, ImbalancePolicy, NotifyPolicy, ThreadAffinity, DEFAULT_NAME, LOG_LEVEL_ENV,
};
pub use self::resource::{IdleResource, IdlingResource, Operation};
pub use self::tracker::{SubscriptionTracker, TrackerError, Unbalanced};

pub use settle_types::{
    FinishReason, IdleReport, LogLevel, OperationId, PendingOperationSnapshot,
};

/// `tracing` target for every event emitted by this crate.
pub const LOG_TARGET: &str = "settle";
