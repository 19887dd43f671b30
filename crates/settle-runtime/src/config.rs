use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use settle_types::LogLevel;

/// Environment variable read by [`Config::from_env`].
pub const LOG_LEVEL_ENV: &str = "SETTLE_LOG";

/// Name reported to pollers when none is configured.
pub const DEFAULT_NAME: &str = "settle.idle";

/// What to do when a finish arrives with the count already at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImbalancePolicy {
    /// Panic with the resource name. Default in debug builds.
    Panic,
    /// Emit an error event and keep the count at zero. Default in release builds.
    Log,
}

impl Default for ImbalancePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Log
        }
    }
}

/// When the idle callback runs after the count reaches zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    #[default]
    Immediate,
    /// Wait this long on a helper thread and notify only if nothing started
    /// in the meantime.
    Delayed(Duration),
}

/// Which threads may retire operations.
#[derive(Clone, Default)]
pub enum ThreadAffinity {
    #[default]
    Any,
    /// Only finishes observed where the predicate holds decrement the count.
    /// Finishes seen anywhere else are discarded and the operation stays
    /// active forever.
    Coordinator(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl ThreadAffinity {
    /// Pins finishes to the thread calling this.
    pub fn current_thread() -> Self {
        Self::thread(std::thread::current().id())
    }

    pub fn thread(id: ThreadId) -> Self {
        Self::Coordinator(Arc::new(move || std::thread::current().id() == id))
    }

    pub fn predicate(is_coordinator: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self::Coordinator(Arc::new(is_coordinator))
    }

    pub(crate) fn allows_current_thread(&self) -> bool {
        match self {
            Self::Any => true,
            Self::Coordinator(is_coordinator) => is_coordinator(),
        }
    }
}

impl fmt::Debug for ThreadAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Coordinator(_) => f.write_str("Coordinator(..)"),
        }
    }
}

/// Settings for one [`IdleResource`](crate::IdleResource), fixed at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub log_level: LogLevel,
    /// Keep a pending record (thread, age, call site) per active operation.
    pub diagnostics: bool,
    pub imbalance: ImbalancePolicy,
    pub notify: NotifyPolicy,
    pub affinity: ThreadAffinity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            log_level: LogLevel::None,
            diagnostics: cfg!(debug_assertions),
            imbalance: ImbalancePolicy::default(),
            notify: NotifyPolicy::default(),
            affinity: ThreadAffinity::default(),
        }
    }
}

impl Config {
    /// Defaults, with the log level taken from `SETTLE_LOG` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = std::env::var_os(LOG_LEVEL_ENV) {
            let value = value.to_string_lossy();
            match value.parse::<LogLevel>() {
                Ok(level) => config.log_level = level,
                Err(err) => tracing::warn!(
                    target: crate::LOG_TARGET,
                    "ignoring {LOG_LEVEL_ENV}: {err}"
                ),
            }
        }
        config
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn imbalance(mut self, policy: ImbalancePolicy) -> Self {
        self.imbalance = policy;
        self
    }

    pub fn notify(mut self, policy: NotifyPolicy) -> Self {
        self.notify = policy;
        self
    }

    pub fn affinity(mut self, affinity: ThreadAffinity) -> Self {
        self.affinity = affinity;
        self
    }
}
