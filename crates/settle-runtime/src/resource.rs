use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use settle_types::{FinishReason, IdleReport, LogLevel, OperationId};
use tracing::{debug, error, trace, warn};

use crate::callback::{CallbackSlot, ResourceCallback};
use crate::capture;
use crate::config::{Config, ImbalancePolicy, NotifyPolicy};
use crate::pending::{self, PendingOperation, PendingTable};
use crate::tracker::{SubscriptionTracker, TrackerError};
use crate::LOG_TARGET;

/// What a test driver sees: a named resource it can poll and subscribe to.
pub trait IdlingResource: Send + Sync {
    fn name(&self) -> &str;

    fn is_idle_now(&self) -> bool;

    /// Replaces any previously registered callback.
    fn register_idle_transition_callback(&self, callback: Arc<dyn ResourceCallback>);
}

/// Counts in-flight operations and tells a registered callback when the
/// count drops back to zero.
///
/// Construct one per test process with [`IdleResource::new`], then hand the
/// same `Arc` to the instrumentation layer and to the test driver.
pub struct IdleResource {
    config: Config,
    tracker: SubscriptionTracker,
    pending: Mutex<PendingTable>,
    callback: CallbackSlot,
    next_operation_id: AtomicU64,
    idle_epoch: AtomicU64,
}

impl IdleResource {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            tracker: SubscriptionTracker::new(),
            pending: Mutex::new(PendingTable::default()),
            callback: CallbackSlot::default(),
            next_operation_id: AtomicU64::new(1),
            idle_epoch: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn active_count(&self) -> usize {
        self.tracker.active_count()
    }

    pub fn is_idle_now(&self) -> bool {
        let active_count = self.tracker.active_count();
        let idle = active_count == 0;
        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                active_count,
                idle,
                "is_idle_now"
            );
        }
        idle
    }

    pub fn register_idle_transition_callback(&self, callback: impl ResourceCallback + 'static) {
        self.replace_callback(Arc::new(callback));
    }

    fn replace_callback(&self, callback: Arc<dyn ResourceCallback>) {
        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                "register_idle_transition_callback"
            );
        }
        self.callback.replace(callback);
    }

    // ── Hooks ────────────────────────────────────────────────

    /// Marks the start of one asynchronous operation.
    ///
    /// The returned guard must be finished exactly once; dropping it without
    /// calling [`Operation::finish`] finishes it as
    /// [`FinishReason::Cancelled`].
    pub fn on_operation_start(
        self: &Arc<Self>,
        label: impl Into<Cow<'static, str>>,
    ) -> Operation {
        let label = label.into();
        let id = self.next_operation_id();
        let stack = if self.logs(LogLevel::Verbose) {
            capture::capture()
        } else {
            None
        };
        let call_site_captured = stack.is_some();

        let active_count = if self.config.diagnostics {
            let record = PendingOperation::new(label.clone(), stack);
            let mut pending = self.pending.lock();
            pending.insert(id, record);
            self.tracker.increment()
        } else {
            self.tracker.increment()
        };

        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                operation = %id,
                label = %label,
                active_count,
                call_site_captured,
                "operation started"
            );
        }

        Operation {
            resource: Arc::clone(self),
            id,
            label,
            finished: false,
        }
    }

    /// Retires `operation`. Same as [`Operation::finish`].
    pub fn on_operation_finish(&self, operation: Operation, reason: FinishReason) {
        debug_assert!(
            std::ptr::eq(Arc::as_ptr(&operation.resource), self),
            "operation {} was started on a different idle resource",
            operation.id
        );
        operation.finish(reason);
    }

    fn finish_operation(self: &Arc<Self>, id: OperationId, label: &str, reason: FinishReason) {
        if !self.config.affinity.allows_current_thread() {
            warn!(
                target: LOG_TARGET,
                resource = %self.config.name,
                operation = %id,
                label,
                %reason,
                thread = %capture::current_thread_name(),
                "finish observed off the coordinator thread and discarded; \
                 this operation will stay active"
            );
            return;
        }

        let decremented = if self.config.diagnostics {
            let mut pending = self.pending.lock();
            pending.remove(id);
            self.tracker.decrement()
        } else {
            self.tracker.decrement()
        };

        let active_count = match decremented {
            Ok(active_count) => active_count,
            Err(_) => {
                self.report_imbalance(format!("operation {id} ({label}) finished with {reason}"));
                return;
            }
        };

        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                operation = %id,
                label,
                %reason,
                active_count,
                "operation finished"
            );
            if self.logs(LogLevel::Verbose) && self.config.diagnostics {
                debug!(
                    target: LOG_TARGET,
                    "remaining operations:\n{}",
                    self.dump_pending()
                );
            }
        }

        if active_count == 0 {
            self.transition_to_idle();
        }
    }

    // ── Manual counting ──────────────────────────────────────

    /// Marks the resource busy without a guard. Pair with [`decrement`](Self::decrement).
    pub fn increment(&self) -> usize {
        let active_count = self.tracker.increment();
        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                active_count,
                "increment"
            );
        }
        active_count
    }

    /// Undoes one [`increment`](Self::increment), notifying if the count reaches zero.
    pub fn decrement(self: &Arc<Self>) -> Result<usize, TrackerError> {
        let active_count = match self.tracker.decrement() {
            Ok(active_count) => active_count,
            Err(_) => {
                let err = TrackerError::Unbalanced {
                    resource: self.config.name.clone(),
                };
                self.report_imbalance("decrement".to_string());
                return Err(err);
            }
        };
        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                active_count,
                "decrement"
            );
        }
        if active_count == 0 {
            self.transition_to_idle();
        }
        Ok(active_count)
    }

    // ── Reports ──────────────────────────────────────────────

    pub fn report(&self) -> IdleReport {
        let (active_count, views) = {
            let pending = self.pending.lock();
            (self.tracker.active_count() as u64, pending.views())
        };
        // Call sites are symbolized with the table unlocked.
        IdleReport {
            resource: self.config.name.clone(),
            active_count,
            pending: pending::resolve_all(views),
        }
    }

    /// Human-readable listing of every pending operation and where it started.
    pub fn dump_pending(&self) -> String {
        if !self.config.diagnostics {
            return format!(
                "Idle resource \"{}\" (active={}): pending-operation diagnostics are disabled\n",
                self.config.name,
                self.tracker.active_count()
            );
        }
        let report = self.report();
        pending::render(
            &report.resource,
            report.active_count as usize,
            &report.pending,
        )
    }

    // ── Internals ────────────────────────────────────────────

    fn logs(&self, threshold: LogLevel) -> bool {
        self.config.log_level.at_or_above(threshold)
    }

    fn next_operation_id(&self) -> OperationId {
        let raw = self.next_operation_id.fetch_add(1, Ordering::Relaxed);
        OperationId::new(raw).unwrap_or_else(|err| {
            panic!("operation id invariant violated: generated id must be non-zero: {err}")
        })
    }

    fn report_imbalance(&self, context: String) {
        let err = TrackerError::Unbalanced {
            resource: self.config.name.clone(),
        };
        match self.config.imbalance {
            ImbalancePolicy::Panic if !std::thread::panicking() => {
                panic!("{err} [{context}]");
            }
            _ => {
                error!(
                    target: LOG_TARGET,
                    resource = %self.config.name,
                    context = %context,
                    "{err}"
                );
            }
        }
    }

    fn transition_to_idle(self: &Arc<Self>) {
        let epoch = self.idle_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        match self.config.notify {
            NotifyPolicy::Immediate => self.notify_idle(),
            NotifyPolicy::Delayed(delay) => {
                let resource = Arc::clone(self);
                let spawned = std::thread::Builder::new()
                    .name(format!("{}.notify", self.config.name))
                    .spawn(move || {
                        std::thread::sleep(delay);
                        // A newer transition owns the notification, or work resumed.
                        if resource.idle_epoch.load(Ordering::SeqCst) == epoch
                            && resource.tracker.is_idle_now()
                        {
                            resource.notify_idle();
                        }
                    });
                if let Err(err) = spawned {
                    warn!(
                        target: LOG_TARGET,
                        resource = %self.config.name,
                        "could not spawn delayed idle notifier ({err}); notifying immediately"
                    );
                    self.notify_idle();
                }
            }
        }
    }

    fn notify_idle(&self) {
        if self.logs(LogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                resource = %self.config.name,
                "on_transition_to_idle"
            );
        }
        if !self.callback.notify() {
            trace!(
                target: LOG_TARGET,
                resource = %self.config.name,
                "idle transition dropped: no callback registered"
            );
        }
    }
}

impl IdlingResource for IdleResource {
    fn name(&self) -> &str {
        IdleResource::name(self)
    }

    fn is_idle_now(&self) -> bool {
        IdleResource::is_idle_now(self)
    }

    fn register_idle_transition_callback(&self, callback: Arc<dyn ResourceCallback>) {
        self.replace_callback(callback);
    }
}

impl fmt::Debug for IdleResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleResource")
            .field("name", &self.config.name)
            .field("active_count", &self.tracker.active_count())
            .field("log_level", &self.config.log_level)
            .finish_non_exhaustive()
    }
}

// ── Operation ────────────────────────────────────────────────

/// One in-flight operation on an [`IdleResource`].
///
/// Finishing consumes the guard, so an operation cannot be retired twice.
#[must_use = "dropping an Operation immediately finishes it as cancelled"]
pub struct Operation {
    resource: Arc<IdleResource>,
    id: OperationId,
    label: Cow<'static, str>,
    finished: bool,
}

impl Operation {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn resource(&self) -> &Arc<IdleResource> {
        &self.resource
    }

    pub fn finish(mut self, reason: FinishReason) {
        self.finish_once(reason);
    }

    fn finish_once(&mut self, reason: FinishReason) {
        if self.finished {
            return;
        }
        self.finished = true;
        IdleResource::finish_operation(&self.resource, self.id, &self.label, reason);
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.finish_once(FinishReason::Cancelled);
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("resource", &self.resource.config.name)
            .finish()
    }
}
