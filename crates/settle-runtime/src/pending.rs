use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use settle_types::{OperationId, PendingOperationSnapshot};

use crate::capture::{self, CapturedStack};

/// Diagnostic record for one active operation.
pub(crate) struct PendingOperation {
    label: Cow<'static, str>,
    thread_name: String,
    started_at: Instant,
    stack: Option<Arc<CapturedStack>>,
}

impl PendingOperation {
    /// Records the calling thread and the current instant.
    pub(crate) fn new(label: Cow<'static, str>, stack: Option<CapturedStack>) -> Self {
        Self {
            label,
            thread_name: capture::current_thread_name(),
            started_at: Instant::now(),
            stack: stack.map(Arc::new),
        }
    }

    fn view(&self, id: OperationId, now: Instant) -> PendingView {
        PendingView {
            id,
            label: self.label.clone(),
            thread_name: self.thread_name.clone(),
            age_secs: now.duration_since(self.started_at).as_secs_f64(),
            stack: self.stack.clone(),
        }
    }
}

/// A pending record copied out of the table, call site still unresolved.
///
/// Taken under the table lock; [`PendingView::resolve`] runs after the lock
/// is released so symbolization never holds up starts and finishes.
pub(crate) struct PendingView {
    id: OperationId,
    label: Cow<'static, str>,
    thread_name: String,
    age_secs: f64,
    stack: Option<Arc<CapturedStack>>,
}

impl PendingView {
    pub(crate) fn resolve(self) -> PendingOperationSnapshot {
        PendingOperationSnapshot {
            id: self.id,
            label: self.label.into_owned(),
            thread_name: self.thread_name,
            age_secs: self.age_secs,
            backtrace: self.stack.as_deref().map(CapturedStack::render),
        }
    }

    #[cfg(all(test, feature = "diagnostics"))]
    pub(crate) fn is_resolved(&self) -> bool {
        self.stack.as_deref().is_some_and(CapturedStack::is_resolved)
    }
}

/// Active operations keyed by the id they were given at start.
///
/// The table owns only the diagnostic record, never the operation itself.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: BTreeMap<OperationId, PendingOperation>,
}

impl PendingTable {
    pub(crate) fn insert(&mut self, id: OperationId, operation: PendingOperation) {
        self.entries.insert(id, operation);
    }

    pub(crate) fn remove(&mut self, id: OperationId) -> Option<PendingOperation> {
        self.entries.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Copies every record out, oldest first, without resolving call sites.
    pub(crate) fn views(&self) -> Vec<PendingView> {
        let now = Instant::now();
        let mut views = Vec::with_capacity(self.len());
        views.extend(
            self.entries
                .iter()
                .map(|(id, operation)| operation.view(*id, now)),
        );
        views
    }
}

pub(crate) fn resolve_all(views: Vec<PendingView>) -> Vec<PendingOperationSnapshot> {
    views.into_iter().map(PendingView::resolve).collect()
}

/// Human-readable listing of pending operations, oldest first.
pub(crate) fn render(
    resource: &str,
    active_count: usize,
    pending: &[PendingOperationSnapshot],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Idle resource \"{resource}\" (active={active_count}, pending records={}{}):",
        pending.len(),
        if pending.len() == active_count {
            ""
        } else {
            " *** MISMATCH ***"
        }
    );

    if pending.is_empty() {
        out.push_str(if active_count == 0 {
            "  (idle)\n"
        } else {
            "  (no pending records)\n"
        });
        return out;
    }

    for op in pending {
        let _ = writeln!(
            out,
            "  [{}] {} on thread {} pending for {:.3}s",
            op.id, op.label, op.thread_name, op.age_secs
        );
        if let Some(backtrace) = op.backtrace.as_deref() {
            for line in backtrace.lines() {
                let _ = writeln!(out, "      {line}");
            }
        }
    }
    out
}
