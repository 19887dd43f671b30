//! Call-site capture for pending operations.
//!
//! With the `diagnostics` feature, operations started at
//! [`LogLevel::Verbose`](settle_types::LogLevel) keep an unresolved backtrace
//! that is symbolized only when a dump asks for it. Without the feature,
//! capture is a no-op.

/// Name of the thread that is running right now, with its id.
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => format!("{name} ({:?})", thread.id()),
        None => format!("<unnamed> ({:?})", thread.id()),
    }
}

// ── Zero-cost stubs (no diagnostics) ─────────────────────────────

#[cfg(not(feature = "diagnostics"))]
mod imp {
    use ctor::ctor;
    use std::sync::Once;

    use settle_types::LogLevel;

    use crate::config::LOG_LEVEL_ENV;

    pub struct CapturedStack(());

    impl CapturedStack {
        #[inline(always)]
        pub fn render(&self) -> String {
            String::new()
        }
    }

    #[inline(always)]
    pub fn capture() -> Option<CapturedStack> {
        None
    }

    static VERBOSE_WITHOUT_DIAGNOSTICS_ONCE: Once = Once::new();

    #[ctor]
    fn warn_if_backtraces_requested() {
        let Some(value) = std::env::var_os(LOG_LEVEL_ENV) else {
            return;
        };
        let Ok(level) = value.to_string_lossy().parse::<LogLevel>() else {
            return;
        };
        if !level.at_or_above(LogLevel::Verbose) {
            return;
        }

        VERBOSE_WITHOUT_DIAGNOSTICS_ONCE.call_once(|| {
            eprintln!(
                "settle: {LOG_LEVEL_ENV}={level} asks for operation backtraces, but this build \
                 has the `diagnostics` feature of settle disabled; pending-operation dumps will \
                 not include call sites"
            );
        });
    }
}

// ── Backtrace capture (diagnostics enabled) ──────────────────────

#[cfg(feature = "diagnostics")]
mod imp {
    use std::sync::OnceLock;

    use backtrace::Backtrace;

    pub struct CapturedStack {
        frames: Backtrace,
        rendered: OnceLock<String>,
    }

    impl CapturedStack {
        /// Symbolizes on first use; later calls reuse the text.
        pub fn render(&self) -> String {
            self.rendered
                .get_or_init(|| {
                    let mut backtrace = self.frames.clone();
                    backtrace.resolve();
                    format!("{backtrace:?}")
                })
                .clone()
        }

        #[cfg(test)]
        pub fn is_resolved(&self) -> bool {
            self.rendered.get().is_some()
        }
    }

    pub fn capture() -> Option<CapturedStack> {
        Some(CapturedStack {
            frames: Backtrace::new_unresolved(),
            rendered: OnceLock::new(),
        })
    }
}

pub use imp::{capture, CapturedStack};
