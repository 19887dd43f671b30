//! Plain data shared by the settle crates.
//!
//! Nothing in here touches atomics or threads; these are the values that
//! flow out of the runtime (reports, snapshots) and into it (log levels).

use facet::Facet;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
        }
    }
}

impl Error for InvariantError {}

// ── LogLevel ─────────────────────────────────────────────

/// How chatty an idle resource is about the operations it tracks.
///
/// Levels are ordered: `None < Debug < Verbose`.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    None,
    /// Log every start and finish with the resulting active count.
    Debug,
    /// Also capture a backtrace on start and dump all pending operations on finish.
    Verbose,
}

impl LogLevel {
    pub fn at_or_above(self, threshold: LogLevel) -> bool {
        self >= threshold
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLogLevelError {
    input: String,
}

impl fmt::Display for ParseLogLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown log level {:?}; expected one of none, debug, verbose",
            self.input
        )
    }
}

impl Error for ParseLogLevelError {}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => Ok(Self::None),
            "debug" | "1" => Ok(Self::Debug),
            "verbose" | "trace" | "2" => Ok(Self::Verbose),
            _ => Err(ParseLogLevelError {
                input: s.to_string(),
            }),
        }
    }
}

// ── OperationId ──────────────────────────────────────────

/// Identity of one tracked operation, assigned when it starts.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("operation_id"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

// ── FinishReason ─────────────────────────────────────────

/// The terminal signal that ended an operation.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum FinishReason {
    Completed,
    Error,
    /// Dropped or unsubscribed before any terminal signal.
    Cancelled,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Reports ──────────────────────────────────────────────

/// A still-running operation, as seen when the snapshot was taken.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct PendingOperationSnapshot {
    pub id: OperationId,
    pub label: String,
    pub thread_name: String,
    pub age_secs: f64,
    pub backtrace: Option<String>,
}

/// Point-in-time view of an idle resource.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct IdleReport {
    pub resource: String,
    pub active_count: u64,
    /// Empty when pending-operation diagnostics are off.
    pub pending: Vec<PendingOperationSnapshot>,
}

impl IdleReport {
    pub fn is_idle(&self) -> bool {
        self.active_count == 0
    }

    /// True when every active operation has a pending record.
    ///
    /// Counts moved by the manual `increment`/`decrement` API have no
    /// record, so a mismatch usually points there.
    pub fn balanced(&self) -> bool {
        self.pending.len() as u64 == self.active_count
    }

    pub fn to_json(&self) -> Result<String, String> {
        facet_json::to_string(self).map_err(|e| format!("encode idle report: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_are_ordered() {
        assert!(LogLevel::Verbose.at_or_above(LogLevel::Debug));
        assert!(LogLevel::Debug.at_or_above(LogLevel::Debug));
        assert!(LogLevel::Debug.at_or_above(LogLevel::None));
        assert!(!LogLevel::None.at_or_above(LogLevel::Debug));
        assert!(!LogLevel::Debug.at_or_above(LogLevel::Verbose));
    }

    #[test]
    fn log_level_parses_names_and_numbers() {
        assert_eq!("none".parse::<LogLevel>(), Ok(LogLevel::None));
        assert_eq!(" Debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("2".parse::<LogLevel>(), Ok(LogLevel::Verbose));
        assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Verbose));

        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("\"loud\""));
    }

    #[test]
    fn operation_id_rejects_zero() {
        assert_eq!(
            OperationId::new(0),
            Err(InvariantError::ZeroId("operation_id"))
        );
        assert_eq!(OperationId::new(7).unwrap().to_string(), "op#7");
    }

    #[test]
    fn report_balance_compares_pending_to_count() {
        let report = IdleReport {
            resource: "test".to_string(),
            active_count: 1,
            pending: vec![PendingOperationSnapshot {
                id: OperationId::new(1).unwrap(),
                label: "fetch".to_string(),
                thread_name: "main".to_string(),
                age_secs: 0.5,
                backtrace: None,
            }],
        };
        assert!(report.balanced());
        assert!(!report.is_idle());

        let manual = IdleReport {
            active_count: 2,
            ..report
        };
        assert!(!manual.balanced());
    }
}
