//! Error taxonomy
//!
//! Two families live here. `TraceError` is recoverable and returned through
//! `Result` (only initialization can fail this way). `FatalError` is never
//! returned: it is handed to [`HostContext::fatal_error`](crate::host::HostContext::fatal_error),
//! which does not return, so accounting state is never left half-updated.

use std::fmt;

use thiserror::Error;

/// Recoverable instrumentation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Out of memory: could not allocate accounting storage for {operations} operations")]
    OutOfMemory { operations: usize },
}

/// A failed monotonic clock read
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("monotonic clock read failed: {0}")]
    ReadFailed(String),

    #[error("monotonic clock returned an out-of-range value")]
    OutOfRange,
}

/// Failure reported by an observer or by argument construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer raised an error
    #[error("observer raised: {0}")]
    Raised(String),

    /// The observer produced no result, treated exactly like a raise
    #[error("observer returned no result")]
    NoResult,

    /// The host could not build the argument value
    #[error("could not build observer arguments: {0}")]
    ArgumentBuild(String),
}

/// Which side of an instrumented call a hook runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Enter,
    Exit,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Enter => write!(f, "on-enter"),
            HookPhase::Exit => write!(f, "on-exit"),
        }
    }
}

/// Category of an unrecoverable condition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalKind {
    /// A clock read bracketing the operation failed
    #[error("could not get monotonic clock: {0}")]
    ClockFailure(ClockError),

    /// The on-enter observer failed
    #[error("error when executing on-enter trace function: {0}")]
    EnterHookFailed(ObserverError),

    /// The on-exit observer failed
    #[error("error when executing on-exit trace function: {0}")]
    ExitHookFailed(ObserverError),

    /// The single name argument could not be built
    #[error("could not create arguments for {phase} trace function: {reason}")]
    ArgumentBuildFailed { phase: HookPhase, reason: String },

    /// An initialized context was asked to rebind to another host or catalog
    #[error("trace context is already bound to a different host context or catalog")]
    ConsistencyViolation,

    /// Operation id outside the catalog
    #[error("operation id {id} outside catalog of {catalog_len} operations")]
    UnknownOperation { id: u32, catalog_len: usize },
}

/// Unrecoverable instrumentation failure
///
/// Carries the display name of the operation involved, when there is one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}{}", operation_prefix(.operation), .kind)]
pub struct FatalError {
    pub kind: FatalKind,
    pub operation: Option<String>,
}

fn operation_prefix(operation: &Option<String>) -> String {
    match operation {
        Some(name) => format!("{}: ", name),
        None => String::new(),
    }
}

impl FatalError {
    pub fn new(kind: FatalKind, operation: Option<String>) -> Self {
        FatalError { kind, operation }
    }

    pub fn clock_failure(operation: &str, source: ClockError) -> Self {
        FatalError::new(FatalKind::ClockFailure(source), Some(operation.to_string()))
    }

    pub fn hook_failed(phase: HookPhase, operation: &str, source: ObserverError) -> Self {
        let kind = match source {
            ObserverError::ArgumentBuild(reason) => FatalKind::ArgumentBuildFailed { phase, reason },
            other => match phase {
                HookPhase::Enter => FatalKind::EnterHookFailed(other),
                HookPhase::Exit => FatalKind::ExitHookFailed(other),
            },
        };
        FatalError::new(kind, Some(operation.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_failure_message_names_operation() {
        let e = FatalError::clock_failure("alloc", ClockError::OutOfRange);
        let msg = e.to_string();
        assert!(msg.contains("monotonic clock"));
        assert!(msg.contains("alloc"));
    }

    #[test]
    fn test_hook_failure_distinguishes_phase() {
        let enter = FatalError::hook_failed(HookPhase::Enter, "free", ObserverError::NoResult);
        let exit = FatalError::hook_failed(HookPhase::Exit, "free", ObserverError::NoResult);
        assert!(enter.to_string().contains("on-enter"));
        assert!(exit.to_string().contains("on-exit"));
        assert_eq!(enter.kind, FatalKind::EnterHookFailed(ObserverError::NoResult));
        assert_eq!(exit.kind, FatalKind::ExitHookFailed(ObserverError::NoResult));
    }

    #[test]
    fn test_argument_build_failure_kind() {
        let e = FatalError::hook_failed(
            HookPhase::Exit,
            "call",
            ObserverError::ArgumentBuild("no string".into()),
        );
        assert!(matches!(
            e.kind,
            FatalKind::ArgumentBuildFailed { phase: HookPhase::Exit, .. }
        ));
        assert!(e.to_string().contains("could not create arguments"));
    }

    #[test]
    fn test_fatal_without_operation_has_no_prefix() {
        let e = FatalError::new(FatalKind::ConsistencyViolation, None);
        assert!(e.to_string().starts_with("trace context is already bound"));

        let e = FatalError::clock_failure("free", ClockError::OutOfRange);
        assert!(e.to_string().starts_with("free: could not get monotonic clock"));
        assert_eq!(
            e.kind.to_string(),
            "could not get monotonic clock: monotonic clock returned an out-of-range value"
        );
    }

    #[test]
    fn test_trace_error_display() {
        let e = TraceError::OutOfMemory { operations: 300 };
        assert!(e.to_string().contains("300"));
    }
}
