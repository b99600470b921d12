//! Boundary to the underlying API context
//!
//! The instrumented API supplies an opaque host context. The trace layer
//! uses it for four things only: fatal errors, out-of-memory reports,
//! building observer arguments, and invoking observers. It never looks
//! inside the host otherwise.

use std::sync::Mutex;

use crate::error::{FatalError, ObserverError, TraceError};
use crate::observer::{CallArgs, TraceHook};

/// Services the underlying API context provides to the trace layer
pub trait HostContext {
    /// Terminate the operation context with an unrecoverable error
    fn fatal_error(&self, error: &FatalError) -> !;

    /// Report an allocation failure through the host's error channel
    fn report_no_memory(&self, error: &TraceError);

    /// Build the argument value for one observer invocation
    fn build_args(&self, name: &str) -> Result<CallArgs, ObserverError> {
        Ok(CallArgs::new(name))
    }

    /// Invoke an observer through the host's call mechanism
    fn call_hook(&self, hook: &dyn TraceHook, args: &CallArgs) -> Result<(), ObserverError> {
        hook.call(args)
    }
}

/// Host that reports to the process: fatal errors abort, out-of-memory is
/// logged and kept as the pending error
#[derive(Debug, Default)]
pub struct ProcessHost {
    pending: Mutex<Option<TraceError>>,
}

impl ProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the error reported since the last call, if any
    pub fn take_error(&self) -> Option<TraceError> {
        match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl HostContext for ProcessHost {
    fn fatal_error(&self, error: &FatalError) -> ! {
        tracing::error!(kind = ?error.kind, "fatal instrumentation error: {}", error);
        eprintln!("calltrace: fatal error: {}", error);
        std::process::abort()
    }

    fn report_no_memory(&self, error: &TraceError) {
        tracing::error!("{}", error);
        let mut slot = match self.pending.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(error.clone());
    }
}
