//! Enter/exit observer hooks
//!
//! An observer is called with exactly one positional argument, the display
//! name of the operation, and no keyword arguments. Argument values exist
//! only for the duration of one invocation.

use std::fmt;
use std::sync::Arc;

use crate::error::{HookPhase, ObserverError};
use crate::host::HostContext;

/// Argument bundle for one observer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArgs {
    name: Arc<str>,
}

impl CallArgs {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        CallArgs { name: name.into() }
    }

    /// The single positional argument
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name value, for hosts that intern argument strings
    pub fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    /// Positional argument count, always one
    pub fn len(&self) -> usize {
        1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A user-supplied observer
pub trait TraceHook: Send + Sync {
    fn call(&self, args: &CallArgs) -> Result<(), ObserverError>;
}

impl<F> TraceHook for F
where
    F: Fn(&CallArgs) -> Result<(), ObserverError> + Send + Sync,
{
    fn call(&self, args: &CallArgs) -> Result<(), ObserverError> {
        self(args)
    }
}

/// Shared handle to an installed observer
pub type HookRef = Arc<dyn TraceHook>;

/// The two optional observer slots of a trace context
#[derive(Default, Clone)]
pub struct TraceHooks {
    on_enter: Option<HookRef>,
    on_exit: Option<HookRef>,
}

impl TraceHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phase: HookPhase) -> Option<&HookRef> {
        match phase {
            HookPhase::Enter => self.on_enter.as_ref(),
            HookPhase::Exit => self.on_exit.as_ref(),
        }
    }

    /// Install or clear one slot, returning the hook it replaced
    pub fn set(&mut self, phase: HookPhase, hook: Option<HookRef>) -> Option<HookRef> {
        let slot = match phase {
            HookPhase::Enter => &mut self.on_enter,
            HookPhase::Exit => &mut self.on_exit,
        };
        std::mem::replace(slot, hook)
    }

    pub fn is_empty(&self) -> bool {
        self.on_enter.is_none() && self.on_exit.is_none()
    }

    /// Drop both hook references
    pub fn clear(&mut self) {
        self.on_enter = None;
        self.on_exit = None;
    }
}

impl fmt::Debug for TraceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHooks")
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// Build the name argument, invoke `hook` once, release the argument
///
/// The argument is dropped before this returns, whatever the outcome, so a
/// caller escalating the error to a fatal report holds nothing.
pub fn invoke(
    host: &dyn HostContext,
    hook: &dyn TraceHook,
    operation: &str,
) -> Result<(), ObserverError> {
    let args = host.build_args(operation)?;
    let result = host.call_hook(hook, &args);
    drop(args);
    result
}
