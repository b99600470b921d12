//! Enter/exit instrumentation protocol
//!
//! Every generated call-site wrapper does the same five steps:
//!
//! ```text
//! handle = ctx.on_enter(op)      count the call, notify on-enter observer
//! start  = clock.now()
//! result = real_operation(...)
//! end    = clock.now()
//! handle.on_exit(op, start, end) add end - start, notify on-exit observer
//! ```
//!
//! [`TraceContext::instrument`] and the [`trace_call!`](crate::trace_call)
//! macro package these steps so the exit half runs on every exit path of
//! the wrapped operation, unwinding included.

use crate::catalog::OperationId;
use crate::clock::{ClockReading, ClockSource};
use crate::context::TraceContext;
use crate::error::{FatalError, HookPhase};

/// Proof that `on_enter` ran; consumed by the matching `on_exit`
///
/// Borrows the trace context itself, so no per-call allocation happens and
/// the exit needs no second lookup.
#[must_use = "every on_enter must be paired with on_exit"]
pub struct TraceHandle<'c, 'h> {
    ctx: &'c mut TraceContext<'h>,
}

impl<'h> TraceContext<'h> {
    /// Count one call of `op` and notify the on-enter observer
    ///
    /// The counter is incremented whether or not an observer is installed.
    /// A failing observer (or failed argument construction) is fatal.
    #[inline]
    pub fn on_enter(&mut self, op: OperationId) -> TraceHandle<'_, 'h> {
        let index = self.checked_index(op);
        self.counters[index] = self.counters[index].saturating_add(1);
        self.notify(HookPhase::Enter, op);
        TraceHandle { ctx: self }
    }

    /// Run `f` as operation `op`, bracketed by enter/exit and two clock reads
    pub fn instrument<C, F, R>(&mut self, op: OperationId, clock: &C, f: F) -> R
    where
        C: ClockSource + ?Sized,
        F: FnOnce() -> R,
    {
        let handle = self.on_enter(op);
        let start = clock.now();
        let _exit = ExitGuard {
            pending: Some((handle, start)),
            op,
            clock,
        };
        f()
    }
}

/// Runs the exit half when dropped, so a panicking body is still accounted
struct ExitGuard<'a, 'c, 'h, C: ClockSource + ?Sized> {
    pending: Option<(TraceHandle<'c, 'h>, ClockReading)>,
    op: OperationId,
    clock: &'a C,
}

impl<C: ClockSource + ?Sized> Drop for ExitGuard<'_, '_, '_, C> {
    fn drop(&mut self) {
        if let Some((handle, start)) = self.pending.take() {
            let end = self.clock.now();
            handle.on_exit(self.op, start, end);
        }
    }
}

impl<'c, 'h> TraceHandle<'c, 'h> {
    /// Add the measured time to `op` and notify the on-exit observer
    ///
    /// If either bracketing clock read failed, this reports a fatal error
    /// naming the operation before touching the duration.
    #[inline]
    pub fn on_exit(self, op: OperationId, start: ClockReading, end: ClockReading) {
        let ctx = self.ctx;
        let index = ctx.checked_index(op);
        let (start, end) = match (start, end) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => {
                let name = ctx.catalog.name_of(op);
                ctx.fail(FatalError::clock_failure(name, e))
            }
        };
        ctx.durations[index].accumulate(start, end);
        ctx.notify(HookPhase::Exit, op);
    }

    pub fn context(&self) -> &TraceContext<'h> {
        self.ctx
    }
}

/// Instrument one call site
///
/// Expands to [`TraceContext::instrument`] with the body as a closure, so
/// `?`, `return` and panics inside the body leave the closure and the exit
/// half still runs. The clock defaults to [`MonotonicClock`](crate::clock::MonotonicClock).
///
/// ```
/// use calltrace::catalog::{OperationId, StaticCatalog};
/// use calltrace::context::TraceSlot;
/// use calltrace::host::ProcessHost;
/// use calltrace::trace_call;
///
/// static CATALOG: StaticCatalog = StaticCatalog::new(&["alloc", "free"]);
///
/// let host = ProcessHost::new();
/// let mut slot = TraceSlot::new();
/// let ctx = slot.initialize(&host, &CATALOG).unwrap();
///
/// let sum = trace_call!(ctx, OperationId(0), { 2 + 2 });
/// assert_eq!(sum, 4);
/// assert_eq!(ctx.call_count(OperationId(0)), Some(1));
/// ```
#[macro_export]
macro_rules! trace_call {
    ($ctx:expr, $op:expr, $body:block) => {
        $crate::context::TraceContext::instrument($ctx, $op, &$crate::clock::MonotonicClock, || $body)
    };
    ($ctx:expr, $clock:expr, $op:expr, $body:block) => {
        $crate::context::TraceContext::instrument($ctx, $op, $clock, || $body)
    };
}
