//! Trace context: per-operation accounting for one host context
//!
//! A [`TraceContext`] owns one call counter and one cumulative duration per
//! operation id, the optional enter/exit observers, and a borrowed
//! reference to the host context it instruments. The borrow makes the
//! trace context's lifetime subordinate to the host's.
//!
//! The context lives in a [`TraceSlot`], created empty and initialized
//! lazily the first time instrumentation is needed. Initialization is
//! idempotent for the same host; rebinding to another host is fatal.
//!
//! # Concurrency
//!
//! The enter/exit protocol takes `&mut self`: one logical thread of control
//! drives a context at a time, enforced by the borrow checker. Observers run
//! without any lock held.

use std::collections::BTreeMap;
use std::collections::TryReserveError;

use crate::catalog::{OperationCatalog, OperationId};
use crate::clock::{ClockSource, MonotonicClock, Resolution};
use crate::duration::CallDuration;
use crate::error::{FatalError, FatalKind, HookPhase, TraceError};
use crate::host::HostContext;
use crate::observer::{self, HookRef, TraceHooks};
use crate::report::TraceSummary;

/// Accounting state for every operation of one host context
pub struct TraceContext<'h> {
    pub(crate) host: &'h dyn HostContext,
    pub(crate) catalog: &'h dyn OperationCatalog,
    /// Calls per operation; u64 does not overflow in a realistic lifetime
    pub(crate) counters: Box<[u64]>,
    pub(crate) durations: Box<[CallDuration]>,
    clock_resolution: Option<Resolution>,
    pub(crate) hooks: TraceHooks,
}

fn zeroed<T: Clone>(len: usize, value: T) -> Result<Box<[T]>, TryReserveError> {
    let mut storage = Vec::new();
    storage.try_reserve_exact(len)?;
    storage.resize(len, value);
    Ok(storage.into_boxed_slice())
}

impl<'h> TraceContext<'h> {
    fn allocate(
        host: &'h dyn HostContext,
        catalog: &'h dyn OperationCatalog,
        clock: &dyn ClockSource,
    ) -> Result<Self, TraceError> {
        let operations = catalog.len();
        let oom = |_| TraceError::OutOfMemory { operations };
        let counters = zeroed(operations, 0u64).map_err(oom)?;
        let durations = zeroed(operations, CallDuration::ZERO).map_err(oom)?;

        let clock_resolution = match clock.resolution() {
            Ok(res) if res.is_usable() => Some(res),
            Ok(_) => {
                tracing::warn!("monotonic clock reports zero resolution; it may not be initialized");
                None
            }
            Err(e) => {
                tracing::warn!("could not read monotonic clock resolution: {}", e);
                None
            }
        };

        Ok(TraceContext {
            host,
            catalog,
            counters,
            durations,
            clock_resolution,
            hooks: TraceHooks::new(),
        })
    }

    /// Whether this context is bound to `host`
    pub fn is_bound_to(&self, host: &dyn HostContext) -> bool {
        std::ptr::addr_eq(self.host, host)
    }

    pub fn uses_catalog(&self, catalog: &dyn OperationCatalog) -> bool {
        std::ptr::addr_eq(self.catalog, catalog)
    }

    pub fn host(&self) -> &'h dyn HostContext {
        self.host
    }

    pub fn catalog(&self) -> &'h dyn OperationCatalog {
        self.catalog
    }

    /// Size of the operation id space
    pub fn operation_count(&self) -> usize {
        self.counters.len()
    }

    /// Resolution captured at initialization, `None` if it could not be read
    pub fn clock_resolution(&self) -> Option<Resolution> {
        self.clock_resolution
    }

    pub fn counters(&self) -> &[u64] {
        &self.counters
    }

    pub fn durations(&self) -> &[CallDuration] {
        &self.durations
    }

    pub fn call_count(&self, op: OperationId) -> Option<u64> {
        self.counters.get(op.index()).copied()
    }

    pub fn duration(&self, op: OperationId) -> Option<CallDuration> {
        self.durations.get(op.index()).copied()
    }

    /// Call counts keyed by operation name
    pub fn call_counts_by_name(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .enumerate()
            .map(|(i, &count)| (self.name_at(i).to_string(), count))
            .collect()
    }

    /// Cumulative durations keyed by operation name
    pub fn durations_by_name(&self) -> BTreeMap<String, CallDuration> {
        self.durations
            .iter()
            .enumerate()
            .map(|(i, &total)| (self.name_at(i).to_string(), total))
            .collect()
    }

    /// Snapshot of the accounting state
    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_context(self)
    }

    pub fn hooks(&self) -> &TraceHooks {
        &self.hooks
    }

    /// Install or clear the on-enter observer; the replaced one is released
    pub fn set_on_enter(&mut self, hook: Option<HookRef>) {
        tracing::debug!(installed = hook.is_some(), "setting on-enter trace function");
        self.hooks.set(HookPhase::Enter, hook);
    }

    /// Install or clear the on-exit observer; the replaced one is released
    pub fn set_on_exit(&mut self, hook: Option<HookRef>) {
        tracing::debug!(installed = hook.is_some(), "setting on-exit trace function");
        self.hooks.set(HookPhase::Exit, hook);
    }

    /// Install or clear both observers at once
    pub fn set_trace_functions(&mut self, on_enter: Option<HookRef>, on_exit: Option<HookRef>) {
        self.set_on_enter(on_enter);
        self.set_on_exit(on_exit);
    }

    /// Release observer references; counters and durations are kept
    pub fn release_hooks(&mut self) {
        self.hooks.clear();
    }

    pub(crate) fn name_at(&self, index: usize) -> &str {
        self.catalog.name_of(OperationId(index as u32))
    }

    /// Index of `op`, fatal if it lies outside the catalog
    pub(crate) fn checked_index(&self, op: OperationId) -> usize {
        let index = op.index();
        if index >= self.counters.len() {
            self.fail(FatalError::new(
                FatalKind::UnknownOperation {
                    id: op.0,
                    catalog_len: self.counters.len(),
                },
                None,
            ));
        }
        index
    }

    /// Invoke the observer for `phase`, if installed; failure is fatal
    pub(crate) fn notify(&self, phase: HookPhase, op: OperationId) {
        let Some(hook) = self.hooks.get(phase) else {
            return;
        };
        let name = self.catalog.name_of(op);
        if let Err(e) = observer::invoke(self.host, hook.as_ref(), name) {
            self.fail(FatalError::hook_failed(phase, name, e));
        }
    }

    /// Hand `error` to the host; logging it is the host's job
    pub(crate) fn fail(&self, error: FatalError) -> ! {
        self.host.fatal_error(&error)
    }
}

impl std::fmt::Debug for TraceContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceContext")
            .field("operations", &self.counters.len())
            .field("clock_resolution", &self.clock_resolution)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Installation point for the trace context of one host context
///
/// Empty until [`initialize`](TraceSlot::initialize) succeeds.
#[derive(Debug, Default)]
pub struct TraceSlot<'h> {
    installed: Option<TraceContext<'h>>,
}

impl<'h> TraceSlot<'h> {
    pub const fn new() -> Self {
        TraceSlot { installed: None }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Initialize against the platform monotonic clock
    pub fn initialize(
        &mut self,
        host: &'h dyn HostContext,
        catalog: &'h dyn OperationCatalog,
    ) -> Result<&mut TraceContext<'h>, TraceError> {
        self.initialize_with_clock(host, catalog, &MonotonicClock)
    }

    /// Initialize the slot for `host`, or return the installed context
    ///
    /// Calling this again with the same host and catalog is a no-op.
    /// Calling it with a different host or catalog is a consistency
    /// violation reported through the originally bound host's fatal path. On allocation failure the error
    /// is reported to `host` and the slot stays empty.
    pub fn initialize_with_clock(
        &mut self,
        host: &'h dyn HostContext,
        catalog: &'h dyn OperationCatalog,
        clock: &dyn ClockSource,
    ) -> Result<&mut TraceContext<'h>, TraceError> {
        match self.installed {
            Some(ref mut ctx) => {
                if !ctx.is_bound_to(host) || !ctx.uses_catalog(catalog) {
                    ctx.fail(FatalError::new(FatalKind::ConsistencyViolation, None));
                }
                Ok(ctx)
            }
            None => {
                let ctx = match TraceContext::allocate(host, catalog, clock) {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        host.report_no_memory(&e);
                        return Err(e);
                    }
                };
                tracing::debug!(
                    operations = ctx.operation_count(),
                    resolution = ?ctx.clock_resolution(),
                    "trace context initialized"
                );
                Ok(self.installed.insert(ctx))
            }
        }
    }

    pub fn get(&self) -> Option<&TraceContext<'h>> {
        self.installed.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut TraceContext<'h>> {
        self.installed.as_mut()
    }

    /// Tear down: release observers, reclaim storage, return final totals
    ///
    /// Meant for host teardown. Returns `None` if nothing was installed.
    pub fn shutdown(&mut self) -> Option<TraceSummary> {
        let mut ctx = self.installed.take()?;
        ctx.release_hooks();
        let summary = ctx.summary();
        tracing::debug!(
            total_calls = summary.total_calls,
            "trace context shut down"
        );
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::error::{ClockError, ObserverError};
    use crate::observer::CallArgs;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    static NAMES: &[&str] = &["alloc", "free", "call"];
    static CATALOG: StaticCatalog = StaticCatalog::new(NAMES);

    #[derive(Default)]
    struct TestHost {
        oom_reports: Mutex<Vec<TraceError>>,
    }

    impl HostContext for TestHost {
        fn fatal_error(&self, error: &FatalError) -> ! {
            std::panic::panic_any(error.clone())
        }

        fn report_no_memory(&self, error: &TraceError) {
            self.oom_reports.lock().unwrap().push(error.clone());
        }
    }

    struct BrokenResolution;

    impl ClockSource for BrokenResolution {
        fn now(&self) -> crate::clock::ClockReading {
            Err(ClockError::OutOfRange)
        }

        fn resolution(&self) -> Result<Resolution, ClockError> {
            Err(ClockError::ReadFailed("EINVAL".into()))
        }
    }

    fn fatal_of(err: Box<dyn std::any::Any + Send>) -> FatalError {
        *err.downcast::<FatalError>().expect("fatal error payload")
    }

    #[test]
    fn test_initialize_zeroes_storage() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        assert!(!slot.is_installed());

        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        assert_eq!(ctx.operation_count(), 3);
        assert_eq!(ctx.counters(), &[0, 0, 0]);
        assert!(ctx.durations().iter().all(CallDuration::is_zero));
        assert!(ctx.hooks().is_empty());
        assert!(slot.is_installed());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();

        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        ctx.counters[1] = 5;
        ctx.durations[1] = CallDuration::from_nanos(77);

        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        assert_eq!(ctx.counters(), &[0, 5, 0]);
        assert_eq!(ctx.duration(OperationId(1)), Some(CallDuration::from_nanos(77)));
    }

    #[test]
    fn test_rebinding_to_other_host_is_fatal() {
        let first = TestHost::default();
        let second = TestHost::default();
        let mut slot = TraceSlot::new();
        slot.initialize(&first, &CATALOG).unwrap();

        let err = catch_unwind(AssertUnwindSafe(|| {
            let _ = slot.initialize(&second, &CATALOG);
        }))
        .unwrap_err();
        assert_eq!(fatal_of(err).kind, FatalKind::ConsistencyViolation);
    }

    #[test]
    fn test_rebinding_to_other_catalog_is_fatal() {
        static OTHER: StaticCatalog = StaticCatalog::new(&["open", "close", "read", "write"]);
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        slot.initialize(&host, &CATALOG).unwrap();

        let err = catch_unwind(AssertUnwindSafe(|| {
            let _ = slot.initialize(&host, &OTHER);
        }))
        .unwrap_err();
        assert_eq!(fatal_of(err).kind, FatalKind::ConsistencyViolation);
        assert_eq!(slot.get().unwrap().operation_count(), 3);
    }

    /// Counts ERROR-level events
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_fatal_path_leaves_logging_to_host() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(Arc::clone(&errors)));

        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        let failing: HookRef = Arc::new(|_: &CallArgs| -> Result<(), ObserverError> {
            Err(ObserverError::Raised("boom".into()))
        });
        ctx.set_on_enter(Some(failing));

        let outcome = tracing::subscriber::with_default(subscriber, || {
            catch_unwind(AssertUnwindSafe(|| {
                let _ = ctx.on_enter(OperationId(0));
            }))
        });

        assert!(matches!(fatal_of(outcome.unwrap_err()).kind, FatalKind::EnterHookFailed(_)));
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_resolution_is_diagnostic_only() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot
            .initialize_with_clock(&host, &CATALOG, &BrokenResolution)
            .unwrap();
        assert!(ctx.clock_resolution().is_none());
    }

    #[test]
    fn test_platform_resolution_captured() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        assert!(ctx.clock_resolution().is_some());
    }

    #[test]
    fn test_allocation_failure_reported_to_host() {
        struct Huge;
        impl OperationCatalog for Huge {
            fn len(&self) -> usize {
                usize::MAX / 2
            }
            fn name_of(&self, _id: OperationId) -> &str {
                "huge"
            }
        }

        let host = TestHost::default();
        let catalog = Huge;
        let mut slot = TraceSlot::new();
        let err = slot.initialize(&host, &catalog).unwrap_err();

        assert!(matches!(err, TraceError::OutOfMemory { .. }));
        assert!(!slot.is_installed());
        assert_eq!(host.oom_reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_set_trace_functions_replaces_and_releases() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();

        let hook: HookRef = Arc::new(|_: &CallArgs| -> Result<(), ObserverError> { Ok(()) });
        ctx.set_trace_functions(Some(Arc::clone(&hook)), Some(Arc::clone(&hook)));
        assert_eq!(Arc::strong_count(&hook), 3);

        ctx.set_trace_functions(None, Some(Arc::clone(&hook)));
        assert_eq!(Arc::strong_count(&hook), 2);
        assert!(ctx.hooks().get(HookPhase::Enter).is_none());

        ctx.release_hooks();
        assert_eq!(Arc::strong_count(&hook), 1);
    }

    #[test]
    fn test_by_name_views() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        ctx.counters[2] = 4;
        ctx.durations[2] = CallDuration::from_nanos(10);

        let counts = ctx.call_counts_by_name();
        assert_eq!(counts["call"], 4);
        assert_eq!(counts["alloc"], 0);
        assert_eq!(ctx.durations_by_name()["call"], CallDuration::from_nanos(10));
    }

    #[test]
    fn test_shutdown_returns_summary_and_empties_slot() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        ctx.counters[0] = 2;

        let hook: HookRef = Arc::new(|_: &CallArgs| -> Result<(), ObserverError> { Ok(()) });
        ctx.set_on_exit(Some(Arc::clone(&hook)));

        let summary = slot.shutdown().unwrap();
        assert_eq!(summary.total_calls, 2);
        assert!(!slot.is_installed());
        assert_eq!(Arc::strong_count(&hook), 1);
        assert!(slot.shutdown().is_none());
    }

    #[test]
    fn test_lookups_outside_catalog() {
        let host = TestHost::default();
        let mut slot = TraceSlot::new();
        let ctx = slot.initialize(&host, &CATALOG).unwrap();
        assert_eq!(ctx.call_count(OperationId(3)), None);
        assert_eq!(ctx.duration(OperationId(9)), None);
    }
}
