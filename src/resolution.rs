//! Resolution cache and adaptive tiering
//!
//! Each requested contract is realized once into a [`ServiceAccessor`]. An
//! accessor starts on the interpreter and counts its calls; when the count
//! reaches the compilation threshold a compile task is handed to the
//! [`TaskScheduler`], which later swaps a compiled accessor into the cache.
//! Resolutions already in flight keep the accessor they started with.

use crate::call_site::CallSite;
use crate::compiler::{CallSiteCompiler, CompiledFn};
use crate::contract::{Contract, Instance};
use crate::error::Result;
use crate::interpreter::CallSiteRuntimeResolver;
use crate::scheduler::TaskScheduler;
use crate::scope::ServiceScope;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Which executor served a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Call-site walk
    Interpreted,
    /// Pre-built closure chain
    Compiled,
}

impl ExecutorKind {
    /// Lowercase name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interpreted => "interpreted",
            Self::Compiled => "compiled",
        }
    }
}

/// Hooks into the resolution pipeline, for tests and diagnostics.
///
/// Called synchronously on the resolving (or compiling) thread, so
/// implementations should be cheap.
pub trait ResolutionObserver: Send + Sync {
    /// A registered contract was served by `executor`
    fn on_resolved(&self, _contract: &Contract, _executor: ExecutorKind) {}

    /// A compiled accessor was installed for `contract`
    fn on_compiled(&self, _contract: &Contract) {}
}

enum Resolver {
    /// No registration; resolves to `None`
    Missing,
    Interpreted { calls: AtomicUsize },
    Compiled(CompiledFn),
}

/// Cached entry point for one contract.
pub(crate) struct ServiceAccessor {
    call_site: Option<Arc<CallSite>>,
    resolver: Resolver,
}

impl ServiceAccessor {
    fn interpreted(call_site: Option<Arc<CallSite>>) -> Self {
        let resolver = match call_site {
            Some(_) => Resolver::Interpreted {
                calls: AtomicUsize::new(0),
            },
            None => Resolver::Missing,
        };
        Self { call_site, resolver }
    }

    fn compiled(call_site: Arc<CallSite>, compiled: CompiledFn) -> Self {
        Self {
            call_site: Some(call_site),
            resolver: Resolver::Compiled(compiled),
        }
    }

    /// Plan behind this accessor; `None` for unregistered contracts
    pub(crate) fn call_site(&self) -> Option<&Arc<CallSite>> {
        self.call_site.as_ref()
    }

    /// Executor currently serving this accessor
    pub(crate) fn executor(&self) -> Option<ExecutorKind> {
        match self.resolver {
            Resolver::Missing => None,
            Resolver::Interpreted { .. } => Some(ExecutorKind::Interpreted),
            Resolver::Compiled(_) => Some(ExecutorKind::Compiled),
        }
    }
}

type AccessorMap = DashMap<Contract, Arc<ServiceAccessor>, RandomState>;

/// Contract to accessor map, plus the tiering policy.
pub(crate) struct ResolutionCache {
    accessors: Arc<AccessorMap>,
    scheduler: Arc<dyn TaskScheduler>,
    observer: Option<Arc<dyn ResolutionObserver>>,
    /// `None` keeps every contract on the interpreter
    threshold: Option<usize>,
}

impl ResolutionCache {
    pub(crate) fn new(
        scheduler: Arc<dyn TaskScheduler>,
        observer: Option<Arc<dyn ResolutionObserver>>,
        threshold: Option<usize>,
    ) -> Self {
        Self {
            accessors: Arc::new(DashMap::with_hasher(RandomState::new())),
            scheduler,
            observer,
            threshold: threshold.map(|n| n.max(1)),
        }
    }

    /// Cached accessor for `contract`, realizing it on first request.
    ///
    /// Realization runs outside any map guard; if two threads race, the first
    /// accessor stored wins and both get it. Failures are not cached.
    pub(crate) fn accessor(
        &self,
        contract: &Contract,
        realize: impl FnOnce(&Contract) -> Result<Option<Arc<CallSite>>>,
    ) -> Result<Arc<ServiceAccessor>> {
        if let Some(accessor) = self.accessors.get(contract) {
            return Ok(Arc::clone(accessor.value()));
        }

        let accessor = Arc::new(ServiceAccessor::interpreted(realize(contract)?));
        Ok(Arc::clone(self.accessors.entry(*contract).or_insert(accessor).value()))
    }

    /// Run `accessor` against `scope`, counting calls toward compilation.
    pub(crate) fn invoke(
        &self,
        contract: &Contract,
        accessor: &ServiceAccessor,
        scope: &ServiceScope,
    ) -> Result<Option<Instance>> {
        match (&accessor.resolver, &accessor.call_site) {
            (Resolver::Compiled(compiled), _) => {
                self.notify(contract, ExecutorKind::Compiled);
                compiled(scope).map(Some)
            }
            (Resolver::Interpreted { calls }, Some(site)) => {
                let count = calls.fetch_add(1, Ordering::Relaxed) + 1;
                if Some(count) == self.threshold {
                    self.schedule_compilation(*contract, site);
                }
                self.notify(contract, ExecutorKind::Interpreted);
                CallSiteRuntimeResolver::resolve(site, scope).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn notify(&self, contract: &Contract, executor: ExecutorKind) {
        #[cfg(feature = "logging")]
        trace!(
            target: "tiered_injector",
            contract = %contract,
            executor = executor.as_str(),
            "Executing resolver"
        );

        if let Some(observer) = &self.observer {
            observer.on_resolved(contract, executor);
        }
    }

    fn schedule_compilation(&self, contract: Contract, site: &Arc<CallSite>) {
        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            contract = %contract,
            "Scheduling call-site compilation"
        );

        let accessors: Weak<AccessorMap> = Arc::downgrade(&self.accessors);
        let observer = self.observer.clone();
        let site = Arc::clone(site);

        self.scheduler.schedule(Box::new(move || {
            // The container may be gone before a background task runs.
            let Some(accessors) = accessors.upgrade() else {
                return;
            };

            let compiled = CallSiteCompiler::compile(&site);
            accessors.insert(contract, Arc::new(ServiceAccessor::compiled(site, compiled)));

            #[cfg(feature = "logging")]
            debug!(
                target: "tiered_injector",
                contract = %contract,
                "Installed compiled resolver"
            );

            if let Some(observer) = observer {
                observer.on_compiled(&contract);
            }
        }));
    }

    /// Number of realized contracts
    pub(crate) fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Executor currently installed for `contract`, if realized and registered
    pub(crate) fn executor(&self, contract: &Contract) -> Option<ExecutorKind> {
        self.accessors.get(contract).and_then(|accessor| accessor.executor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::ConstantCallSite;
    use crate::container::Container;
    use crate::contract::{ServiceKey, downcast, erase};
    use crate::scheduler::{ImmediateScheduler, Task};
    use crate::ServiceCollection;
    use std::sync::Mutex;

    /// Holds tasks until the test runs them.
    #[derive(Default)]
    struct ManualScheduler {
        tasks: Mutex<Vec<Task>>,
    }

    impl ManualScheduler {
        fn run_all(&self) -> usize {
            let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            let count = tasks.len();
            tasks.into_iter().for_each(|task| task());
            count
        }
    }

    impl TaskScheduler for ManualScheduler {
        fn schedule(&self, task: Task) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    fn constant_site(value: u32) -> Arc<CallSite> {
        Arc::new(CallSite::Constant(ConstantCallSite {
            key: ServiceKey::of::<u32>(),
            instance: erase(Arc::new(value)),
        }))
    }

    fn root() -> Container {
        ServiceCollection::new().build().unwrap()
    }

    #[test]
    fn test_promotes_after_threshold() {
        let scheduler = Arc::new(ManualScheduler::default());
        let cache = ResolutionCache::new(scheduler.clone(), None, Some(2));
        let contract = Contract::single::<u32>();
        let container = root();

        for expected in [0, 1, 0] {
            let accessor = cache.accessor(&contract, |_| Ok(Some(constant_site(9)))).unwrap();
            let value = cache.invoke(&contract, &accessor, &container).unwrap().unwrap();
            assert_eq!(*downcast::<u32>(&value).unwrap(), 9);
            assert_eq!(scheduler.run_all(), expected);
        }

        assert_eq!(cache.executor(&contract), Some(ExecutorKind::Compiled));
    }

    #[test]
    fn test_in_flight_accessor_is_not_replaced() {
        let cache = ResolutionCache::new(Arc::new(ImmediateScheduler), None, Some(1));
        let contract = Contract::single::<u32>();
        let container = root();

        let accessor = cache.accessor(&contract, |_| Ok(Some(constant_site(1)))).unwrap();
        cache.invoke(&contract, &accessor, &container).unwrap();

        assert_eq!(accessor.executor(), Some(ExecutorKind::Interpreted));
        assert_eq!(cache.executor(&contract), Some(ExecutorKind::Compiled));
    }

    #[test]
    fn test_interpreted_only_never_schedules() {
        let scheduler = Arc::new(ManualScheduler::default());
        let cache = ResolutionCache::new(scheduler.clone(), None, None);
        let contract = Contract::single::<u32>();
        let container = root();

        let accessor = cache.accessor(&contract, |_| Ok(Some(constant_site(1)))).unwrap();
        for _ in 0..10 {
            cache.invoke(&contract, &accessor, &container).unwrap();
        }
        assert_eq!(scheduler.run_all(), 0);
    }

    #[test]
    fn test_missing_contract_is_cached_as_none() {
        let cache = ResolutionCache::new(Arc::new(ImmediateScheduler), None, Some(2));
        let contract = Contract::single::<u32>();
        let container = root();

        let accessor = cache.accessor(&contract, |_| Ok(None)).unwrap();
        assert!(cache.invoke(&contract, &accessor, &container).unwrap().is_none());

        // Cached: a second realize closure must not run.
        cache
            .accessor(&contract, |_| panic!("realized twice"))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.executor(&contract), None);
    }

    #[test]
    fn test_compilation_after_cache_dropped_is_skipped() {
        let scheduler = Arc::new(ManualScheduler::default());
        let contract = Contract::single::<u32>();
        let container = root();

        {
            let cache = ResolutionCache::new(scheduler.clone(), None, Some(1));
            let accessor = cache.accessor(&contract, |_| Ok(Some(constant_site(1)))).unwrap();
            cache.invoke(&contract, &accessor, &container).unwrap();
        }

        assert_eq!(scheduler.run_all(), 1);
    }
}
