//! Service scopes
//!
//! Every resolution happens against a [`ServiceScope`]. The container owns the
//! root scope; [`ServiceScope::create_scope`] opens children that share the
//! container's engine and singletons but own their scoped instances and
//! disposables.

use crate::container::Engine;
use crate::contract::{Contract, Injectable, Instance, Lifetime, ServiceKey, downcast, downcast_list};
use crate::disposal::{DisposalTracker, Disposer};
use crate::error::{DiError, Result};
use crate::registry::DescriptorId;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// Unique scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Per-descriptor slot; the cell guarantees at-most-once construction.
type Slot = Arc<OnceCell<Instance>>;

/// One construction running on the current thread. `scope` is `None` for
/// transient factories, which are not bound to a cache.
#[derive(Clone, Copy)]
struct Construction {
    scope: Option<ScopeId>,
    descriptor: DescriptorId,
    key: ServiceKey,
}

thread_local! {
    static CONSTRUCTING: RefCell<Vec<Construction>> = const { RefCell::new(Vec::new()) };
}

/// Pops the construction pushed by [`constructing`], also on unwind.
struct ConstructionGuard;

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `build` as the construction of `descriptor` in `scope`.
///
/// Factories are opaque to the graph builder, so one that resolves its own
/// registration is only caught here: re-entering a construction already
/// running on this thread fails with `CircularDependency` instead of blocking
/// on its own once-cell or recursing without end.
pub(crate) fn constructing<R>(
    scope: Option<ScopeId>,
    descriptor: DescriptorId,
    key: ServiceKey,
    build: impl FnOnce() -> Result<R>,
) -> Result<R> {
    let entry = Construction { scope, descriptor, key };

    CONSTRUCTING.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(start) = stack
            .iter()
            .position(|c| c.scope == entry.scope && c.descriptor == entry.descriptor)
        {
            // A cached factory holds two frames for one descriptor
            let mut frames: Vec<&Construction> = stack[start..].iter().collect();
            frames.dedup_by_key(|c| c.descriptor);
            let path = frames
                .iter()
                .map(|c| c.key.type_name())
                .chain(std::iter::once(key.type_name()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiError::CircularDependency {
                type_name: key.type_name(),
                path,
            });
        }
        stack.push(entry);
        Ok(())
    })?;

    let _guard = ConstructionGuard;
    build()
}

struct ScopeInner {
    id: ScopeId,
    engine: Arc<Engine>,
    /// `None` for the root scope
    root: Option<ServiceScope>,
    instances: DashMap<DescriptorId, Slot, RandomState>,
    disposables: DisposalTracker,
    disposed: AtomicBool,
}

impl ScopeInner {
    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let failures = self.disposables.dispose_all();
        self.instances.clear();

        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            scope = %self.id,
            root = self.root.is_none(),
            failures = failures.len(),
            "Disposed scope"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::DisposalFailed { failures })
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if let Err(_err) = self.dispose() {
            #[cfg(feature = "logging")]
            warn!(
                target: "tiered_injector",
                scope = %self.id,
                error = %_err,
                "Disposal failures while dropping scope"
            );
        }
    }
}

/// A resolution context with its own scoped instances.
///
/// Cloning is cheap and yields another handle to the same scope. The scope is
/// disposed by [`dispose`](Self::dispose) or when its last handle is dropped.
/// Child scopes keep the root alive.
///
/// Factories can take the resolving scope as a dependency by asking for
/// `ServiceScope` itself. An instance that stores that handle inside its own
/// scope forms a reference cycle, which only an explicit `dispose` breaks.
///
/// # Examples
///
/// ```rust
/// use tiered_injector::ServiceCollection;
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let mut services = ServiceCollection::new();
/// services.scoped(|()| Arc::new(RequestId(7)));
/// let container = services.build().unwrap();
///
/// let scope = container.create_scope().unwrap();
/// let a = scope.resolve_required::<RequestId>().unwrap();
/// let b = scope.resolve_required::<RequestId>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// scope.dispose().unwrap();
/// assert!(scope.resolve::<RequestId>().is_err());
/// ```
#[derive(Clone)]
pub struct ServiceScope {
    inner: Arc<ScopeInner>,
}

impl ServiceScope {
    pub(crate) fn root(engine: Arc<Engine>) -> Self {
        let scope = Self::open(engine, None);

        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            scope = %scope.inner.id,
            "Created root scope"
        );

        scope
    }

    fn open(engine: Arc<Engine>, root: Option<ServiceScope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::next(),
                engine,
                root,
                instances: DashMap::with_hasher_and_shard_amount(RandomState::new(), 4),
                disposables: DisposalTracker::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Scope identifier
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// True for the container's own scope
    #[inline]
    pub fn is_root(&self) -> bool {
        self.inner.root.is_none()
    }

    /// True once [`dispose`](Self::dispose) has run
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// The container's root scope
    #[inline]
    pub(crate) fn root_scope(&self) -> &ServiceScope {
        self.inner.root.as_ref().unwrap_or(self)
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.inner.engine
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(DiError::disposed(self.inner.id))
        } else {
            Ok(())
        }
    }

    /// Open a child scope.
    ///
    /// Children are siblings of each other: scoped instances are never shared
    /// between scopes, whichever scope the child was opened from.
    pub fn create_scope(&self) -> Result<ServiceScope> {
        self.ensure_alive()?;
        self.root_scope().ensure_alive()?;

        let child = Self::open(Arc::clone(&self.inner.engine), Some(self.root_scope().clone()));

        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            scope = %child.inner.id,
            parent = %self.inner.id,
            "Created child scope"
        );

        Ok(child)
    }

    /// Resolve a request. `Ok(None)` when a single contract is not registered.
    ///
    /// Fails with `ObjectDisposed` once this scope or the container is disposed.
    pub fn resolve_contract(&self, contract: &Contract) -> Result<Option<Instance>> {
        self.ensure_alive()?;
        self.root_scope().ensure_alive()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "tiered_injector",
            contract = %contract,
            scope = %self.inner.id,
            "Resolving service"
        );

        self.inner.engine.resolve(contract, self)
    }

    /// Resolve `T`, or `None` when it is not registered.
    ///
    /// Errors other than "not registered" (cycles, missing dependencies, failed
    /// factories, disposed scope) are returned as `Err`.
    pub fn resolve<T: ?Sized + Injectable>(&self) -> Result<Option<Arc<T>>> {
        match self.resolve_contract(&Contract::single::<T>())? {
            Some(instance) => downcast::<T>(&instance)
                .map(Some)
                .ok_or_else(|| DiError::creation_failed::<T>("resolved instance has an unexpected type")),
            None => Ok(None),
        }
    }

    /// Resolve `T`, failing with `NotFound` when it is not registered.
    pub fn resolve_required<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        self.resolve::<T>()?.ok_or_else(DiError::not_found::<T>)
    }

    /// Alias for [`resolve_required`](Self::resolve_required).
    #[inline]
    pub fn get<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        self.resolve_required::<T>()
    }

    /// Resolve every registration of `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Injectable>(&self) -> Result<Vec<Arc<T>>> {
        let instance = self
            .resolve_contract(&Contract::collection::<T>())?
            .ok_or_else(DiError::not_found::<T>)?;
        downcast_list::<T>(&instance)
            .ok_or_else(|| DiError::creation_failed::<T>("resolved collection has an unexpected type"))
    }

    /// Check if `T` has a registration
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.inner
            .engine
            .registry()
            .contains(&ServiceKey::of::<T>())
    }

    /// Number of disposables currently owned by this scope
    pub fn tracked_disposables(&self) -> usize {
        self.inner.disposables.len()
    }

    /// Dispose every tracked instance in reverse creation order.
    ///
    /// Idempotent. All disposals are attempted; failures are reported together
    /// as [`DiError::DisposalFailed`]. Singletons are owned by the root scope and
    /// are only disposed with it.
    pub fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }

    /// Return the cached instance for a Scoped or Singleton descriptor, building it
    /// with `build` against the owning scope on first use.
    ///
    /// Concurrent first requests build exactly once; the others wait and share
    /// the result. A failed build leaves the slot empty.
    pub(crate) fn cached(
        &self,
        lifetime: Lifetime,
        descriptor: DescriptorId,
        key: ServiceKey,
        build: impl FnOnce(&ServiceScope) -> Result<Instance>,
    ) -> Result<Instance> {
        let owner = match lifetime {
            Lifetime::Singleton => self.root_scope(),
            _ => self,
        };
        owner.ensure_alive()?;

        if let Some(slot) = owner.inner.instances.get(&descriptor) {
            if let Some(instance) = slot.value().get() {
                return Ok(Arc::clone(instance));
            }
        }

        // Clone the slot out so no map guard is held while building, which may
        // recurse into this same map.
        let slot = Arc::clone(owner.inner.instances.entry(descriptor).or_default().value());
        constructing(Some(owner.inner.id), descriptor, key, || {
            slot.get_or_try_init(|| build(owner)).map(Arc::clone)
        })
    }

    /// Hand a freshly constructed instance to this scope's disposal tracker.
    pub(crate) fn capture(&self, instance: &Instance, disposer: Option<&Disposer>) -> Result<()> {
        self.inner.disposables.track(instance, disposer, &self.inner.id)
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.inner.id)
            .field("root", &self.is_root())
            .field("instances", &self.inner.instances.len())
            .field("disposables", &self.inner.disposables.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, Dispose, ServiceCollection};
    use std::sync::Mutex;

    struct Counter;

    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Dispose for Tracked {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    #[test]
    fn test_scope_ids_unique_and_displayed() {
        let a = ScopeId::next();
        let b = ScopeId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("scope-"));
    }

    #[test]
    fn test_child_of_child_shares_root_but_not_scoped() {
        let mut services = ServiceCollection::new();
        services.scoped(|()| Arc::new(Counter));
        let container = services.build().unwrap();

        let child = container.create_scope().unwrap();
        let grandchild = child.create_scope().unwrap();

        assert!(!child.is_root());
        assert!(Arc::ptr_eq(&grandchild.root_scope().inner, &child.root_scope().inner));

        let a = child.resolve_required::<Counter>().unwrap();
        let b = grandchild.resolve_required::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_drop_disposes_last_handle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut services = ServiceCollection::new();
        let shared = Arc::clone(&log);
        services
            .transient(move |()| {
                Arc::new(Tracked {
                    name: "dropped",
                    log: Arc::clone(&shared),
                })
            })
            .disposable();
        let container = services.build().unwrap();

        {
            let scope = container.create_scope().unwrap();
            let clone = scope.clone();
            clone.resolve_required::<Tracked>().unwrap();
            assert_eq!(scope.tracked_disposables(), 1);
            drop(clone);
            assert!(log.lock().unwrap().is_empty());
        }

        assert_eq!(*log.lock().unwrap(), vec!["dropped"]);
    }

    #[test]
    fn test_create_scope_after_dispose_fails() {
        let container = ServiceCollection::new().build().unwrap();
        let scope = container.create_scope().unwrap();
        scope.dispose().unwrap();
        assert!(matches!(scope.create_scope(), Err(DiError::ObjectDisposed { .. })));
        assert!(container.create_scope().is_ok());
    }
}
