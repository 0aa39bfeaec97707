//! Service registry and registration surface
//!
//! [`ServiceCollection`] gathers descriptors; [`ServiceCollection::build`] freezes
//! them into an immutable [`ServiceRegistry`] owned by the container. Several
//! descriptors per contract are kept in registration order.

use crate::activator::Dependencies;
use crate::container::{Container, ContainerOptions};
use crate::contract::{Injectable, Lifetime, ServiceKey};
use crate::descriptor::ServiceDescriptor;
use crate::disposal::Dispose;
use crate::error::Result;
use crate::scope::ServiceScope;
use ahash::RandomState;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Identity of a descriptor inside its registry (its registration index).
///
/// Scoped and singleton caches are keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(usize);

impl DescriptorId {
    /// Registration index
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Immutable, ordered multi-map from contract to descriptors.
pub struct ServiceRegistry {
    descriptors: Vec<ServiceDescriptor>,
    index: HashMap<ServiceKey, Vec<DescriptorId>, RandomState>,
    keys: Vec<ServiceKey>,
}

impl ServiceRegistry {
    pub(crate) fn new(descriptors: Vec<ServiceDescriptor>) -> Self {
        let mut index: HashMap<ServiceKey, Vec<DescriptorId>, RandomState> =
            HashMap::with_capacity_and_hasher(descriptors.len(), RandomState::new());
        let mut keys = Vec::new();

        for (position, descriptor) in descriptors.iter().enumerate() {
            let ids = index.entry(descriptor.key).or_insert_with(|| {
                keys.push(descriptor.key);
                Vec::new()
            });
            ids.push(DescriptorId(position));
        }

        Self {
            descriptors,
            index,
            keys,
        }
    }

    /// Descriptor by id, if `id` was issued by this registry
    pub fn get(&self, id: DescriptorId) -> Option<&ServiceDescriptor> {
        self.descriptors.get(id.0)
    }

    /// Ids handed to this lookup come from this registry's own index.
    #[inline]
    pub(crate) fn descriptor(&self, id: DescriptorId) -> &ServiceDescriptor {
        &self.descriptors[id.0]
    }

    /// Last registration for `key` (the one single resolution uses)
    #[inline]
    pub fn last(&self, key: &ServiceKey) -> Option<DescriptorId> {
        self.index.get(key).and_then(|ids| ids.last().copied())
    }

    /// Every registration for `key`, in registration order
    #[inline]
    pub fn all(&self, key: &ServiceKey) -> &[DescriptorId] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if any descriptor is registered for `key`
    #[inline]
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Registered contracts in first-registration order
    pub fn keys(&self) -> &[ServiceKey] {
        &self.keys
    }

    /// Number of descriptors
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("descriptors", &self.descriptors.len())
            .field("contracts", &self.keys.len())
            .finish()
    }
}

/// Mutable list of registrations, consumed by [`build`](Self::build).
///
/// # Examples
///
/// ```rust
/// use tiered_injector::ServiceCollection;
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str);
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) {
///         println!("{msg}");
///     }
/// }
///
/// struct Repository {
///     logger: Arc<dyn Logger>,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.singleton(|()| -> Arc<dyn Logger> { Arc::new(ConsoleLogger) });
/// services.scoped(|logger: Arc<dyn Logger>| Arc::new(Repository { logger }));
///
/// let container = services.build().unwrap();
/// let scope = container.create_scope().unwrap();
/// let repo = scope.resolve_required::<Repository>().unwrap();
/// repo.logger.log("ready");
/// ```
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(capacity),
        }
    }

    /// Append a descriptor.
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            service = descriptor.key.type_name(),
            implementation = descriptor.implementation_name,
            lifetime = descriptor.lifetime.as_str(),
            position = self.descriptors.len(),
            "Registering service"
        );

        self.descriptors.push(descriptor);
        self
    }

    fn push<T: ?Sized + Injectable>(&mut self, descriptor: ServiceDescriptor) -> Registration<'_, T> {
        self.add(descriptor);
        Registration {
            collection: self,
            _marker: PhantomData,
        }
    }

    /// Register a singleton built by `constructor` on first use.
    pub fn singleton<T, D, F>(&mut self, constructor: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        D: Dependencies,
        F: Fn(D) -> Arc<T> + Send + Sync + 'static,
    {
        self.push(ServiceDescriptor::constructor(Lifetime::Singleton, constructor))
    }

    /// Register a service built once per scope.
    pub fn scoped<T, D, F>(&mut self, constructor: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        D: Dependencies,
        F: Fn(D) -> Arc<T> + Send + Sync + 'static,
    {
        self.push(ServiceDescriptor::constructor(Lifetime::Scoped, constructor))
    }

    /// Register a service built on every resolve.
    pub fn transient<T, D, F>(&mut self, constructor: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        D: Dependencies,
        F: Fn(D) -> Arc<T> + Send + Sync + 'static,
    {
        self.push(ServiceDescriptor::constructor(Lifetime::Transient, constructor))
    }

    /// Register a factory with the given lifetime.
    pub fn factory<T, F>(&mut self, lifetime: Lifetime, factory: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        F: Fn(&ServiceScope) -> std::result::Result<Arc<T>, crate::BoxError> + Send + Sync + 'static,
    {
        self.push(ServiceDescriptor::factory(lifetime, factory))
    }

    /// Register a singleton factory. It always receives the root scope.
    pub fn singleton_factory<T, F>(&mut self, factory: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        F: Fn(&ServiceScope) -> std::result::Result<Arc<T>, crate::BoxError> + Send + Sync + 'static,
    {
        self.factory(Lifetime::Singleton, factory)
    }

    /// Register a factory run once per scope.
    pub fn scoped_factory<T, F>(&mut self, factory: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        F: Fn(&ServiceScope) -> std::result::Result<Arc<T>, crate::BoxError> + Send + Sync + 'static,
    {
        self.factory(Lifetime::Scoped, factory)
    }

    /// Register a factory run on every resolve.
    pub fn transient_factory<T, F>(&mut self, factory: F) -> Registration<'_, T>
    where
        T: ?Sized + Injectable,
        F: Fn(&ServiceScope) -> std::result::Result<Arc<T>, crate::BoxError> + Send + Sync + 'static,
    {
        self.factory(Lifetime::Transient, factory)
    }

    /// Register a pre-built instance. It is shared everywhere and never disposed.
    pub fn instance<T: ?Sized + Injectable>(&mut self, instance: Arc<T>) -> &mut Self {
        self.add(ServiceDescriptor::instance(instance))
    }

    /// Check if a contract has at least one registration
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let key = ServiceKey::of::<T>();
        self.descriptors.iter().any(|d| d.key == key)
    }

    /// Registered descriptors in order
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Build a container with default options.
    pub fn build(self) -> Result<Container> {
        self.build_with(ContainerOptions::default())
    }

    /// Build a container with explicit options.
    ///
    /// Fails only when `validate_on_build` is set and a registration is invalid.
    pub fn build_with(self, options: ContainerOptions) -> Result<Container> {
        Container::from_registry(ServiceRegistry::new(self.descriptors), options)
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.descriptors).finish()
    }
}

/// Handle to the registration just added, for chaining options onto it.
pub struct Registration<'a, T: ?Sized> {
    collection: &'a mut ServiceCollection,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'a, T: ?Sized + Injectable> Registration<'a, T> {
    fn update(self, f: impl FnOnce(ServiceDescriptor) -> ServiceDescriptor) -> Self {
        if let Some(last) = self.collection.descriptors.pop() {
            self.collection.descriptors.push(f(last));
        }
        self
    }

    /// Dispose instances of this registration with their owning scope.
    pub fn disposable(self) -> Self
    where
        T: Dispose,
    {
        self.update(ServiceDescriptor::disposable::<T>)
    }

    /// Name the implementation for diagnostics.
    pub fn named(self, implementation_name: &'static str) -> Self {
        self.update(|d| d.named(implementation_name))
    }

    /// Return to the collection.
    pub fn done(self) -> &'a mut ServiceCollection {
        self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;

    #[test]
    fn test_registry_keeps_registration_order() {
        let registry = ServiceRegistry::new(vec![
            ServiceDescriptor::instance(Arc::new(1u32)),
            ServiceDescriptor::instance(Arc::new(A)),
            ServiceDescriptor::instance(Arc::new(2u32)),
        ]);

        let key = ServiceKey::of::<u32>();
        let ids: Vec<usize> = registry.all(&key).iter().map(|id| id.index()).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(registry.last(&key).map(|id| id.index()), Some(2));
        assert_eq!(registry.keys(), &[ServiceKey::of::<u32>(), ServiceKey::of::<A>()]);
    }

    #[test]
    fn test_unregistered_key_is_empty() {
        let registry = ServiceRegistry::new(Vec::new());
        let key = ServiceKey::of::<A>();
        assert!(registry.all(&key).is_empty());
        assert!(registry.last(&key).is_none());
        assert!(!registry.contains(&key));
    }

    #[test]
    fn test_foreign_descriptor_id_is_not_found() {
        let larger = ServiceRegistry::new(vec![
            ServiceDescriptor::instance(Arc::new(A)),
            ServiceDescriptor::instance(Arc::new(A)),
            ServiceDescriptor::instance(Arc::new(A)),
        ]);
        let smaller = ServiceRegistry::new(vec![ServiceDescriptor::instance(Arc::new(A))]);

        let key = ServiceKey::of::<A>();
        let foreign = larger.last(&key).unwrap();
        assert!(smaller.get(foreign).is_none());

        let own = smaller.last(&key).unwrap();
        assert_eq!(smaller.get(own).map(|d| d.key()), Some(key));
    }

    #[test]
    fn test_registration_handle_updates_last_descriptor() {
        let mut services = ServiceCollection::new();
        services.transient(|()| Arc::new(A)).named("A#1").done().instance(Arc::new(3u8));

        assert_eq!(services.len(), 2);
        assert_eq!(services.descriptors()[0].implementation_name(), "A#1");
        assert!(services.contains::<u8>());
    }
}
