//! Service descriptors
//!
//! A descriptor binds a contract to one way of producing it (activator, factory or
//! pre-built instance) plus a lifetime. Descriptors are immutable once they are
//! part of a registry.

use crate::activator::{Activator, ConstructorActivator, Dependencies};
use crate::contract::{Injectable, Instance, Lifetime, ServiceKey, erase};
use crate::disposal::{Dispose, Disposer};
use crate::error::{DiError, Result};
use crate::scope::ServiceScope;
use std::sync::Arc;

/// Type-erased factory closure receiving the resolving scope.
pub(crate) type FactoryFn = Arc<dyn Fn(&ServiceScope) -> Result<Instance> + Send + Sync>;

/// How a descriptor produces its instance.
#[derive(Clone)]
pub enum Implementation {
    /// Constructor with a declared dependency list
    Activator(Arc<dyn Activator>),
    /// Closure over the resolving scope; its dependencies are opaque to the engine
    Factory(FactoryFn),
    /// Pre-built instance; never disposed by the container
    Instance(Instance),
}

impl std::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activator(activator) => f
                .debug_tuple("Activator")
                .field(&activator.dependencies())
                .finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// Registration record for one implementation of a contract.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub(crate) key: ServiceKey,
    pub(crate) implementation: Implementation,
    pub(crate) lifetime: Lifetime,
    pub(crate) implementation_name: &'static str,
    pub(crate) disposer: Option<Disposer>,
}

impl ServiceDescriptor {
    /// Constructor-based registration for contract `T`.
    pub fn constructor<T, D, F>(lifetime: Lifetime, constructor: F) -> Self
    where
        T: ?Sized + Injectable,
        D: Dependencies,
        F: Fn(D) -> Arc<T> + Send + Sync + 'static,
    {
        Self::activator::<T>(lifetime, Arc::new(ConstructorActivator::<T, D, F>::new(constructor)))
    }

    /// Registration backed by a custom [`Activator`].
    pub fn activator<T: ?Sized + Injectable>(lifetime: Lifetime, activator: Arc<dyn Activator>) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            implementation: Implementation::Activator(activator),
            lifetime,
            implementation_name: std::any::type_name::<T>(),
            disposer: None,
        }
    }

    /// Factory-based registration for contract `T`.
    ///
    /// The factory receives the scope the service is being resolved against.
    /// Singletons are always built against the root container.
    pub fn factory<T, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Injectable,
        F: Fn(&ServiceScope) -> std::result::Result<Arc<T>, crate::BoxError> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(move |scope: &ServiceScope| {
            factory(scope).map(erase).map_err(|err| match err.downcast::<DiError>() {
                Ok(di) => *di,
                Err(other) => DiError::creation_failed::<T>(other.to_string()),
            })
        });

        Self {
            key: ServiceKey::of::<T>(),
            implementation: Implementation::Factory(factory),
            lifetime,
            implementation_name: std::any::type_name::<T>(),
            disposer: None,
        }
    }

    /// Pre-built singleton instance.
    pub fn instance<T: ?Sized + Injectable>(instance: Arc<T>) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            implementation: Implementation::Instance(erase(instance)),
            lifetime: Lifetime::Singleton,
            implementation_name: std::any::type_name::<T>(),
            disposer: None,
        }
    }

    /// Name the implementation for diagnostics (defaults to the contract name).
    pub fn named(mut self, implementation_name: &'static str) -> Self {
        self.implementation_name = implementation_name;
        self
    }

    /// Dispose instances with their owning scope.
    ///
    /// Ignored for pre-built instances, which the container never owns.
    pub fn disposable<T: ?Sized + Injectable + Dispose>(mut self) -> Self {
        debug_assert_eq!(self.key, ServiceKey::of::<T>(), "disposer type must match the contract");
        if !matches!(self.implementation, Implementation::Instance(_)) {
            self.disposer = Some(Disposer::of::<T>());
        }
        self
    }

    /// Contract this descriptor satisfies
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Lifetime policy
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Implementation details
    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    /// Implementation name used in diagnostics
    pub fn implementation_name(&self) -> &'static str {
        self.implementation_name
    }

    /// Whether instances are tracked for disposal
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("implementation", &self.implementation)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxError;

    struct Handle;

    impl Dispose for Handle {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_instance_descriptor_is_singleton_and_never_disposable() {
        let descriptor = ServiceDescriptor::instance(Arc::new(Handle)).disposable::<Handle>();
        assert_eq!(descriptor.lifetime(), Lifetime::Singleton);
        assert!(!descriptor.is_disposable());
        assert!(matches!(descriptor.implementation(), Implementation::Instance(_)));
    }

    #[test]
    fn test_constructor_descriptor_records_dependencies() {
        let descriptor =
            ServiceDescriptor::constructor(Lifetime::Scoped, |_count: Arc<u32>| Arc::new(Handle)).disposable::<Handle>();

        assert_eq!(descriptor.key(), ServiceKey::of::<Handle>());
        assert!(descriptor.is_disposable());
        match descriptor.implementation() {
            Implementation::Activator(activator) => assert_eq!(activator.dependencies().len(), 1),
            other => panic!("unexpected implementation: {other:?}"),
        }
    }
}
