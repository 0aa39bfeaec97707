//! Call sites: immutable construction plans
//!
//! The graph builder turns a contract into a tree of [`CallSite`]s. Once built a
//! site never changes and is shared through `Arc` by every resolver that reaches it.

use crate::activator::Activator;
use crate::contract::{Instance, Lifetime, ServiceKey};
use crate::descriptor::FactoryFn;
use crate::disposal::Disposer;
use crate::registry::DescriptorId;
use std::sync::Arc;

/// Construction plan for one contract.
pub(crate) enum CallSite {
    /// Invoke an activator with resolved dependencies
    Constructor(ConstructorCallSite),
    /// Invoke a factory closure with the resolving scope
    Factory(FactoryCallSite),
    /// Return a pre-built instance
    Constant(ConstantCallSite),
    /// Resolve every registration of a contract
    Enumerable(EnumerableCallSite),
    /// Collection request with no registrations
    EmptyEnumerable(ServiceKey),
    /// The resolving scope itself
    Scope,
    /// Cache the inner site per scope or per container
    Lifetime(LifetimeCallSite),
}

impl CallSite {
    /// Contract the site produces
    pub(crate) fn key(&self) -> ServiceKey {
        match self {
            Self::Constructor(site) => site.key,
            Self::Factory(site) => site.key,
            Self::Constant(site) => site.key,
            Self::Enumerable(site) => site.key,
            Self::EmptyEnumerable(key) => *key,
            Self::Scope => ServiceKey::of::<crate::ServiceScope>(),
            Self::Lifetime(site) => site.inner.key(),
        }
    }

    /// Caching regime of the site
    pub(crate) fn lifetime(&self) -> Lifetime {
        match self {
            Self::Lifetime(site) => site.lifetime,
            Self::Constant(_) => Lifetime::Singleton,
            _ => Lifetime::Transient,
        }
    }

    /// Short variant name for logs
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Constructor(_) => "constructor",
            Self::Factory(_) => "factory",
            Self::Constant(_) => "constant",
            Self::Enumerable(_) => "enumerable",
            Self::EmptyEnumerable(_) => "empty_enumerable",
            Self::Scope => "scope",
            Self::Lifetime(_) => "lifetime",
        }
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructor(site) => f
                .debug_struct("Constructor")
                .field("key", &site.key)
                .field("arguments", &site.arguments)
                .finish(),
            Self::Factory(site) => f.debug_struct("Factory").field("key", &site.key).finish(),
            Self::Constant(site) => f.debug_struct("Constant").field("key", &site.key).finish(),
            Self::Enumerable(site) => f
                .debug_struct("Enumerable")
                .field("key", &site.key)
                .field("items", &site.items)
                .finish(),
            Self::EmptyEnumerable(key) => f.debug_tuple("EmptyEnumerable").field(key).finish(),
            Self::Scope => f.write_str("Scope"),
            Self::Lifetime(site) => f
                .debug_struct("Lifetime")
                .field("lifetime", &site.lifetime)
                .field("descriptor", &site.descriptor)
                .field("inner", &site.inner)
                .finish(),
        }
    }
}

/// One resolved constructor parameter.
pub(crate) enum Argument {
    /// Produced by a nested site
    Site(Arc<CallSite>),
    /// Optional dependency without registration
    Absent,
    /// Required dependency without registration; fails at activation
    Missing(ServiceKey),
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Site(site) => site.fmt(f),
            Self::Absent => f.write_str("Absent"),
            Self::Missing(key) => write!(f, "Missing({key})"),
        }
    }
}

pub(crate) struct ConstructorCallSite {
    pub(crate) key: ServiceKey,
    pub(crate) implementation_name: &'static str,
    pub(crate) activator: Arc<dyn Activator>,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) disposer: Option<Disposer>,
}

pub(crate) struct FactoryCallSite {
    pub(crate) key: ServiceKey,
    pub(crate) descriptor: DescriptorId,
    pub(crate) factory: FactoryFn,
    pub(crate) disposer: Option<Disposer>,
}

pub(crate) struct ConstantCallSite {
    pub(crate) key: ServiceKey,
    pub(crate) instance: Instance,
}

pub(crate) struct EnumerableCallSite {
    pub(crate) key: ServiceKey,
    pub(crate) items: Vec<Arc<CallSite>>,
}

/// Caching wrapper for Scoped and Singleton registrations.
pub(crate) struct LifetimeCallSite {
    pub(crate) lifetime: Lifetime,
    pub(crate) descriptor: DescriptorId,
    pub(crate) inner: Arc<CallSite>,
}
