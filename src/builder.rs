//! Call-site graph builder
//!
//! Turns a [`Contract`] into a [`CallSite`] tree:
//!
//! - single requests use the *last* registration, so re-registering overrides;
//! - collection requests use every registration in order, and an unregistered
//!   collection is simply empty;
//! - an unregistered single request is reported as `None` and the caller decides
//!   whether that is fatal;
//! - cycles fail with [`DiError::CircularDependency`].
//!
//! Each descriptor gets exactly one site, cached after its first successful build.

use crate::activator::Dependency;
use crate::call_site::{
    Argument, CallSite, ConstantCallSite, ConstructorCallSite, EnumerableCallSite, FactoryCallSite,
    LifetimeCallSite,
};
use crate::contract::{Contract, Lifetime, ServiceKey};
use crate::descriptor::Implementation;
use crate::error::{DiError, Result};
use crate::registry::{DescriptorId, ServiceRegistry};
use crate::scope::ServiceScope;
use ahash::RandomState;
use dashmap::DashMap;
use indexmap::IndexSet;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Contracts currently being built on this call stack.
#[derive(Default)]
pub(crate) struct CallSiteChain {
    in_progress: IndexSet<ServiceKey, RandomState>,
}

impl CallSiteChain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, key: ServiceKey) -> Result<()> {
        if self.in_progress.insert(key) {
            return Ok(());
        }

        let path = self
            .in_progress
            .iter()
            .skip_while(|k| **k != key)
            .chain(std::iter::once(&key))
            .map(ServiceKey::type_name)
            .collect::<Vec<_>>()
            .join(" -> ");

        Err(DiError::CircularDependency {
            type_name: key.type_name(),
            path,
        })
    }

    fn leave(&mut self, key: &ServiceKey) {
        self.in_progress.shift_remove(key);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}

/// Builds and caches call sites for one registry.
pub(crate) struct CallSiteFactory {
    registry: Arc<ServiceRegistry>,
    sites: DashMap<DescriptorId, Arc<CallSite>, RandomState>,
}

impl CallSiteFactory {
    pub(crate) fn new(registry: Arc<ServiceRegistry>) -> Self {
        let capacity = registry.len();
        Self {
            registry,
            sites: DashMap::with_capacity_and_hasher_and_shard_amount(capacity, RandomState::new(), 8),
        }
    }

    pub(crate) fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Build the plan for `contract`. `Ok(None)` means no registration.
    pub(crate) fn build(&self, contract: &Contract) -> Result<Option<Arc<CallSite>>> {
        let mut chain = CallSiteChain::new();
        let result = self.create(contract, &mut chain);
        debug_assert!(chain.is_empty(), "call-site chain must unwind completely");
        result
    }

    pub(crate) fn create(&self, contract: &Contract, chain: &mut CallSiteChain) -> Result<Option<Arc<CallSite>>> {
        match contract {
            Contract::Single(key) => match self.registry.last(key) {
                Some(id) => self.create_for_descriptor(id, chain).map(Some),
                None if *key == ServiceKey::of::<ServiceScope>() => Ok(Some(Arc::new(CallSite::Scope))),
                None => Ok(None),
            },
            Contract::Collection(key) => {
                let ids = self.registry.all(key);
                if ids.is_empty() {
                    return Ok(Some(Arc::new(CallSite::EmptyEnumerable(*key))));
                }

                let items = ids
                    .iter()
                    .map(|id| self.create_for_descriptor(*id, chain))
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some(Arc::new(CallSite::Enumerable(EnumerableCallSite { key: *key, items }))))
            }
        }
    }

    fn create_for_descriptor(&self, id: DescriptorId, chain: &mut CallSiteChain) -> Result<Arc<CallSite>> {
        if let Some(site) = self.sites.get(&id) {
            return Ok(Arc::clone(site.value()));
        }

        let descriptor = self.registry.descriptor(id);
        chain.enter(descriptor.key)?;
        let built = self.create_uncached(id, chain);
        chain.leave(&descriptor.key);
        let site = built?;

        #[cfg(feature = "logging")]
        trace!(
            target: "tiered_injector",
            service = descriptor.key.type_name(),
            descriptor = id.index(),
            kind = site.kind(),
            lifetime = site.lifetime().as_str(),
            "Built call site"
        );

        // A racing builder may have stored its own copy first; keep that one.
        Ok(Arc::clone(self.sites.entry(id).or_insert(site).value()))
    }

    fn create_uncached(&self, id: DescriptorId, chain: &mut CallSiteChain) -> Result<Arc<CallSite>> {
        let descriptor = self.registry.descriptor(id);

        let site = match &descriptor.implementation {
            Implementation::Instance(instance) => {
                return Ok(Arc::new(CallSite::Constant(ConstantCallSite {
                    key: descriptor.key,
                    instance: Arc::clone(instance),
                })));
            }
            Implementation::Factory(factory) => CallSite::Factory(FactoryCallSite {
                key: descriptor.key,
                descriptor: id,
                factory: Arc::clone(factory),
                disposer: descriptor.disposer.clone(),
            }),
            Implementation::Activator(activator) => {
                let arguments = activator
                    .dependencies()
                    .iter()
                    .map(|dependency| self.create_argument(dependency, chain))
                    .collect::<Result<Vec<_>>>()?;

                CallSite::Constructor(ConstructorCallSite {
                    key: descriptor.key,
                    implementation_name: descriptor.implementation_name,
                    activator: Arc::clone(activator),
                    arguments,
                    disposer: descriptor.disposer.clone(),
                })
            }
        };

        let site = Arc::new(site);
        Ok(match descriptor.lifetime {
            Lifetime::Transient => site,
            lifetime => Arc::new(CallSite::Lifetime(LifetimeCallSite {
                lifetime,
                descriptor: id,
                inner: site,
            })),
        })
    }

    fn create_argument(&self, dependency: &Dependency, chain: &mut CallSiteChain) -> Result<Argument> {
        Ok(match dependency {
            Dependency::Required(key) => match self.create(&Contract::Single(*key), chain)? {
                Some(site) => Argument::Site(site),
                None => Argument::Missing(*key),
            },
            Dependency::Optional(key) => match self.create(&Contract::Single(*key), chain)? {
                Some(site) => Argument::Site(site),
                None => Argument::Absent,
            },
            Dependency::All(key) => match self.create(&Contract::Collection(*key), chain)? {
                Some(site) => Argument::Site(site),
                None => Argument::Absent,
            },
        })
    }
}
