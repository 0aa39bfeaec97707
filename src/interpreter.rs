//! Interpreting executor
//!
//! Walks a call-site tree on every resolution. Cheap to start, so every contract
//! begins here before it is promoted to a compiled resolver.

use crate::activator::{Activator, Arguments};
use crate::call_site::{Argument, CallSite};
use crate::contract::{Instance, ServiceKey, ServiceList, erase};
use crate::descriptor::FactoryFn;
use crate::disposal::Disposer;
use crate::error::{DiError, Result};
use crate::registry::DescriptorId;
use crate::scope::{ServiceScope, constructing};
use std::sync::Arc;

/// Executes call sites by walking them.
pub(crate) struct CallSiteRuntimeResolver;

impl CallSiteRuntimeResolver {
    pub(crate) fn resolve(site: &CallSite, scope: &ServiceScope) -> Result<Instance> {
        match site {
            CallSite::Constructor(ctor) => {
                let mut values = Vec::with_capacity(ctor.arguments.len());
                for argument in &ctor.arguments {
                    values.push(match argument {
                        Argument::Site(site) => Some(Self::resolve(site, scope)?),
                        Argument::Absent => None,
                        Argument::Missing(key) => return Err(missing(*key, ctor.implementation_name)),
                    });
                }
                activate(
                    ctor.activator.as_ref(),
                    ctor.implementation_name,
                    ctor.disposer.as_ref(),
                    values,
                    scope,
                )
            }
            CallSite::Factory(factory) => produce(
                factory.descriptor,
                factory.key,
                &factory.factory,
                factory.disposer.as_ref(),
                scope,
            ),
            CallSite::Constant(constant) => Ok(Arc::clone(&constant.instance)),
            CallSite::Enumerable(enumerable) => {
                let items = enumerable
                    .items
                    .iter()
                    .map(|item| Self::resolve(item, scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(list(items))
            }
            CallSite::EmptyEnumerable(_) => Ok(list(Vec::new())),
            CallSite::Scope => Ok(erase(Arc::new(scope.clone()))),
            CallSite::Lifetime(cached) => scope.cached(cached.lifetime, cached.descriptor, cached.inner.key(), |owner| {
                Self::resolve(&cached.inner, owner)
            }),
        }
    }
}

// Helpers shared with the compiled executor so both produce identical results.

pub(crate) fn missing(key: ServiceKey, requested_by: &'static str) -> DiError {
    DiError::MissingDependency {
        type_name: key.type_name(),
        requested_by,
    }
}

pub(crate) fn activate(
    activator: &dyn Activator,
    requester: &'static str,
    disposer: Option<&Disposer>,
    values: Vec<Option<Instance>>,
    scope: &ServiceScope,
) -> Result<Instance> {
    let instance = activator.activate(Arguments::new(values, requester))?;
    track(instance, disposer, scope)
}

/// Run a user factory. Re-entering the same factory on this thread fails with
/// `CircularDependency`.
pub(crate) fn produce(
    descriptor: DescriptorId,
    key: ServiceKey,
    factory: &FactoryFn,
    disposer: Option<&Disposer>,
    scope: &ServiceScope,
) -> Result<Instance> {
    let instance = constructing(None, descriptor, key, || factory(scope))?;
    track(instance, disposer, scope)
}

pub(crate) fn track(instance: Instance, disposer: Option<&Disposer>, scope: &ServiceScope) -> Result<Instance> {
    scope.capture(&instance, disposer)?;
    Ok(instance)
}

pub(crate) fn list(items: Vec<Instance>) -> Instance {
    erase(Arc::new(ServiceList(items)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Contract, downcast, downcast_list};
    use crate::{ContainerOptions, ResolverMode, ServiceCollection};

    struct Config(u32);
    struct Service {
        config: Arc<Config>,
    }
    struct Plugin(u8);

    fn site_for(scope: &ServiceScope, contract: Contract) -> Arc<CallSite> {
        scope.engine().call_site(&contract).unwrap().unwrap()
    }

    #[test]
    fn test_interprets_constructor_graph() {
        let mut services = ServiceCollection::new();
        services.singleton(|()| Arc::new(Config(42)));
        services.transient(|config: Arc<Config>| Arc::new(Service { config }));
        let container = services
            .build_with(ContainerOptions::new().mode(ResolverMode::Interpreted))
            .unwrap();

        let site = site_for(&container, Contract::single::<Service>());
        let first = CallSiteRuntimeResolver::resolve(&site, &container).unwrap();
        let second = CallSiteRuntimeResolver::resolve(&site, &container).unwrap();

        let first = downcast::<Service>(&first).unwrap();
        let second = downcast::<Service>(&second).unwrap();
        assert_eq!(first.config.0, 42);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.config, &second.config));
    }

    #[test]
    fn test_interprets_collection_in_order() {
        let mut services = ServiceCollection::new();
        services.transient(|()| Arc::new(Plugin(1)));
        services.transient(|()| Arc::new(Plugin(2)));
        let container = services.build().unwrap();

        let site = site_for(&container, Contract::collection::<Plugin>());
        let all = CallSiteRuntimeResolver::resolve(&site, &container).unwrap();
        let ids: Vec<u8> = downcast_list::<Plugin>(&all).unwrap().iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_missing_required_dependency_fails_at_activation() {
        let mut services = ServiceCollection::new();
        services.transient(|config: Arc<Config>| Arc::new(Service { config }));
        let container = services.build().unwrap();

        let site = site_for(&container, Contract::single::<Service>());
        let err = CallSiteRuntimeResolver::resolve(&site, &container).unwrap_err();
        assert!(matches!(err, DiError::MissingDependency { .. }));
    }
}
