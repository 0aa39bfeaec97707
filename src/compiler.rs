//! Compiling executor
//!
//! Lowers a call-site tree into nested closures once, so later resolutions run
//! straight-line code instead of matching on sites. Sites shared within one tree
//! (a diamond dependency, say) compile to one shared closure.

use crate::call_site::{Argument, CallSite};
use crate::contract::{Instance, ServiceKey, erase};
use crate::error::Result;
use crate::interpreter::{activate, list, missing, produce};
use crate::scope::ServiceScope;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// A compiled resolver for one call-site tree.
pub(crate) type CompiledFn = Arc<dyn Fn(&ServiceScope) -> Result<Instance> + Send + Sync>;

enum CompiledArgument {
    Site(CompiledFn),
    Absent,
    Missing(ServiceKey),
}

/// Lowers call sites into [`CompiledFn`]s.
pub(crate) struct CallSiteCompiler {
    compiled: HashMap<usize, CompiledFn, RandomState>,
}

impl CallSiteCompiler {
    pub(crate) fn compile(site: &Arc<CallSite>) -> CompiledFn {
        let mut compiler = Self {
            compiled: HashMap::default(),
        };
        compiler.lower(site)
    }

    fn lower(&mut self, site: &Arc<CallSite>) -> CompiledFn {
        // Sites are immutable and outlive compilation, so identity is the address.
        let identity = Arc::as_ptr(site) as usize;
        if let Some(compiled) = self.compiled.get(&identity) {
            return Arc::clone(compiled);
        }

        let compiled = self.lower_uncached(site);
        self.compiled.insert(identity, Arc::clone(&compiled));
        compiled
    }

    fn lower_uncached(&mut self, site: &Arc<CallSite>) -> CompiledFn {
        match &**site {
            CallSite::Constructor(ctor) => {
                let arguments: Vec<CompiledArgument> = ctor
                    .arguments
                    .iter()
                    .map(|argument| match argument {
                        Argument::Site(inner) => CompiledArgument::Site(self.lower(inner)),
                        Argument::Absent => CompiledArgument::Absent,
                        Argument::Missing(key) => CompiledArgument::Missing(*key),
                    })
                    .collect();

                let activator = Arc::clone(&ctor.activator);
                let requester = ctor.implementation_name;
                let disposer = ctor.disposer.clone();
                Arc::new(move |scope: &ServiceScope| -> Result<Instance> {
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in &arguments {
                        values.push(match argument {
                            CompiledArgument::Site(resolve) => Some(resolve(scope)?),
                            CompiledArgument::Absent => None,
                            CompiledArgument::Missing(key) => return Err(missing(*key, requester)),
                        });
                    }
                    activate(activator.as_ref(), requester, disposer.as_ref(), values, scope)
                })
            }
            CallSite::Factory(factory) => {
                let create = Arc::clone(&factory.factory);
                let disposer = factory.disposer.clone();
                let descriptor = factory.descriptor;
                let key = factory.key;
                Arc::new(move |scope: &ServiceScope| produce(descriptor, key, &create, disposer.as_ref(), scope))
            }
            CallSite::Constant(constant) => {
                let instance = Arc::clone(&constant.instance);
                Arc::new(move |_: &ServiceScope| -> Result<Instance> { Ok(Arc::clone(&instance)) })
            }
            CallSite::Enumerable(enumerable) => {
                let items: Vec<CompiledFn> = enumerable.items.iter().map(|item| self.lower(item)).collect();
                Arc::new(move |scope: &ServiceScope| {
                    items
                        .iter()
                        .map(|resolve| resolve(scope))
                        .collect::<Result<Vec<_>>>()
                        .map(list)
                })
            }
            CallSite::EmptyEnumerable(_) => Arc::new(|_: &ServiceScope| -> Result<Instance> { Ok(list(Vec::new())) }),
            CallSite::Scope => Arc::new(|scope: &ServiceScope| -> Result<Instance> { Ok(erase(Arc::new(scope.clone()))) }),
            CallSite::Lifetime(cached) => {
                let inner = self.lower(&cached.inner);
                let lifetime = cached.lifetime;
                let descriptor = cached.descriptor;
                let key = cached.inner.key();
                Arc::new(move |scope: &ServiceScope| scope.cached(lifetime, descriptor, key, |owner| inner(owner)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Contract, downcast, downcast_list};
    use crate::interpreter::CallSiteRuntimeResolver;
    use crate::{BoxError, DiError, Dispose, Lifetime, ServiceCollection};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Leaf;
    struct Left(Arc<Leaf>);
    struct Right(Arc<Leaf>);
    struct Root(Arc<Left>, Arc<Right>);
    struct Plugin(u8);

    fn site_for(scope: &ServiceScope, contract: Contract) -> Arc<CallSite> {
        scope.engine().call_site(&contract).unwrap().unwrap()
    }

    #[test]
    fn test_compiled_matches_interpreted_lifetimes() {
        let mut services = ServiceCollection::new();
        services.scoped(|()| Arc::new(Leaf));
        services.transient(|leaf: Arc<Leaf>| Arc::new(Left(leaf)));
        services.transient(|leaf: Arc<Leaf>| Arc::new(Right(leaf)));
        services.transient(|(l, r): (Arc<Left>, Arc<Right>)| Arc::new(Root(l, r)));
        let container = services.build().unwrap();
        let scope = container.create_scope().unwrap();

        let site = site_for(&scope, Contract::single::<Root>());
        let compiled = CallSiteCompiler::compile(&site);

        let by_compiler = downcast::<Root>(&compiled(&scope).unwrap()).unwrap();
        let by_interpreter = downcast::<Root>(&CallSiteRuntimeResolver::resolve(&site, &scope).unwrap()).unwrap();

        assert!(Arc::ptr_eq(&by_compiler.0.0, &by_compiler.1.0));
        assert!(Arc::ptr_eq(&by_compiler.0.0, &by_interpreter.0.0));
        assert!(!Arc::ptr_eq(&by_compiler.0, &by_interpreter.0));
    }

    #[test]
    fn test_shared_sites_compile_once() {
        let mut services = ServiceCollection::new();
        services.scoped(|()| Arc::new(Leaf));
        services.transient(|leaf: Arc<Leaf>| Arc::new(Left(leaf)));
        services.transient(|leaf: Arc<Leaf>| Arc::new(Right(leaf)));
        services.transient(|(l, r): (Arc<Left>, Arc<Right>)| Arc::new(Root(l, r)));
        let container = services.build().unwrap();

        let site = site_for(&container, Contract::single::<Root>());
        let mut compiler = CallSiteCompiler {
            compiled: HashMap::default(),
        };
        compiler.lower(&site);

        // Root, Left, Right, the Leaf lifetime wrapper and its inner constructor
        assert_eq!(compiler.compiled.len(), 5);
    }

    #[test]
    fn test_compiled_collection_and_missing_dependency() {
        let mut services = ServiceCollection::new();
        services.transient(|()| Arc::new(Plugin(1)));
        services.transient(|()| Arc::new(Plugin(2)));
        services.transient(|leaf: Arc<Leaf>| Arc::new(Left(leaf)));
        let container = services.build().unwrap();

        let plugins = CallSiteCompiler::compile(&site_for(&container, Contract::collection::<Plugin>()));
        let ids: Vec<u8> = downcast_list::<Plugin>(&plugins(&container).unwrap())
            .unwrap()
            .iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        let left = CallSiteCompiler::compile(&site_for(&container, Contract::single::<Left>()));
        assert!(matches!(left(&container), Err(DiError::MissingDependency { .. })));
    }

    struct Handle {
        ordinal: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl Dispose for Handle {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.log.lock().unwrap().push(self.ordinal);
            Ok(())
        }
    }

    #[test]
    fn test_compiled_transients_are_tracked_and_disposed_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let next = Arc::new(AtomicUsize::new(0));

        let mut services = ServiceCollection::new();
        let (l, n) = (Arc::clone(&log), Arc::clone(&next));
        services
            .transient(move |()| {
                Arc::new(Handle {
                    ordinal: n.fetch_add(1, Ordering::SeqCst),
                    log: Arc::clone(&l),
                })
            })
            .disposable();
        let container = services.build().unwrap();
        let scope = container.create_scope().unwrap();

        let handle = CallSiteCompiler::compile(&site_for(&scope, Contract::single::<Handle>()));
        let first = downcast::<Handle>(&handle(&scope).unwrap()).unwrap();
        let second = downcast::<Handle>(&handle(&scope).unwrap()).unwrap();
        assert_eq!((first.ordinal, second.ordinal), (0, 1));
        assert_eq!(scope.tracked_disposables(), 2);
        assert_eq!(container.tracked_disposables(), 0);

        scope.dispose().unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_compiled_factory_is_tracked_and_guarded() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut services = ServiceCollection::new();
        let l = Arc::clone(&log);
        services
            .factory(Lifetime::Transient, move |_: &ServiceScope| {
                Ok(Arc::new(Handle {
                    ordinal: 7,
                    log: Arc::clone(&l),
                }))
            })
            .disposable();
        services.transient_factory(|scope: &ServiceScope| -> std::result::Result<Arc<Leaf>, BoxError> {
            let _again = scope.resolve_required::<Leaf>()?;
            Ok(Arc::new(Leaf))
        });
        let container = services.build().unwrap();
        let scope = container.create_scope().unwrap();

        let handle = CallSiteCompiler::compile(&site_for(&scope, Contract::single::<Handle>()));
        handle(&scope).unwrap();
        assert_eq!(scope.tracked_disposables(), 1);
        scope.dispose().unwrap();
        assert_eq!(*log.lock().unwrap(), vec![7]);

        let leaf = CallSiteCompiler::compile(&site_for(&container, Contract::single::<Leaf>()));
        assert!(matches!(leaf(&container), Err(DiError::CircularDependency { .. })));
    }
}
