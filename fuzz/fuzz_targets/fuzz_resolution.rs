#![no_main]

//! Fuzz target for lifetimes across scopes
//!
//! Registers a small acyclic graph with fuzzed lifetimes, then runs random
//! scope/resolve/dispose sequences and checks the lifetime guarantees.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tiered_injector::{
    BoxError, ContainerOptions, DiError, Dispose, ImmediateScheduler, Lifetime, ServiceCollection,
    ServiceDescriptor, ServiceScope,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

struct Leaf {
    id: u64,
}

impl Dispose for Leaf {
    fn dispose(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

struct Middle {
    leaf: Arc<Leaf>,
}

struct Top {
    middle: Arc<Middle>,
    leaf: Arc<Leaf>,
    extras: Vec<Arc<Leaf>>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzLifetime {
    Singleton,
    Scoped,
    Transient,
}

impl From<FuzzLifetime> for Lifetime {
    fn from(value: FuzzLifetime) -> Self {
        match value {
            FuzzLifetime::Singleton => Lifetime::Singleton,
            FuzzLifetime::Scoped => Lifetime::Scoped,
            FuzzLifetime::Transient => Lifetime::Transient,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    CreateScope,
    Resolve { scope: u8, top: bool },
    ResolveAll { scope: u8 },
    Dispose { scope: u8 },
    Drop { scope: u8 },
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    leaf: FuzzLifetime,
    middle: FuzzLifetime,
    top: FuzzLifetime,
    extra_leaves: u8,
    interpreted_only: bool,
    ops: Vec<Op>,
}

struct Tracked {
    scope: ServiceScope,
    leaf: Option<u64>,
}

fuzz_target!(|scenario: Scenario| {
    let leaf_lifetime = Lifetime::from(scenario.leaf);
    // A singleton Middle captures the root's scoped Leaf unless Top is built at the root too
    let shares_leaf = match scenario.leaf {
        FuzzLifetime::Singleton => true,
        FuzzLifetime::Scoped => {
            !matches!(scenario.middle, FuzzLifetime::Singleton) || matches!(scenario.top, FuzzLifetime::Singleton)
        }
        FuzzLifetime::Transient => false,
    };

    let mut services = ServiceCollection::new();
    for _ in 0..scenario.extra_leaves % 3 {
        services.add(
            ServiceDescriptor::constructor(leaf_lifetime, |()| {
                Arc::new(Leaf {
                    id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                })
            })
            .disposable::<Leaf>(),
        );
    }
    services.add(
        ServiceDescriptor::constructor(leaf_lifetime, |()| {
            Arc::new(Leaf {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            })
        })
        .disposable::<Leaf>(),
    );
    services.add(ServiceDescriptor::constructor(scenario.middle.into(), |leaf: Arc<Leaf>| {
        Arc::new(Middle { leaf })
    }));
    services.add(ServiceDescriptor::constructor(
        scenario.top.into(),
        |(middle, leaf, extras): (Arc<Middle>, Arc<Leaf>, Vec<Arc<Leaf>>)| Arc::new(Top { middle, leaf, extras }),
    ));

    let mut options = ContainerOptions::new().scheduler(Arc::new(ImmediateScheduler));
    if scenario.interpreted_only {
        options = options.mode(tiered_injector::ResolverMode::Interpreted);
    }
    let container = services.build_with(options).unwrap();

    let mut scopes = vec![Tracked {
        scope: container.root().clone(),
        leaf: None,
    }];
    let mut singleton_leaf: Option<u64> = None;

    for op in scenario.ops.into_iter().take(64) {
        match op {
            Op::CreateScope => match container.create_scope() {
                Ok(scope) => scopes.push(Tracked { scope, leaf: None }),
                Err(err) => assert!(matches!(err, DiError::ObjectDisposed { .. })),
            },
            Op::Resolve { scope, top } => {
                let index = scope as usize % scopes.len();
                let tracked = &mut scopes[index];
                let root_disposed = container.is_disposed();

                let leaf = if top {
                    tracked.scope.resolve_required::<Top>().map(|top| {
                        assert_eq!(top.extras.len(), (scenario.extra_leaves % 3) as usize + 1);
                        if shares_leaf {
                            assert!(Arc::ptr_eq(&top.leaf, &top.middle.leaf));
                        }
                        None
                    })
                } else {
                    tracked.scope.resolve_required::<Leaf>().map(|leaf| Some(leaf.id))
                };

                match leaf {
                    Ok(Some(id)) => match leaf_lifetime {
                        Lifetime::Singleton => assert_eq!(*singleton_leaf.get_or_insert(id), id),
                        Lifetime::Scoped => assert_eq!(*tracked.leaf.get_or_insert(id), id),
                        Lifetime::Transient => {
                            assert_ne!(tracked.leaf.replace(id), Some(id));
                        }
                    },
                    Ok(None) => {}
                    Err(DiError::ObjectDisposed { .. }) => {
                        assert!(tracked.scope.is_disposed() || root_disposed);
                    }
                    Err(err) => panic!("acyclic graph failed to resolve: {err}"),
                }
            }
            Op::ResolveAll { scope } => {
                let index = scope as usize % scopes.len();
                let tracked = &scopes[index];
                match tracked.scope.resolve_all::<Leaf>() {
                    Ok(all) => assert_eq!(all.len(), (scenario.extra_leaves % 3) as usize + 1),
                    Err(err) => assert!(matches!(err, DiError::ObjectDisposed { .. })),
                }
            }
            Op::Dispose { scope } => {
                let index = scope as usize % scopes.len();
                scopes[index].scope.dispose().unwrap();
                assert!(scopes[index].scope.is_disposed());
            }
            Op::Drop { scope } => {
                // Keep the root handle
                if scopes.len() > 1 {
                    let index = 1 + scope as usize % (scopes.len() - 1);
                    scopes.swap_remove(index);
                }
            }
        }
    }
});
