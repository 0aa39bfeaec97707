#![no_main]

//! Fuzz target for concurrent resolution
//!
//! Threads share a container and a set of scopes while the tiered resolver
//! promotes call sites in the background. Singletons must stay unique and
//! scoped instances must be shared within a scope.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tiered_injector::{BackgroundScheduler, ContainerOptions, DiError, ServiceCollection};

static CONFIGS: AtomicUsize = AtomicUsize::new(0);

struct SharedConfig {
    value: u32,
}

struct Session {
    config: Arc<SharedConfig>,
}

struct Handler {
    session: Arc<Session>,
    plugins: Vec<Arc<Plugin>>,
}

struct Plugin(u8);

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    Config,
    Handler { scope: u8 },
    Plugins { scope: u8 },
    Contains,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Clamped to 1-8
    thread_count: u8,
    scope_count: u8,
    plugins: u8,
    threshold: u8,
    ops_per_thread: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let plugin_count = scenario.plugins % 5;

    let mut services = ServiceCollection::new();
    services.singleton(|()| {
        CONFIGS.fetch_add(1, Ordering::SeqCst);
        Arc::new(SharedConfig { value: 42 })
    });
    services.scoped(|config: Arc<SharedConfig>| Arc::new(Session { config }));
    services.transient(|(session, plugins): (Arc<Session>, Vec<Arc<Plugin>>)| {
        Arc::new(Handler { session, plugins })
    });
    for id in 0..plugin_count {
        services.transient(move |()| Arc::new(Plugin(id)));
    }

    let container = Arc::new(
        services
            .build_with(
                ContainerOptions::new()
                    .compilation_threshold(scenario.threshold as usize % 4)
                    .scheduler(Arc::new(BackgroundScheduler::new())),
            )
            .unwrap(),
    );
    let before = CONFIGS.load(Ordering::SeqCst);

    let scopes: Arc<Vec<_>> = Arc::new(
        (0..(scenario.scope_count % 4).max(1))
            .map(|_| container.create_scope().unwrap())
            .collect(),
    );

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let container = Arc::clone(&container);
            let scopes = Arc::clone(&scopes);
            let ops = ops.clone();

            thread::spawn(move || {
                let mut config: Option<Arc<SharedConfig>> = None;
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::Config => {
                            let resolved = container.resolve_required::<SharedConfig>().unwrap();
                            assert_eq!(resolved.value, 42);
                            if let Some(previous) = &config {
                                assert!(Arc::ptr_eq(previous, &resolved));
                            }
                            config = Some(resolved);
                        }
                        ThreadOp::Handler { scope } => {
                            let scope = &scopes[scope as usize % scopes.len()];
                            let a = scope.resolve_required::<Handler>().unwrap();
                            let b = scope.resolve_required::<Handler>().unwrap();
                            assert!(!Arc::ptr_eq(&a, &b));
                            assert!(Arc::ptr_eq(&a.session, &b.session));
                            assert!(Arc::ptr_eq(&a.session.config, &b.session.config));
                            assert_eq!(a.plugins.len(), plugin_count as usize);
                        }
                        ThreadOp::Plugins { scope } => {
                            let scope = &scopes[scope as usize % scopes.len()];
                            let plugins = scope.resolve_all::<Plugin>().unwrap();
                            let ids: Vec<u8> = plugins.iter().map(|p| p.0).collect();
                            assert_eq!(ids, (0..plugin_count).collect::<Vec<_>>());
                        }
                        ThreadOp::Contains => {
                            assert!(container.contains::<SharedConfig>());
                            assert!(!container.contains::<String>());
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // The singleton is built at most once per container
    assert!(CONFIGS.load(Ordering::SeqCst) - before <= 1);

    for scope in scopes.iter() {
        scope.dispose().unwrap();
        assert!(matches!(
            scope.resolve::<Session>(),
            Err(DiError::ObjectDisposed { .. })
        ));
    }
});
