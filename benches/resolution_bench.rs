//! Benchmarks for the resolution engine

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tiered_injector::{Container, ContainerOptions, ImmediateScheduler, ResolverMode, ServiceCollection};

trait Logger: Send + Sync {
    fn level(&self) -> u8;
}

struct NullLogger;

impl Logger for NullLogger {
    fn level(&self) -> u8 {
        0
    }
}

#[allow(dead_code)]
struct Config {
    retries: u32,
}

#[allow(dead_code)]
struct Repository {
    logger: Arc<dyn Logger>,
    config: Arc<Config>,
}

#[allow(dead_code)]
struct Service {
    repository: Arc<Repository>,
    logger: Arc<dyn Logger>,
}

#[allow(dead_code)]
struct Controller {
    service: Arc<Service>,
    config: Arc<Config>,
}

#[allow(dead_code)]
struct Plugin(u32);

fn services() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services.singleton(|()| -> Arc<dyn Logger> { Arc::new(NullLogger) });
    services.singleton(|()| Arc::new(Config { retries: 3 }));
    services.scoped(|(logger, config): (Arc<dyn Logger>, Arc<Config>)| Arc::new(Repository { logger, config }));
    services.transient(|(repository, logger): (Arc<Repository>, Arc<dyn Logger>)| {
        Arc::new(Service { repository, logger })
    });
    services.transient(|(service, config): (Arc<Service>, Arc<Config>)| Arc::new(Controller { service, config }));
    for id in 0..8 {
        services.transient(move |()| Arc::new(Plugin(id)));
    }
    services
}

fn container(mode: ResolverMode) -> Container {
    let container = services()
        .build_with(
            ContainerOptions::new()
                .mode(mode)
                .scheduler(Arc::new(ImmediateScheduler)),
        )
        .unwrap();

    // Warm up past the compilation threshold
    let scope = container.create_scope().unwrap();
    for _ in 0..4 {
        scope.resolve_required::<Controller>().unwrap();
        scope.resolve_all::<Plugin>().unwrap();
        container.resolve_required::<dyn Logger>().unwrap();
    }
    container
}

const MODES: [(&str, ResolverMode); 2] = [("interpreted", ResolverMode::Interpreted), ("tiered", ResolverMode::Tiered)];

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    group.bench_function("collection_and_container", |b| {
        b.iter(|| black_box(services().build().unwrap()))
    });

    group.bench_function("validate_on_build", |b| {
        b.iter(|| {
            black_box(
                services()
                    .build_with(ContainerOptions::new().validate_on_build(true).validate_scopes(true))
                    .unwrap(),
            )
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    for (name, mode) in MODES {
        let container = container(mode);
        let scope = container.create_scope().unwrap();

        group.bench_with_input(BenchmarkId::new("singleton", name), &container, |b, container| {
            b.iter(|| black_box(container.resolve_required::<dyn Logger>().unwrap().level()))
        });

        group.bench_with_input(BenchmarkId::new("transient_graph", name), &scope, |b, scope| {
            b.iter(|| black_box(scope.resolve_required::<Controller>().unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("collection_8", name), &scope, |b, scope| {
            b.iter(|| black_box(scope.resolve_all::<Plugin>().unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("not_registered", name), &container, |b, container| {
            b.iter(|| black_box(container.resolve::<String>().unwrap()))
        });
    }

    group.finish();
}

fn bench_scopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("scopes");
    let container = container(ResolverMode::Tiered);

    group.bench_function("create_dispose", |b| {
        b.iter(|| {
            let scope = container.create_scope().unwrap();
            scope.dispose().unwrap();
            black_box(scope)
        })
    });

    group.bench_function("create_resolve_dispose", |b| {
        b.iter(|| {
            let scope = container.create_scope().unwrap();
            black_box(scope.resolve_required::<Controller>().unwrap());
            scope.dispose().unwrap();
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    let container = Arc::new(container(ResolverMode::Tiered));

    group.bench_function("scoped_requests_4", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = Arc::clone(&container);
                    thread::spawn(move || {
                        let scope = c.create_scope().unwrap();
                        for _ in 0..100 {
                            let _ = scope.resolve_required::<Controller>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_resolution, bench_scopes, bench_concurrent);

criterion_main!(benches);
