//! Per-request scopes in a simulated server
//!
//! ```bash
//! cargo run --example request_scope
//! ```
//!
//! Each worker thread opens a scope per request. The connection pool is a
//! container-wide singleton, the unit of work lives for one request and is
//! disposed when the request's scope ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tiered_injector::{BoxError, ContainerOptions, Dispose, ServiceCollection};

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct TickClock(AtomicU64);

impl Clock for TickClock {
    fn now(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

struct ConnectionPool {
    opened: AtomicU64,
}

impl ConnectionPool {
    fn checkout(&self) -> u64 {
        self.opened.fetch_add(1, Ordering::Relaxed)
    }
}

/// Lives for one request
struct UnitOfWork {
    connection: u64,
    started: u64,
}

impl Dispose for UnitOfWork {
    fn dispose(&self) -> Result<(), BoxError> {
        println!("    commit connection #{} (started at tick {})", self.connection, self.started);
        Ok(())
    }
}

/// Created per use; shares the request's unit of work
struct OrderHandler {
    work: Arc<UnitOfWork>,
}

impl OrderHandler {
    fn handle(&self, order: u32) -> String {
        format!("order {order} on connection #{}", self.work.connection)
    }
}

fn main() {
    let mut services = ServiceCollection::new();
    services.singleton(|()| -> Arc<dyn Clock> { Arc::new(TickClock(AtomicU64::new(0))) });
    services.singleton(|()| {
        Arc::new(ConnectionPool {
            opened: AtomicU64::new(1),
        })
    });
    services
        .scoped(|(pool, clock): (Arc<ConnectionPool>, Arc<dyn Clock>)| {
            Arc::new(UnitOfWork {
                connection: pool.checkout(),
                started: clock.now(),
            })
        })
        .disposable();
    services.transient(|work: Arc<UnitOfWork>| Arc::new(OrderHandler { work }));

    let container = services
        .build_with(ContainerOptions::new().validate_scopes(true).validate_on_build(true))
        .expect("registrations are valid");

    std::thread::scope(|s| {
        for worker in 0..3 {
            let container = &container;
            s.spawn(move || {
                for request in 0..2 {
                    let scope = container.create_scope().expect("container is alive");
                    for order in 0..2 {
                        let handler = scope.resolve_required::<OrderHandler>().expect("handler resolves");
                        println!("worker {worker} request {request}: {}", handler.handle(order));
                    }
                    scope.dispose().expect("disposal succeeds");
                }
            });
        }
    });

    let pool = container.resolve_required::<ConnectionPool>().expect("pool resolves");
    println!("connections opened: {}", pool.opened.load(Ordering::Relaxed) - 1);
}
