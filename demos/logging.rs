//! Example showing the events the engine emits
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! RUST_LOG=tiered_injector=trace cargo run --example logging --features logging-pretty
//! ```

use std::sync::Arc;
use tiered_injector::{BoxError, ContainerOptions, Dispose, ImmediateScheduler, ServiceCollection};

struct Database {
    url: String,
}

struct UserService {
    db: Arc<Database>,
}

struct RequestContext {
    request_id: u64,
}

impl Dispose for RequestContext {
    fn dispose(&self) -> Result<(), BoxError> {
        println!("  [App] Closing request {}", self.request_id);
        Ok(())
    }
}

struct Broken;

fn main() {
    // JSON if logging-json is enabled, pretty if logging-pretty is enabled
    tiered_injector::logging::init();

    println!("=== Tiered Injector Logging Demo ===\n");

    // Registrations (logs: "Registering service")
    let mut services = ServiceCollection::new();
    services.singleton(|()| {
        Arc::new(Database {
            url: "postgres://localhost/mydb".into(),
        })
    });
    services.transient(|db: Arc<Database>| Arc::new(UserService { db }));
    services
        .scoped_factory(|scope| Ok(Arc::new(RequestContext { request_id: scope.id().id() })))
        .disposable();
    services.transient(|_missing: Arc<String>| Arc::new(Broken));

    // Build (logs: "Building container", "Created root scope")
    let container = services
        .build_with(ContainerOptions::new().scheduler(Arc::new(ImmediateScheduler)))
        .unwrap();

    // First resolutions build call sites (trace: "Built call site", "Executing resolver")
    for _ in 0..3 {
        let users = container.resolve_required::<UserService>().unwrap();
        println!("  [App] UserService bound to {}", users.db.url);
    }
    // The second call scheduled compilation (logs: "Installed compiled resolver")

    // Child scope (logs: "Created child scope")
    let request = container.create_scope().unwrap();
    let ctx = request.resolve_required::<RequestContext>().unwrap();
    println!("  [App] Handling request {}", ctx.request_id);

    // Missing dependency surfaces at activation
    if let Err(err) = container.resolve::<Broken>() {
        println!("  [App] Expected failure: {err}");
    }

    // Dispose (logs: "Disposed scope")
    request.dispose().unwrap();

    println!("\n=== Demo Complete ===");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
