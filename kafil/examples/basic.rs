//! Basic example of the Kafil container.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kafil::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

impl Dispose for Database {
    fn dispose(&self) -> std::result::Result<(), DisposeError> {
        self.logger.log("Closing database pool");
        Ok(())
    }
}

/// One per request; commits when its scope is torn down.
struct UnitOfWork {
    id: u64,
}

impl Dispose for UnitOfWork {
    fn dispose(&self) -> std::result::Result<(), DisposeError> {
        println!("[UOW] commit #{}", self.id);
        Ok(())
    }
}

struct UserService {
    db: Arc<Database>,
    uow: Arc<UnitOfWork>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        format!(
            "{} (uow #{})",
            self.db.query(&format!("SELECT * FROM users WHERE id = {id}")),
            self.uow.id
        )
    }
}

fn registrations() -> Vec<Registration> {
    let next_uow = Arc::new(AtomicU64::new(1));

    vec![
        // Config: pre-built value, owned by the caller
        Registration::instance(Arc::new(Config {
            database_url: "postgres://localhost/myapp".to_string(),
        })),
        // Logger: singleton behind a trait object
        Registration::factory::<dyn Logger, _>(Lifetime::Singleton, |_| {
            Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)
        }),
        // Database: singleton, disposed with the root
        Registration::bind::<Database>(
            Lifetime::Singleton,
            Implementation::disposable::<Database>().constructor(
                [Parameter::of::<Config>(), Parameter::of::<dyn Logger>()],
                |args| {
                    Ok(Database {
                        url: args.required::<Config>(0)?.database_url.clone(),
                        logger: args.required::<dyn Logger>(1)?,
                    })
                },
            ),
        ),
        // UnitOfWork: one per scope
        Registration::disposable_factory::<UnitOfWork, _>(Lifetime::Scoped, move |_| {
            Ok(Arc::new(UnitOfWork {
                id: next_uow.fetch_add(1, Ordering::SeqCst),
            }))
        }),
        // UserService: new each time
        Registration::bind::<UserService>(
            Lifetime::Transient,
            Implementation::of::<UserService>().constructor(
                [Parameter::of::<Database>(), Parameter::of::<UnitOfWork>()],
                |args| {
                    Ok(UserService {
                        db: args.required::<Database>(0)?,
                        uow: args.required::<UnitOfWork>(1)?,
                    })
                },
            ),
        ),
    ]
}

fn main() -> kafil::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("kafil_container=debug")
        .init();

    let container = Container::new(registrations())?;
    println!("✅ Container built successfully!");
    println!("{container:?}");

    // === One scope per request ===
    for request in 1..=2 {
        let scope = container.create_scope()?;

        let service = scope.resolve_required::<UserService>()?;
        println!("👤 request {request}: {}", service.get_user(42));

        // same scope, same unit of work
        let again = scope.resolve_required::<UserService>()?;
        println!("👤 request {request}: {}", again.get_user(7));
    }
    // each scope dropped here: its unit of work commits

    let report = container.dispose();
    println!("\n🎉 Released {} service(s)", report.released());
    Ok(())
}
