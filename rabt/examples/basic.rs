//! Basic example of the Rabt DI container.

use rabt::prelude::*;

// === Define your service types ===

struct ConsoleLogger;

impl ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct FileLogger;

impl FileLogger {
    fn log(&self, msg: &str) {
        println!("[FILE] {msg}");
    }
}

struct Database {
    url: String,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        format!("rows from {} for `{sql}`", self.url)
    }
}

struct UserService {
    db: Service,
    logger: Service,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        if let Some(logger) = self.logger.downcast_ref::<ConsoleLogger>() {
            logger.log(&format!("Getting user {id}"));
        }
        let db = self.db.downcast_ref::<Database>().expect("database");
        db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

struct AuditJob {
    logger: Service,
}

fn register_classes(container: &Container) {
    container.register_class(
        ClassInfo::concrete("ConsoleLogger")
            .implements("Logger")
            .constructor(|_| Ok(Service::new("ConsoleLogger", ConsoleLogger))),
    );
    container.register_class(
        ClassInfo::concrete("FileLogger")
            .implements("Logger")
            .constructor(|_| Ok(Service::new("FileLogger", FileLogger))),
    );
    container.register_class(
        ClassInfo::concrete("Database")
            .param(ParamInfo::builtin("url", "string").default_value("postgres://localhost/app"))
            .constructor(|mut args| {
                let url = args
                    .remove(0)
                    .as_str()
                    .unwrap_or("postgres://localhost/app")
                    .to_string();
                Ok(Service::new("Database", Database { url }))
            }),
    );
    container.register_class(
        ClassInfo::concrete("UserService")
            .param(ParamInfo::named("db", "db"))
            .param(ParamInfo::named("logger", "logger"))
            .constructor(|mut args| {
                let logger = args.remove(1).into_object().expect("logger service");
                let db = args.remove(0).into_object().expect("db service");
                Ok(Service::new("UserService", UserService { db, logger }))
            }),
    );
    container.register_class(
        ClassInfo::concrete("AuditJob")
            .param(ParamInfo::named("logger", "logger"))
            .constructor(|mut args| {
                let logger = args.remove(0).into_object().expect("logger service");
                Ok(Service::new("AuditJob", AuditJob { logger }))
            }),
    );
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("rabt=debug")
        .init();

    let container = Container::new();
    register_classes(&container);

    // Logger — shared; Database — shared; UserService — transient
    container.bind_shared("logger", "ConsoleLogger")?;
    container.bind_shared("db", "Database")?;
    container.bind_class("user_service", "UserService", false)?;
    container.alias("users", "user_service")?;

    // Audit jobs write to a file, everything else to the console.
    container.bind_class("audit", "AuditJob", false)?;
    container.when("AuditJob").needs("logger").give("FileLogger")?;

    println!("{container:?}");

    let service = container.get("users")?;
    let service = service.downcast_ref::<UserService>().expect("user service");
    println!("{}", service.get_user(42));

    let audit = container.get("audit")?;
    let audit = audit.downcast_ref::<AuditJob>().expect("audit job");
    println!(
        "audit logger is: {}",
        audit.logger.class()
    );

    // Temporarily swap the database inside a scope.
    container.scoped(
        vec![(
            "db".to_string(),
            ScopedBinding::Instance(Service::new(
                "Database",
                Database {
                    url: "sqlite://memory".to_string(),
                },
            )),
        )],
        |c| {
            let service = c.get("user_service")?;
            let service = service.downcast_ref::<UserService>().expect("user service");
            println!("{}", service.get_user(7));
            Ok(())
        },
    )?;

    // Compile the registry to a specialized resolver.
    let out = std::env::temp_dir().join("rabt-compiled-resolver.rs");
    let summary = container.compile(&out)?;
    println!(
        "compiled {}/{} bindings -> {} (fingerprint {})",
        summary.compiled_bindings,
        summary.total_bindings,
        summary.path.display(),
        &summary.fingerprint[..12],
    );

    Ok(())
}
