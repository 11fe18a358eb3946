//! # Rabt — Dependency Injection Container for Rust
//!
//! ربط — "The Binding"
//!
//! A runtime IoC container with string identifiers, contextual
//! bindings, tagged collections, decorator chains, scoped overrides,
//! and an ahead-of-time compiler.
//!
//! # Quick Start
//! ```rust,ignore
//! use rabt::prelude::*;
//!
//! struct ConsoleLogger;
//!
//! let container = Container::new();
//! container.register_class(
//!     ClassInfo::concrete("ConsoleLogger")
//!         .implements("Logger")
//!         .constructor(|_| Ok(Service::new("ConsoleLogger", ConsoleLogger))),
//! );
//! container.bind_shared("logger", "ConsoleLogger")?;
//!
//! let logger = container.get("logger")?;
//! assert_eq!(logger.class(), "ConsoleLogger");
//! ```

pub use rabt_container::*;
pub use rabt_container::container::prelude::*;
pub use rabt_support::rendering;
