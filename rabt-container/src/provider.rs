//! Provider trait — a module of related registrations.
//!
//! Providers group related bindings together. Instead of one giant
//! registration block, split your services by domain and add each
//! provider with [`Container::add_provider`].
//!
//! [`Container::add_provider`]: crate::container::Container::add_provider

use crate::container::Container;
use crate::error::Result;

/// A module that registers related services into a container.
///
/// ```rust,ignore
/// struct LoggingProvider;
///
/// impl Provider for LoggingProvider {
///     fn register(&self, container: &Container) -> Result<()> {
///         container.register_class(console_logger_class());
///         container.bind_shared("logger", "ConsoleLogger")?;
///         container.alias("log", "logger")
///     }
/// }
/// ```
pub trait Provider: Send + Sync {
    /// Register services into the container. Called once when the
    /// provider is added.
    fn register(&self, container: &Container) -> Result<()>;

    /// Optional: human-readable name for error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::ClassInfo;
    use crate::value::Service;

    struct Widget;

    struct WidgetProvider;

    impl Provider for WidgetProvider {
        fn register(&self, container: &Container) -> Result<()> {
            container
                .register_class(ClassInfo::concrete("Widget").constructor(|_| {
                    Ok(Service::new("Widget", Widget))
                }));
            container.bind_shared("widget", "Widget")
        }
    }

    #[test]
    fn provider_registers_bindings() {
        let container = Container::new();
        container.add_provider(&WidgetProvider).unwrap();

        assert!(container.has("widget"));
        let widget = container.get("widget").unwrap();
        assert_eq!(widget.class(), "Widget");
    }

    #[test]
    fn provider_has_name() {
        assert!(WidgetProvider.name().contains("WidgetProvider"));
    }
}
