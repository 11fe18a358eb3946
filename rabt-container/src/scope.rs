//! Scoped (temporary) bindings with guaranteed restoration.
//!
//! `scoped` snapshots the registry state for every affected
//! identifier, applies the overrides, runs the callback, and restores
//! the snapshot on every exit path — normal return, error, and panic.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::registry::{Binding, BindingRegistry, FactoryFn};
use crate::value::{Service, Value};

/// A temporary binding applied inside a `scoped` call.
pub enum ScopedBinding {
    /// Closure: bound as a non-shared factory.
    Factory(FactoryFn),
    /// Class name: bound as a non-shared class binding.
    Class(String),
    /// Object: stored directly in the instance cache.
    Instance(Service),
    /// Untyped payload: strings bind, objects store, anything else is
    /// an `InvalidBinding` error.
    Raw(Value),
}

impl ScopedBinding {
    pub fn factory(
        f: impl Fn(&dyn crate::registry::Resolver) -> crate::error::Result<Service>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        ScopedBinding::Factory(Arc::new(f))
    }
}

impl fmt::Debug for ScopedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopedBinding::Factory(_) => write!(f, "ScopedBinding(factory)"),
            ScopedBinding::Class(c) => write!(f, "ScopedBinding(class:{c})"),
            ScopedBinding::Instance(s) => write!(f, "ScopedBinding(instance:{})", s.class()),
            ScopedBinding::Raw(v) => write!(f, "ScopedBinding(raw:{})", v.type_label()),
        }
    }
}

/// Saved state for one identifier affected by a scope.
struct RestoreEntry {
    id: String,
    binding: Option<Binding>,
    instance: Option<Service>,
    /// Aliases that targeted the identifier before the scope; re-bind
    /// drops them, restoration puts them back.
    aliases: Vec<String>,
}

/// Snapshot of every identifier a scope touches.
pub struct RestoreFrame {
    entries: Vec<RestoreEntry>,
}

impl RestoreFrame {
    /// Captures the current registry state for `ids`.
    pub fn capture(registry: &BindingRegistry, ids: &[&str]) -> Self {
        let entries = ids
            .iter()
            .map(|&id| RestoreEntry {
                id: id.to_string(),
                binding: registry.binding(id),
                instance: registry.cached(id),
                aliases: registry.aliases_of(id),
            })
            .collect();
        Self { entries }
    }

    fn restore(&self, registry: &BindingRegistry) {
        for entry in &self.entries {
            // Remove whatever the scope left behind, then reapply the
            // snapshot. Bindings added only inside the scope vanish.
            registry.remove_binding(&entry.id);
            registry.remove_instance(&entry.id);

            if let Some(binding) = &entry.binding {
                registry.restore_binding(&entry.id, binding.clone());
            }
            if let Some(instance) = &entry.instance {
                registry.put_instance(&entry.id, instance.clone());
            }
            for alias in &entry.aliases {
                registry.put_alias(alias, &entry.id);
            }
            trace!(id = %entry.id, "Restored scoped identifier");
        }
    }
}

/// Restores a [`RestoreFrame`] on drop.
///
/// The container creates one before applying scoped bindings; dropping
/// it — normally or during unwinding — rolls the registry back.
pub struct ScopeGuard {
    registry: Arc<BindingRegistry>,
    frame: RestoreFrame,
}

impl ScopeGuard {
    pub fn new(registry: Arc<BindingRegistry>, frame: RestoreFrame) -> Self {
        Self { registry, frame }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        debug!(
            identifiers = self.frame.entries.len(),
            "Restoring scoped bindings"
        );
        self.frame.restore(&self.registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Concrete;

    fn class_binding(class: &str, shared: bool) -> Binding {
        Binding {
            concrete: Concrete::Class(class.to_string()),
            shared,
        }
    }

    #[test]
    fn restore_reapplies_overridden_binding() {
        let registry = Arc::new(BindingRegistry::new());
        registry.bind("clock", class_binding("RealClock", true));
        registry.put_instance("clock", Service::new("RealClock", 0u8));

        let frame = RestoreFrame::capture(&registry, &["clock"]);
        let guard = ScopeGuard::new(Arc::clone(&registry), frame);

        registry.bind("clock", class_binding("FakeClock", false));
        registry.put_instance("clock", Service::new("FakeClock", 1u8));

        drop(guard);

        assert_eq!(
            registry.binding("clock").unwrap().concrete.declared_class(),
            Some("RealClock")
        );
        assert_eq!(registry.cached("clock").unwrap().class(), "RealClock");
    }

    #[test]
    fn restore_removes_scope_added_binding() {
        let registry = Arc::new(BindingRegistry::new());

        let frame = RestoreFrame::capture(&registry, &["temp"]);
        let guard = ScopeGuard::new(Arc::clone(&registry), frame);

        registry.bind("temp", class_binding("TempThing", true));
        registry.put_instance("temp", Service::new("TempThing", 0u8));

        drop(guard);

        assert!(registry.binding("temp").is_none());
        assert!(registry.cached("temp").is_none());
    }

    #[test]
    fn restore_reinstates_aliases_dropped_by_rebind() {
        let registry = Arc::new(BindingRegistry::new());
        registry.bind("logger", class_binding("ConsoleLogger", false));
        registry.put_alias("log", "logger");

        let frame = RestoreFrame::capture(&registry, &["logger"]);
        let guard = ScopeGuard::new(Arc::clone(&registry), frame);

        // Re-bind inside the scope drops the alias.
        registry.bind("logger", class_binding("NullLogger", false));
        assert!(!registry.has_alias("log"));

        drop(guard);
        assert!(registry.has_alias("log"));
        assert_eq!(registry.canonical("log"), "logger");
    }

    #[test]
    fn restore_runs_on_panic() {
        let registry = Arc::new(BindingRegistry::new());
        registry.bind("clock", class_binding("RealClock", true));

        let captured = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let frame = RestoreFrame::capture(&captured, &["clock"]);
            let _guard = ScopeGuard::new(Arc::clone(&captured), frame);
            captured.bind("clock", class_binding("FakeClock", false));
            panic!("callback exploded");
        }));
        assert!(result.is_err());

        assert_eq!(
            registry.binding("clock").unwrap().concrete.declared_class(),
            Some("RealClock")
        );
    }
}
