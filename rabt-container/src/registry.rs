//! The binding registry — bindings, instance cache, and alias table.
//!
//! The registry maps canonical identifiers to [`Binding`]s and
//! enforces the replacement invariants: re-binding an identifier
//! drops its cached instance and removes any alias that targets it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::Result;
use crate::value::{Service, Value};

/// Trait for resolving dependencies.
///
/// This is what factory closures receive. Separated from the
/// container so factories, decorators, and compiled resolvers depend
/// only on the capabilities they use.
pub trait Resolver: Send + Sync {
    /// Resolves an identifier through the full resolution pipeline.
    fn resolve(&self, id: &str) -> Result<Service>;

    /// Constructs a class through its registered descriptor,
    /// binding constructor parameters from the container.
    fn construct(&self, class: &str) -> Result<Service>;

    /// Invokes a class's registered constructor directly with
    /// pre-resolved arguments. Used by compiled factories, which have
    /// already planned every argument.
    fn invoke_constructor(&self, class: &str, args: Vec<Value>) -> Result<Service>;
}

/// Factory closures take the resolver and return a finished service.
///
/// `Arc` rather than `Box`: factories are shared between threads and
/// cloned into wrappers by `extend`.
pub type FactoryFn = Arc<dyn Fn(&dyn Resolver) -> Result<Service> + Send + Sync>;

/// What a binding constructs.
#[derive(Clone)]
pub enum Concrete {
    /// Construct the identifier itself as a class.
    SelfClass,
    /// Construct the named class.
    Class(String),
    /// Invoke an opaque factory closure.
    Factory(FactoryFn),
    /// Invoke a factory closure with a declared return class.
    /// The declared class is what makes a closure binding compilable.
    TypedFactory { class: String, factory: FactoryFn },
}

impl Concrete {
    /// Declared class of this concrete, when one is statically known.
    pub fn declared_class(&self) -> Option<&str> {
        match self {
            Concrete::Class(c) => Some(c),
            Concrete::TypedFactory { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Human-readable description for events and `bindings()`.
    pub fn describe(&self) -> String {
        match self {
            Concrete::SelfClass => "self".to_string(),
            Concrete::Class(c) => format!("class:{c}"),
            Concrete::Factory(_) => "closure".to_string(),
            Concrete::TypedFactory { class, .. } => format!("closure:{class}"),
        }
    }

    /// Stable text used by the compiler fingerprint. Opaque closures
    /// normalize to `closure`; typed factories to their declared class.
    pub fn normalize(&self) -> String {
        match self {
            Concrete::SelfClass => "self".to_string(),
            Concrete::Class(c) => format!("class:{c}"),
            Concrete::Factory(_) => "closure".to_string(),
            Concrete::TypedFactory { class, .. } => format!("class:{class}"),
        }
    }
}

impl fmt::Debug for Concrete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Concrete({})", self.describe())
    }
}

/// One registered binding.
#[derive(Clone, Debug)]
pub struct Binding {
    pub concrete: Concrete,
    pub shared: bool,
}

/// Stores bindings, cached instances, and aliases.
///
/// Locks guard individual maps and are never held across a factory
/// invocation, so nested resolution re-enters freely.
pub struct BindingRegistry {
    bindings: RwLock<IndexMap<String, Binding>>,
    instances: RwLock<HashMap<String, Service>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(IndexMap::new()),
            instances: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a binding, atomically replacing any prior one.
    ///
    /// Clears the instance cache entry for `id` and removes any alias
    /// that currently targets `id`. Returns true when a prior binding
    /// was replaced.
    pub fn bind(&self, id: &str, binding: Binding) -> bool {
        let replaced = {
            let mut bindings = self.bindings.write();
            bindings.insert(id.to_string(), binding).is_some()
        };
        self.instances.write().remove(id);
        self.aliases.write().retain(|alias, target| {
            let keep = target.as_str() != id;
            if !keep {
                debug!(alias = %alias, target = id, "Dropped alias on re-bind");
            }
            keep
        });
        debug!(id, replaced, "Registered binding");
        replaced
    }

    /// Stores a pre-built service directly in the instance cache.
    pub fn put_instance(&self, id: &str, service: Service) {
        debug!(id, class = service.class(), "Registered instance");
        self.instances.write().insert(id.to_string(), service);
    }

    /// Registers an alias. Callers validate that the target exists.
    pub fn put_alias(&self, alias: &str, target: &str) {
        debug!(alias, target, "Registered alias");
        self.aliases
            .write()
            .insert(alias.to_string(), target.to_string());
    }

    /// Rewrites `id` through the alias table — a single hop.
    pub fn canonical(&self, id: &str) -> String {
        if let Some(target) = self.aliases.read().get(id) {
            trace!(from = id, to = %target, "Following alias");
            return target.clone();
        }
        id.to_string()
    }

    pub fn binding(&self, id: &str) -> Option<Binding> {
        self.bindings.read().get(id).cloned()
    }

    pub fn cached(&self, id: &str) -> Option<Service> {
        self.instances.read().get(id).cloned()
    }

    pub fn has_binding(&self, id: &str) -> bool {
        self.bindings.read().contains_key(id)
    }

    pub fn has_instance(&self, id: &str) -> bool {
        self.instances.read().contains_key(id)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.read().contains_key(alias)
    }

    /// Caches a shared resolution result.
    pub fn cache_instance(&self, id: &str, service: &Service) {
        trace!(id, "Cached shared instance");
        self.instances
            .write()
            .insert(id.to_string(), service.clone());
    }

    // Primitives used by scoped rollback. They bypass the replacement
    // invariants on purpose: restoration must not cascade.

    pub fn remove_binding(&self, id: &str) -> Option<Binding> {
        self.bindings.write().shift_remove(id)
    }

    pub fn restore_binding(&self, id: &str, binding: Binding) {
        self.bindings.write().insert(id.to_string(), binding);
    }

    pub fn remove_instance(&self, id: &str) -> Option<Service> {
        self.instances.write().remove(id)
    }

    /// Aliases currently targeting `id`.
    pub fn aliases_of(&self, id: &str) -> Vec<String> {
        self.aliases
            .read()
            .iter()
            .filter(|(_, target)| target.as_str() == id)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Replaces a binding's concrete in place, keeping its position.
    /// Used by `extend` when wrapping a factory.
    pub fn replace_concrete(&self, id: &str, concrete: Concrete) {
        if let Some(binding) = self.bindings.write().get_mut(id) {
            binding.concrete = concrete;
        }
    }

    /// Snapshot of all bindings in registration order.
    pub fn bindings_snapshot(&self) -> Vec<(String, Binding)> {
        self.bindings
            .read()
            .iter()
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect()
    }

    /// Snapshot of the alias table.
    pub fn aliases_snapshot(&self) -> Vec<(String, String)> {
        self.aliases
            .read()
            .iter()
            .map(|(a, t)| (a.clone(), t.clone()))
            .collect()
    }

    /// All identifiers that could satisfy a lookup: bindings,
    /// instances, and aliases. Used for suggestions.
    pub fn known_identifiers(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.read().keys().cloned().collect();
        keys.extend(self.instances.read().keys().cloned());
        keys.extend(self.aliases.read().keys().cloned());
        keys
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("bindings", &self.bindings.read().len())
            .field("instances", &self.instances.read().len())
            .field("aliases", &self.aliases.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_binding(class: &str, shared: bool) -> Binding {
        Binding {
            concrete: Concrete::Class(class.to_string()),
            shared,
        }
    }

    #[test]
    fn bind_and_lookup() {
        let registry = BindingRegistry::new();
        registry.bind("logger", class_binding("ConsoleLogger", false));

        let binding = registry.binding("logger").unwrap();
        assert_eq!(binding.concrete.declared_class(), Some("ConsoleLogger"));
        assert!(!binding.shared);
    }

    #[test]
    fn rebind_replaces_and_drops_instance() {
        let registry = BindingRegistry::new();
        registry.bind("cache", class_binding("MemCache", true));
        registry.put_instance("cache", Service::new("MemCache", 1u8));

        let replaced = registry.bind("cache", class_binding("RedisCache", true));
        assert!(replaced);
        assert!(registry.cached("cache").is_none());
        assert_eq!(
            registry.binding("cache").unwrap().concrete.declared_class(),
            Some("RedisCache")
        );
    }

    #[test]
    fn rebind_drops_aliases_targeting_id() {
        let registry = BindingRegistry::new();
        registry.bind("logger", class_binding("ConsoleLogger", false));
        registry.put_alias("log", "logger");
        registry.put_alias("other", "elsewhere");

        registry.bind("logger", class_binding("FileLogger", false));
        assert!(!registry.has_alias("log"));
        assert!(registry.has_alias("other"));
    }

    #[test]
    fn canonical_follows_single_hop() {
        let registry = BindingRegistry::new();
        registry.put_alias("log", "logger");
        registry.put_alias("l", "log");

        assert_eq!(registry.canonical("log"), "logger");
        // Single hop only: aliases of aliases are not chased.
        assert_eq!(registry.canonical("l"), "log");
        assert_eq!(registry.canonical("unknown"), "unknown");
    }

    #[test]
    fn aliases_of_lists_targets() {
        let registry = BindingRegistry::new();
        registry.put_alias("log", "logger");
        registry.put_alias("l", "logger");
        registry.put_alias("c", "cache");

        let mut aliases = registry.aliases_of("logger");
        aliases.sort();
        assert_eq!(aliases, vec!["l".to_string(), "log".to_string()]);
    }

    #[test]
    fn concrete_normalization() {
        assert_eq!(Concrete::SelfClass.normalize(), "self");
        assert_eq!(Concrete::Class("A".into()).normalize(), "class:A");
        let f: FactoryFn = Arc::new(|_| Ok(Service::new("A", 0u8)));
        assert_eq!(Concrete::Factory(f.clone()).normalize(), "closure");
        assert_eq!(
            Concrete::TypedFactory {
                class: "A".into(),
                factory: f
            }
            .normalize(),
            "class:A"
        );
    }

    #[test]
    fn known_identifiers_cover_all_tables() {
        let registry = BindingRegistry::new();
        registry.bind("a", class_binding("A", false));
        registry.put_instance("b", Service::new("B", 0u8));
        registry.put_alias("c", "a");

        let mut keys = registry.known_identifiers();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
