//! Contextual bindings and the consumer-context stack.
//!
//! A contextual binding says: while constructing consumer `X`, requests
//! for identifier `I` resolve to some other implementation. The context
//! stack tracks which consumer is currently being constructed; only the
//! top entry defines the current context.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::container::Container;
use crate::error::{ContainerError, Result};
use crate::registry::FactoryFn;
use crate::value::{Service, Value};

/// How a contextual binding produces its value.
#[derive(Clone)]
pub enum Implementation {
    /// Resolve the named class through the container.
    Class(String),
    /// Invoke the factory with the container.
    Factory(FactoryFn),
    /// Resolve the whole tag into a collection service.
    Tagged(String),
    /// Resolve `class`, then invoke its configure hook with `options`.
    Configured {
        class: String,
        options: BTreeMap<String, Value>,
    },
    /// Hand back an existing object as-is.
    Instance(Service),
}

impl Implementation {
    /// Human-readable description, also the fingerprint normalization.
    pub fn normalize(&self) -> String {
        match self {
            Implementation::Class(c) => format!("class:{c}"),
            Implementation::Factory(_) => "closure".to_string(),
            Implementation::Tagged(t) => format!("tagged:{t}"),
            Implementation::Configured { class, options } => {
                let opts: Vec<String> = options
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.normalize()))
                    .collect();
                format!("configured:{class}{{{}}}", opts.join(","))
            }
            Implementation::Instance(s) => format!("instance:{}", s.class()),
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Implementation({})", self.normalize())
    }
}

/// Contextual binding store plus the context stack.
pub struct ContextualBindings {
    bindings: RwLock<HashMap<String, HashMap<String, Implementation>>>,
    stack: Arc<RwLock<Vec<String>>>,
}

impl ContextualBindings {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            stack: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn add(&self, consumer: &str, needed: &str, implementation: Implementation) {
        debug!(
            consumer,
            needed,
            implementation = %implementation.normalize(),
            "Registered contextual binding"
        );
        self.bindings
            .write()
            .entry(consumer.to_string())
            .or_default()
            .insert(needed.to_string(), implementation);
    }

    /// Pushes `consumer` onto the context stack; the guard pops on drop
    /// so the stack unwinds on every exit path.
    pub fn push(&self, consumer: &str) -> ContextGuard {
        trace!(consumer, "Entering construction context");
        self.stack.write().push(consumer.to_string());
        ContextGuard {
            stack: Arc::clone(&self.stack),
        }
    }

    /// The current context: the top of the stack.
    pub fn current(&self) -> Option<String> {
        self.stack.read().last().cloned()
    }

    /// True iff the stack top is a consumer with an entry for `id`.
    /// Intermediate stack entries are never searched.
    pub fn has_binding_for_current(&self, id: &str) -> bool {
        match self.current() {
            Some(consumer) => self
                .bindings
                .read()
                .get(&consumer)
                .map(|m| m.contains_key(id))
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn implementation(&self, consumer: &str, id: &str) -> Option<Implementation> {
        self.bindings
            .read()
            .get(consumer)
            .and_then(|m| m.get(id))
            .cloned()
    }

    /// Identifiers that are overridden for at least one consumer. The
    /// compiler refuses to compile these.
    pub fn overridden_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bindings
            .read()
            .values()
            .flat_map(|m| m.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Snapshot of all contextual bindings for the compiler.
    pub fn snapshot(&self) -> Vec<(String, String, Implementation)> {
        let mut entries: Vec<(String, String, Implementation)> = self
            .bindings
            .read()
            .iter()
            .flat_map(|(consumer, m)| {
                m.iter()
                    .map(|(needed, imp)| (consumer.clone(), needed.clone(), imp.clone()))
            })
            .collect();
        entries.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        entries
    }

    pub fn len(&self) -> usize {
        self.bindings.read().values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextualBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextualBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualBindings")
            .field("bindings", &self.len())
            .field("depth", &self.stack.read().len())
            .finish()
    }
}

/// Pops the context stack on drop.
pub struct ContextGuard {
    stack: Arc<RwLock<Vec<String>>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.stack.write().pop();
    }
}

/// Fluent contextual binding builder.
///
/// ```rust,ignore
/// container.when("ReportJob").needs("Logger").give("FileLogger")?;
/// ```
pub struct ContextualBuilder {
    container: Container,
    consumer: String,
    needs: Option<String>,
}

impl ContextualBuilder {
    pub(crate) fn new(container: Container, consumer: &str) -> Self {
        Self {
            container,
            consumer: consumer.to_string(),
            needs: None,
        }
    }

    /// Names the identifier being overridden for this consumer.
    pub fn needs(mut self, abstract_id: &str) -> Self {
        self.needs = Some(abstract_id.to_string());
        self
    }

    fn register(&self, implementation: Implementation) -> Result<()> {
        let needed = self.needs.as_deref().ok_or_else(|| {
            ContainerError::InvalidUsage(format!(
                "when('{}'): call needs(..) before give(..)",
                self.consumer
            ))
        })?;
        self.container
            .contextual_bindings()
            .add(&self.consumer, needed, implementation);
        Ok(())
    }

    /// Binds a class name as the contextual implementation.
    pub fn give(self, class: &str) -> Result<()> {
        self.register(Implementation::Class(class.to_string()))
    }

    /// Binds a factory closure as the contextual implementation.
    pub fn give_factory(
        self,
        factory: impl Fn(&dyn crate::registry::Resolver) -> Result<Service> + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(Implementation::Factory(Arc::new(factory)))
    }

    /// Binds the whole tag; the consumer receives a collection service.
    pub fn give_tagged(self, tag: &str) -> Result<()> {
        self.register(Implementation::Tagged(tag.to_string()))
    }

    /// Binds a class that is configured after construction.
    pub fn give_configured(
        self,
        class: &str,
        options: BTreeMap<String, Value>,
    ) -> Result<()> {
        self.register(Implementation::Configured {
            class: class.to_string(),
            options,
        })
    }

    /// Binds an existing object as-is.
    pub fn give_instance(self, service: Service) -> Result<()> {
        self.register(Implementation::Instance(service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_top_defines_current_context() {
        let contextual = ContextualBindings::new();
        contextual.add("Alpha", "I", Implementation::Class("AltImpl".into()));

        assert!(!contextual.has_binding_for_current("I"));

        let _outer = contextual.push("Alpha");
        assert_eq!(contextual.current().as_deref(), Some("Alpha"));
        assert!(contextual.has_binding_for_current("I"));

        // Intermediate entries are not searched: Beta on top hides Alpha.
        let inner = contextual.push("Beta");
        assert!(!contextual.has_binding_for_current("I"));
        drop(inner);

        assert!(contextual.has_binding_for_current("I"));
    }

    #[test]
    fn guard_pops_on_drop() {
        let contextual = ContextualBindings::new();
        {
            let _guard = contextual.push("Alpha");
            assert_eq!(contextual.current().as_deref(), Some("Alpha"));
        }
        assert!(contextual.current().is_none());
    }

    #[test]
    fn guard_pops_on_panic() {
        let contextual = Arc::new(ContextualBindings::new());
        let inner = Arc::clone(&contextual);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.push("Alpha");
            panic!("constructor exploded");
        }));
        assert!(result.is_err());
        assert!(contextual.current().is_none());
    }

    #[test]
    fn snapshot_is_sorted() {
        let contextual = ContextualBindings::new();
        contextual.add("B", "y", Implementation::Class("Y".into()));
        contextual.add("A", "x", Implementation::Tagged("tags".into()));
        contextual.add("A", "w", Implementation::Class("W".into()));

        let keys: Vec<(String, String)> = contextual
            .snapshot()
            .into_iter()
            .map(|(c, n, _)| (c, n))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), "w".to_string()),
                ("A".to_string(), "x".to_string()),
                ("B".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn normalize_forms() {
        assert_eq!(
            Implementation::Class("X".into()).normalize(),
            "class:X"
        );
        assert_eq!(
            Implementation::Tagged("handlers".into()).normalize(),
            "tagged:handlers"
        );
        let mut options = BTreeMap::new();
        options.insert("level".to_string(), Value::Str("debug".into()));
        options.insert("buffer".to_string(), Value::Int(64));
        assert_eq!(
            Implementation::Configured {
                class: "FileLogger".into(),
                options
            }
            .normalize(),
            "configured:FileLogger{buffer=int:64,level=str:debug}"
        );
    }
}
