//! Post-construction transformation pipeline.
//!
//! Decorators are priority-ordered (ascending, stable) per
//! identifier; middleware is a separate FIFO list applied after all
//! decorators. Neither alters the sharing policy — the decorated
//! result is what the caller receives, the cache keeps what the
//! factory produced at share time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::Result;
use crate::registry::Resolver;
use crate::value::Service;

/// A decorator or middleware: takes the current instance, returns the
/// replacement.
pub type DecoratorFn = Arc<dyn Fn(Service, &dyn Resolver) -> Result<Service> + Send + Sync>;

struct DecoratorEntry {
    priority: i32,
    seq: u64,
    func: DecoratorFn,
}

/// Per-identifier decorator and middleware registrations.
pub struct DecoratorChain {
    decorators: RwLock<HashMap<String, Vec<DecoratorEntry>>>,
    middleware: RwLock<HashMap<String, Vec<DecoratorFn>>>,
    seq: RwLock<u64>,
}

impl DecoratorChain {
    pub fn new() -> Self {
        Self {
            decorators: RwLock::new(HashMap::new()),
            middleware: RwLock::new(HashMap::new()),
            seq: RwLock::new(0),
        }
    }

    /// Appends `(priority, fn)` and keeps the list sorted ascending by
    /// priority, stable with respect to registration order.
    pub fn add_decorator(&self, id: &str, func: DecoratorFn, priority: i32) {
        let seq = {
            let mut seq = self.seq.write();
            *seq += 1;
            *seq
        };
        let mut decorators = self.decorators.write();
        let list = decorators.entry(id.to_string()).or_default();
        list.push(DecoratorEntry { priority, seq, func });
        list.sort_by_key(|e| (e.priority, e.seq));
    }

    /// Appends middleware in FIFO order.
    pub fn add_middleware(&self, id: &str, func: DecoratorFn) {
        self.middleware
            .write()
            .entry(id.to_string())
            .or_default()
            .push(func);
    }

    /// True if `id` has any decorators or middleware.
    pub fn has(&self, id: &str) -> bool {
        self.decorators.read().contains_key(id) || self.middleware.read().contains_key(id)
    }

    /// True if `id` has decorators or middleware; used by the compiler
    /// to refuse compilation.
    pub fn decorated_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.decorators.read().keys().cloned().collect();
        ids.extend(self.middleware.read().keys().cloned());
        ids
    }

    /// Applies decorators in ascending-priority order, threading the
    /// instance through each, then middleware in FIFO order.
    pub fn apply(&self, id: &str, instance: Service, resolver: &dyn Resolver) -> Result<Service> {
        let decorators: Vec<DecoratorFn> = self
            .decorators
            .read()
            .get(id)
            .map(|list| list.iter().map(|e| Arc::clone(&e.func)).collect())
            .unwrap_or_default();
        let middleware: Vec<DecoratorFn> = self
            .middleware
            .read()
            .get(id)
            .cloned()
            .unwrap_or_default();

        trace!(
            id,
            decorators = decorators.len(),
            middleware = middleware.len(),
            "Applying decorator chain"
        );

        let mut current = instance;
        for func in decorators.iter().chain(middleware.iter()) {
            current = func(current, resolver)?;
        }
        Ok(current)
    }
}

impl Default for DecoratorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoratorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorChain")
            .field("decorated", &self.decorators.read().len())
            .field("middleware", &self.middleware.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContainerError, Result};
    use crate::value::Value;

    struct NullResolver;

    impl Resolver for NullResolver {
        fn resolve(&self, id: &str) -> Result<Service> {
            Err(ContainerError::not_found(id))
        }

        fn construct(&self, class: &str) -> Result<Service> {
            Err(ContainerError::not_found(class))
        }

        fn invoke_constructor(&self, class: &str, _args: Vec<Value>) -> Result<Service> {
            Err(ContainerError::not_found(class))
        }
    }

    fn tagging(label: &'static str) -> DecoratorFn {
        Arc::new(move |svc: Service, _: &dyn Resolver| {
            let mut trace = svc
                .downcast_ref::<Vec<&'static str>>()
                .cloned()
                .unwrap_or_default();
            trace.push(label);
            Ok(svc.with_object(Arc::new(trace)))
        })
    }

    fn applied(svc: &Service) -> Vec<&'static str> {
        svc.downcast_ref::<Vec<&'static str>>().cloned().unwrap()
    }

    #[test]
    fn decorators_run_in_ascending_priority() {
        let chain = DecoratorChain::new();
        chain.add_decorator("svc", tagging("p3"), 3);
        chain.add_decorator("svc", tagging("p1"), 1);
        chain.add_decorator("svc", tagging("p2"), 2);

        let raw = Service::new("Svc", Vec::<&'static str>::new());
        let out = chain.apply("svc", raw, &NullResolver).unwrap();
        assert_eq!(applied(&out), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let chain = DecoratorChain::new();
        chain.add_decorator("svc", tagging("first"), 5);
        chain.add_decorator("svc", tagging("second"), 5);

        let raw = Service::new("Svc", Vec::<&'static str>::new());
        let out = chain.apply("svc", raw, &NullResolver).unwrap();
        assert_eq!(applied(&out), vec!["first", "second"]);
    }

    #[test]
    fn middleware_runs_after_all_decorators_in_fifo() {
        let chain = DecoratorChain::new();
        chain.add_middleware("svc", tagging("mw1"));
        chain.add_decorator("svc", tagging("deco"), 9);
        chain.add_middleware("svc", tagging("mw2"));

        let raw = Service::new("Svc", Vec::<&'static str>::new());
        let out = chain.apply("svc", raw, &NullResolver).unwrap();
        assert_eq!(applied(&out), vec!["deco", "mw1", "mw2"]);
    }

    #[test]
    fn untouched_identifier_passes_through() {
        let chain = DecoratorChain::new();
        assert!(!chain.has("svc"));

        let raw = Service::new("Svc", 7u8);
        let out = chain.apply("svc", raw.clone(), &NullResolver).unwrap();
        assert!(out.same_object(&raw));
    }

    #[test]
    fn decorator_error_propagates() {
        let chain = DecoratorChain::new();
        chain.add_decorator(
            "svc",
            Arc::new(|_svc, _r| Err(ContainerError::construction("Svc", "decorator broke"))),
            1,
        );

        let raw = Service::new("Svc", 7u8);
        assert!(chain.apply("svc", raw, &NullResolver).is_err());
    }
}
