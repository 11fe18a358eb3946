//! Lazy resolution proxy.
//!
//! A [`LazyService`] defers resolution of its identifier until first
//! use. Method forwarding is out of scope — callers take the resolved
//! [`Service`] and downcast it themselves.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::container::Container;
use crate::error::Result;
use crate::value::Service;

/// Resolve-on-first-use handle for one identifier.
pub struct LazyService {
    container: Container,
    id: String,
    cell: OnceCell<Service>,
}

impl LazyService {
    pub(crate) fn new(container: Container, id: &str) -> Self {
        Self {
            container,
            id: id.to_string(),
            cell: OnceCell::new(),
        }
    }

    /// The resolved service. The first call triggers [`resolve`];
    /// subsequent calls return the cached instance.
    ///
    /// [`resolve`]: LazyService::resolve
    pub fn instance(&self) -> Result<Service> {
        self.cell
            .get_or_try_init(|| self.container.get(&self.id))
            .cloned()
    }

    /// Forces resolution now.
    pub fn resolve(&self) -> Result<Service> {
        self.instance()
    }

    /// True once the identifier has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The identifier this proxy stands in for.
    pub fn abstract_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for LazyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyService")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::ClassInfo;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Telescope;

    #[test]
    fn lazy_defers_and_caches() {
        let container = Container::new();
        let built = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&built);
        container.register_class(ClassInfo::concrete("Telescope").constructor(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("Telescope", Telescope))
        }));
        container.bind_shared("scope", "Telescope").unwrap();

        let lazy = container.lazy("scope");
        assert_eq!(lazy.abstract_id(), "scope");
        assert!(!lazy.is_resolved());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let first = lazy.instance().unwrap();
        assert!(lazy.is_resolved());
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let second = lazy.instance().unwrap();
        assert!(first.same_object(&second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_surfaces_resolution_errors() {
        let container = Container::new();
        let lazy = container.lazy("ghost");
        assert!(lazy.resolve().is_err());
        assert!(!lazy.is_resolved());
    }
}
