//! Resolution event hook points.
//!
//! Only the hook points live here; the event bus itself is an
//! external collaborator. Handlers must not re-enter the resolver
//! for the same identifier on the same call chain.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ContainerError;
use crate::value::Service;

/// Hooks dispatched around every resolution and registration.
///
/// All methods have empty defaults so handlers implement only what
/// they observe.
pub trait ResolutionHooks: Send + Sync {
    /// A resolution of `id` is about to start.
    fn resolution_starting(&self, _id: &str) {}

    /// `id` resolved to `service`.
    fn resolution_done(&self, _id: &str, _service: &Service) {}

    /// Resolution of `id` failed with `error`.
    fn resolution_failed(&self, _id: &str, _error: &ContainerError) {}

    /// A binding was registered for `id`.
    fn binding_registered(&self, _id: &str, _concrete: &str, _shared: bool) {}
}

/// The container's registered hook handlers.
pub struct HookSet {
    hooks: RwLock<Vec<Arc<dyn ResolutionHooks>>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, hook: Arc<dyn ResolutionHooks>) {
        self.hooks.write().push(hook);
    }

    pub fn starting(&self, id: &str) {
        for hook in self.hooks.read().iter() {
            hook.resolution_starting(id);
        }
    }

    pub fn done(&self, id: &str, service: &Service) {
        for hook in self.hooks.read().iter() {
            hook.resolution_done(id, service);
        }
    }

    pub fn failed(&self, id: &str, error: &ContainerError) {
        for hook in self.hooks.read().iter() {
            hook.resolution_failed(id, error);
        }
    }

    pub fn registered(&self, id: &str, concrete: &str, shared: bool) {
        for hook in self.hooks.read().iter() {
            hook.binding_registered(id, concrete, shared);
        }
    }
}

impl Default for HookSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl ResolutionHooks for Recorder {
        fn resolution_starting(&self, id: &str) {
            self.log.lock().push(format!("starting:{id}"));
        }

        fn resolution_done(&self, id: &str, service: &Service) {
            self.log.lock().push(format!("done:{id}:{}", service.class()));
        }

        fn resolution_failed(&self, id: &str, _error: &ContainerError) {
            self.log.lock().push(format!("failed:{id}"));
        }

        fn binding_registered(&self, id: &str, concrete: &str, shared: bool) {
            self.log.lock().push(format!("bound:{id}:{concrete}:{shared}"));
        }
    }

    #[test]
    fn hooks_receive_events_in_order() {
        let hooks = HookSet::new();
        let recorder = Arc::new(Recorder::default());
        hooks.add(recorder.clone());

        hooks.registered("logger", "class:ConsoleLogger", true);
        hooks.starting("logger");
        hooks.done("logger", &Service::new("ConsoleLogger", 0u8));
        hooks.failed("cache", &ContainerError::not_found("cache"));

        let log = recorder.log.lock().clone();
        assert_eq!(
            log,
            vec![
                "bound:logger:class:ConsoleLogger:true",
                "starting:logger",
                "done:logger:ConsoleLogger",
                "failed:cache",
            ]
        );
    }

    #[test]
    fn multiple_hooks_all_fire() {
        let hooks = HookSet::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        hooks.add(a.clone());
        hooks.add(b.clone());

        hooks.starting("x");
        assert_eq!(a.log.lock().len(), 1);
        assert_eq!(b.log.lock().len(), 1);
    }
}
