//! # The Container — heart of Rabt
//!
//! The dependency injection container that resolves identifiers to
//! fully constructed object graphs.
//!
//! # Resolution pipeline
//! ```text
//! alias-resolve -> mock check -> contextual check -> instance cache ->
//! deferred-provider hook -> binding lookup (or synthesize from class) ->
//! cycle-guard push -> concrete factory -> (optional share into cache) ->
//! decorator chain -> cycle-guard pop -> record metrics -> return
//! ```
//!
//! # Examples
//! ```rust,ignore
//! use rabt_container::prelude::*;
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
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use rabt_support::rendering::suggest_similar;

use crate::compiler::{CompileSummary, Compiler, CompilerOptions};
use crate::contextual::{ContextualBindings, ContextualBuilder, Implementation};
use crate::decorator::DecoratorChain;
use crate::error::{
    CircularError, ContainerError, NotFoundError, NotInstantiableError, ResolutionFailedError,
    Result, TypeMismatchError, UnresolvableError,
};
use crate::events::{HookSet, ResolutionHooks};
use crate::graph::{GraphWalker, ValidationReport};
use crate::introspect::{ClassCategory, ClassInfo, ParamInfo, TypeIntrospector, TypeKind};
use crate::lazy::LazyService;
use crate::metrics::{
    MetricsRecorder, PerformanceMetrics, ResolutionHistory, ResolutionRecord,
};
use crate::provider::Provider;
use crate::registry::{Binding, BindingRegistry, Concrete, FactoryFn, Resolver};
use crate::scope::{RestoreFrame, ScopeGuard, ScopedBinding};
use crate::tags::TagRegistry;
use crate::value::{Service, Value};

/// Hook invoked once per unbound identifier before synthesis; it may
/// register the identifier on the container it receives.
pub type DeferredFn = Arc<dyn Fn(&Container, &str) + Send + Sync>;

/// Container-wide toggles.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Let `resolve_all` append declared concrete implementors of an
    /// interface or abstract identifier.
    pub auto_discovery: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            auto_discovery: true,
        }
    }
}

/// A callable with a declared parameter list, for [`Container::call`].
///
/// Rust closures cannot be introspected, so a callable carries its
/// parameter descriptors explicitly.
#[derive(Clone)]
pub struct Callable {
    params: Vec<ParamInfo>,
    func: Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>,
}

impl Callable {
    pub fn new(
        params: Vec<ParamInfo>,
        func: impl Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            params,
            func: Arc::new(func),
        }
    }
}

/// Public view of one binding, returned by [`Container::bindings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDescriptor {
    pub id: String,
    pub concrete: String,
    pub shared: bool,
}

struct State {
    introspector: TypeIntrospector,
    registry: Arc<BindingRegistry>,
    contextual: ContextualBindings,
    tags: TagRegistry,
    decorators: DecoratorChain,
    hooks: HookSet,
    metrics: MetricsRecorder,
    history: ResolutionHistory,
    mocks: RwLock<HashMap<String, Service>>,
    resolving: Arc<Mutex<Vec<String>>>,
    deferred: RwLock<Option<DeferredFn>>,
    deferred_attempted: Mutex<HashSet<String>>,
    compiled: RwLock<HashMap<(String, String), FactoryFn>>,
    options: RwLock<ContainerOptions>,
}

/// The dependency injection container.
///
/// Cloning is cheap and yields a handle to the same container.
#[derive(Clone)]
pub struct Container {
    state: Arc<State>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                introspector: TypeIntrospector::new(),
                registry: Arc::new(BindingRegistry::new()),
                contextual: ContextualBindings::new(),
                tags: TagRegistry::new(),
                decorators: DecoratorChain::new(),
                hooks: HookSet::new(),
                metrics: MetricsRecorder::new(),
                history: ResolutionHistory::new(),
                mocks: RwLock::new(HashMap::new()),
                resolving: Arc::new(Mutex::new(Vec::new())),
                deferred: RwLock::new(None),
                deferred_attempted: Mutex::new(HashSet::new()),
                compiled: RwLock::new(HashMap::new()),
                options: RwLock::new(ContainerOptions::default()),
            }),
        }
    }

    // ── Class descriptors ──

    /// Registers a class descriptor with the introspector.
    pub fn register_class(&self, info: ClassInfo) {
        self.state.introspector.register(info);
    }

    pub fn introspector(&self) -> &TypeIntrospector {
        &self.state.introspector
    }

    pub fn set_auto_discovery(&self, enabled: bool) {
        self.state.options.write().auto_discovery = enabled;
    }

    // ── Binding registration ──

    /// Registers a binding, atomically replacing any prior one for
    /// `id`. Replacement drops the cached instance and any alias that
    /// targets `id`.
    pub fn bind(&self, id: &str, concrete: Concrete, shared: bool) -> Result<()> {
        let concrete = self.substitute_compiled(id, concrete);
        let description = concrete.describe();
        self.state.registry.bind(id, Binding { concrete, shared });
        self.state.hooks.registered(id, &description, shared);
        Ok(())
    }

    /// Binds `id` to a class name.
    pub fn bind_class(&self, id: &str, class: &str, shared: bool) -> Result<()> {
        self.bind(id, Concrete::Class(class.to_string()), shared)
    }

    /// Binds `id` to itself: resolution constructs `id` as a class.
    pub fn bind_self(&self, id: &str, shared: bool) -> Result<()> {
        self.bind(id, Concrete::SelfClass, shared)
    }

    /// Binds `id` to a factory closure.
    pub fn bind_factory(
        &self,
        id: &str,
        shared: bool,
        factory: impl Fn(&dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(id, Concrete::Factory(Arc::new(factory)), shared)
    }

    /// Binds `id` to a factory with a declared return class. The
    /// declared class is what makes the binding compilable.
    pub fn bind_typed_factory(
        &self,
        id: &str,
        class: &str,
        shared: bool,
        factory: impl Fn(&dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(
            id,
            Concrete::TypedFactory {
                class: class.to_string(),
                factory: Arc::new(factory),
            },
            shared,
        )
    }

    /// Shared binding: the first resolution is cached and returned
    /// for all subsequent resolutions.
    pub fn singleton(&self, id: &str, concrete: Concrete) -> Result<()> {
        self.bind(id, concrete, true)
    }

    /// Shared class binding: the first resolution is cached.
    pub fn bind_shared(&self, id: &str, class: &str) -> Result<()> {
        self.bind_class(id, class, true)
    }

    /// Shared factory binding.
    pub fn singleton_factory(
        &self,
        id: &str,
        factory: impl Fn(&dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind_factory(id, true, factory)
    }

    /// Stores a pre-built service for `id`, type-checking interface
    /// conformance when `id` names an interface or abstract class.
    pub fn instance(&self, id: &str, service: Service) -> Result<()> {
        if let Ok(info) = self.state.introspector.class(id) {
            if matches!(
                info.category(),
                ClassCategory::Interface | ClassCategory::Abstract
            ) {
                let satisfied = service.class() == id
                    || self
                        .state
                        .introspector
                        .class(service.class())
                        .map(|c| c.satisfies(id))
                        .unwrap_or(false);
                if !satisfied {
                    return Err(ContainerError::TypeMismatch(TypeMismatchError {
                        id: id.to_string(),
                        expected: id.to_string(),
                        actual: service.class().to_string(),
                    }));
                }
            }
        }
        self.state.registry.put_instance(id, service);
        Ok(())
    }

    /// Registers an alias for a currently bound or resolvable
    /// identifier.
    pub fn alias(&self, alias: &str, id: &str) -> Result<()> {
        if !(self.state.registry.has_binding(id)
            || self.state.registry.has_instance(id)
            || self.state.introspector.is_instantiable(id))
        {
            return Err(ContainerError::NotFound(NotFoundError {
                requested: id.to_string(),
                required_by: Some(format!("alias '{alias}'")),
                suggestions: self.similar_identifiers(id),
            }));
        }
        self.state.registry.put_alias(alias, id);
        Ok(())
    }

    /// Transforms the value produced for `id`.
    ///
    /// If `id` already has a cached instance, the transformer runs on
    /// it in place; otherwise the binding's concrete is wrapped so the
    /// transformer runs after the original factory.
    pub fn extend(
        &self,
        id: &str,
        transformer: impl Fn(Service, &dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) -> Result<()> {
        let canonical = self.state.registry.canonical(id);

        if let Some(existing) = self.state.registry.cached(&canonical) {
            let transformed = transformer(existing, self)?;
            self.state.registry.put_instance(&canonical, transformed);
            return Ok(());
        }

        let Some(binding) = self.state.registry.binding(&canonical) else {
            return Err(ContainerError::NotFound(NotFoundError {
                requested: canonical,
                required_by: Some("extend".to_string()),
                suggestions: self.similar_identifiers(id),
            }));
        };

        let transformer = Arc::new(transformer);
        let original = binding.concrete;
        let target = canonical.clone();
        let wrapped: FactoryFn = Arc::new(move |r: &dyn Resolver| {
            let base = match &original {
                Concrete::Factory(f) | Concrete::TypedFactory { factory: f, .. } => f(r)?,
                Concrete::Class(class) => r.construct(class)?,
                Concrete::SelfClass => r.construct(&target)?,
            };
            transformer(base, r)
        });
        self.state
            .registry
            .replace_concrete(&canonical, Concrete::Factory(wrapped));
        Ok(())
    }

    /// True if `id` is bound, has a cached instance, or is a
    /// resolvable class.
    pub fn has(&self, id: &str) -> bool {
        let canonical = self.state.registry.canonical(id);
        self.state.registry.has_binding(&canonical)
            || self.state.registry.has_instance(&canonical)
            || self.state.introspector.is_instantiable(&canonical)
    }

    // ── Resolution ──

    /// Resolves `id` to a fully constructed service.
    pub fn get(&self, id: &str) -> Result<Service> {
        self.state.hooks.starting(id);
        let started = Instant::now();

        match self.resolve_inner(id) {
            Ok(service) => {
                self.state.metrics.record(id, started.elapsed());
                self.state.history.record_if_spied(id, service.class());
                self.state.hooks.done(id, &service);
                Ok(service)
            }
            Err(err) => {
                self.state.hooks.failed(id, &err);
                Err(self.wrap_failure(id, err))
            }
        }
    }

    fn resolve_inner(&self, id: &str) -> Result<Service> {
        // Mocks short-circuit everything, including the cycle guard.
        if let Some(mock) = self.state.mocks.read().get(id).cloned() {
            trace!(id, "Returning mock");
            return Ok(mock);
        }

        // Contextual override for the current consumer.
        if let Some(consumer) = self.state.contextual.current() {
            if let Some(implementation) =
                self.state.contextual.implementation(&consumer, id)
            {
                return self.resolve_contextual(&consumer, id, implementation);
            }
        }

        let canonical = self.state.registry.canonical(id);

        if let Some(cached) = self.state.registry.cached(&canonical) {
            trace!(id = %canonical, "Instance cache hit");
            return Ok(cached);
        }

        if !self.state.registry.has_binding(&canonical) {
            self.run_deferred_hook(&canonical);
        }

        let (concrete, shared) = match self.state.registry.binding(&canonical) {
            Some(binding) => (binding.concrete, binding.shared),
            // Unbound identifiers synthesize construction of the
            // identifier itself as a class.
            None => (Concrete::SelfClass, false),
        };

        let _guard = self.push_resolving(&canonical)?;

        let service = self.construct_concrete(&canonical, &concrete)?;

        if shared {
            self.state.registry.cache_instance(&canonical, &service);
        }

        if self.state.decorators.has(&canonical) {
            return self.state.decorators.apply(&canonical, service, self);
        }

        Ok(service)
    }

    fn resolve_contextual(
        &self,
        consumer: &str,
        id: &str,
        implementation: Implementation,
    ) -> Result<Service> {
        trace!(consumer, id, "Resolving through contextual binding");
        match implementation {
            Implementation::Class(class) => self.get(&class),
            Implementation::Factory(factory) => factory(self),
            Implementation::Tagged(tag) => Ok(Service::collection(self.tagged(&tag))),
            Implementation::Configured { class, options } => {
                let service = self.get(&class)?;
                if let Ok(info) = self.state.introspector.class(service.class()) {
                    if let Some(configure) = info.configure_fn() {
                        configure(&service, &options)?;
                    }
                }
                Ok(service)
            }
            Implementation::Instance(service) => Ok(service),
        }
    }

    fn run_deferred_hook(&self, id: &str) {
        let hook = self.state.deferred.read().clone();
        let Some(hook) = hook else { return };
        {
            let mut attempted = self.state.deferred_attempted.lock();
            if !attempted.insert(id.to_string()) {
                return;
            }
        }
        debug!(id, "Invoking deferred provider hook");
        hook(self, id);
    }

    fn push_resolving(&self, id: &str) -> Result<ResolvingGuard> {
        let mut stack = self.state.resolving.lock();
        if stack.iter().any(|entry| entry == id) {
            let mut chain = stack.clone();
            chain.push(id.to_string());
            warn!(id, chain = ?chain, "Circular dependency detected");
            return Err(ContainerError::Circular(CircularError { chain }));
        }
        stack.push(id.to_string());
        Ok(ResolvingGuard {
            stack: Arc::clone(&self.state.resolving),
        })
    }

    fn construct_concrete(&self, id: &str, concrete: &Concrete) -> Result<Service> {
        match concrete {
            Concrete::Factory(f) | Concrete::TypedFactory { factory: f, .. } => f(self),
            Concrete::Class(class) => self.construct_class(class),
            Concrete::SelfClass => self.construct_class(id),
        }
    }

    /// Constructs `class` through its descriptor: binds every
    /// constructor parameter, then invokes the construction function.
    ///
    /// The class is pushed onto the context stack for the duration, so
    /// nested resolutions see it as their consumer.
    fn construct_class(&self, class: &str) -> Result<Service> {
        let info = self.state.introspector.class(class).map_err(|_| {
            ContainerError::NotFound(NotFoundError {
                requested: class.to_string(),
                required_by: self.state.contextual.current(),
                suggestions: self.similar_identifiers(class),
            })
        })?;

        if let Some(problem) = info.instantiability_problem() {
            return Err(ContainerError::NotInstantiable(NotInstantiableError {
                class: class.to_string(),
                reason: problem.to_string(),
            }));
        }
        let constructor = info.construct_fn().cloned().ok_or_else(|| {
            ContainerError::NotInstantiable(NotInstantiableError {
                class: class.to_string(),
                reason: "it has no registered constructor".to_string(),
            })
        })?;

        let _context = self.state.contextual.push(class);
        let args = self.bind_parameters(class, info.params(), None)?;
        constructor(args)
    }

    /// Binds constructor (or method) parameters in declaration order.
    fn bind_parameters(
        &self,
        class: &str,
        params: &[ParamInfo],
        overrides: Option<&BTreeMap<String, Value>>,
    ) -> Result<Vec<Value>> {
        let mut args = Vec::with_capacity(params.len());
        for param in params {
            if let Some(value) = overrides.and_then(|m| m.get(&param.name)) {
                args.push(value.clone());
                continue;
            }
            args.push(self.bind_parameter(class, param)?);
        }
        Ok(args)
    }

    fn bind_parameter(&self, class: &str, param: &ParamInfo) -> Result<Value> {
        let unresolvable = |reason: String| {
            ContainerError::Unresolvable(UnresolvableError {
                class: class.to_string(),
                parameter: param.name.clone(),
                reason,
            })
        };

        match &param.kind {
            // Untyped and builtin parameters never come from the
            // container; only a default (or null) can satisfy them.
            TypeKind::None | TypeKind::Builtin(_) => {
                if let Some(default) = &param.default {
                    Ok(default.clone())
                } else if param.nullable {
                    Ok(Value::Null)
                } else {
                    Err(unresolvable(match &param.kind {
                        TypeKind::None => "untyped parameter without a default".to_string(),
                        _ => "builtin parameter without a default".to_string(),
                    }))
                }
            }
            TypeKind::Named(ty) => {
                if self.resolvable(ty) {
                    Ok(Value::Object(self.get(ty)?))
                } else if param.nullable {
                    Ok(Value::Null)
                } else if let Some(default) = &param.default {
                    Ok(default.clone())
                } else {
                    Err(unresolvable(format!(
                        "'{ty}' is neither bound nor an instantiable class"
                    )))
                }
            }
            TypeKind::Union(members) => {
                // Declaration order; first member Get can satisfy wins.
                for member in members {
                    match self.get(member) {
                        Ok(service) => return Ok(Value::Object(service)),
                        Err(_) => continue,
                    }
                }
                if param.nullable {
                    Ok(Value::Null)
                } else if let Some(default) = &param.default {
                    Ok(default.clone())
                } else {
                    Err(unresolvable(format!(
                        "no member of '{}' is resolvable",
                        members.join("|")
                    )))
                }
            }
            TypeKind::Intersection(members) => {
                if let Some(default) = &param.default {
                    Ok(default.clone())
                } else if param.nullable {
                    Ok(Value::Null)
                } else {
                    Err(unresolvable(format!(
                        "intersection '{}' cannot be resolved from the container",
                        members.join("&")
                    )))
                }
            }
        }
    }

    fn resolvable(&self, id: &str) -> bool {
        if self.state.mocks.read().contains_key(id) {
            return true;
        }
        // A contextual override for the current consumer supplies the
        // identifier even when nothing else can.
        if self.state.contextual.has_binding_for_current(id) {
            return true;
        }
        let canonical = self.state.registry.canonical(id);
        self.state.registry.has_binding(&canonical)
            || self.state.registry.has_instance(&canonical)
            || self.state.introspector.is_instantiable(&canonical)
    }

    fn wrap_failure(&self, id: &str, err: ContainerError) -> ContainerError {
        if err.is_resolution_failed() || err.is_domain() {
            return err;
        }
        let mut chain = self.state.resolving.lock().clone();
        chain.push(id.to_string());
        ContainerError::ResolutionFailed(Box::new(ResolutionFailedError {
            id: id.to_string(),
            chain,
            suggestions: self.suggestion_hints(id),
            cause: err,
        }))
    }

    /// Suggestions derived from the identifier: what kind of thing is
    /// missing, plus similarly named registrations.
    fn suggestion_hints(&self, id: &str) -> Vec<String> {
        let mut hints = Vec::new();
        match self.state.introspector.class(id) {
            Ok(info) => match info.category() {
                ClassCategory::Interface => hints.push(format!(
                    "interface '{id}' is not bound to a concrete implementation"
                )),
                ClassCategory::Abstract => hints.push(format!(
                    "abstract class '{id}' is not bound to a concrete implementation"
                )),
                ClassCategory::Concrete => {}
            },
            Err(_) => {
                let canonical = self.state.registry.canonical(id);
                if !self.state.registry.has_binding(&canonical) {
                    hints.push(format!(
                        "class '{id}' is not registered with the introspector"
                    ));
                }
            }
        }
        hints.extend(
            self.similar_identifiers(id)
                .into_iter()
                .map(|s| format!("did you mean '{s}'?")),
        );
        hints
    }

    fn similar_identifiers(&self, id: &str) -> Vec<String> {
        let mut known = self.state.registry.known_identifiers();
        known.extend(self.state.introspector.class_names());
        let refs: Vec<&str> = known.iter().map(String::as_str).collect();
        suggest_similar(id, &refs, 3)
    }

    // ── Contextual bindings ──

    /// Starts a contextual binding:
    /// `when(consumer).needs(abstract).give(implementation)`.
    pub fn when(&self, consumer: &str) -> ContextualBuilder {
        ContextualBuilder::new(self.clone(), consumer)
    }

    pub(crate) fn contextual_bindings(&self) -> &ContextualBindings {
        &self.state.contextual
    }

    // ── Tags and multi-resolution ──

    /// Tags every identifier in `ids` with every tag in `tags`.
    pub fn tag(&self, ids: &[&str], tags: &[&str]) {
        self.state.tags.tag(ids, tags);
    }

    /// Resolves all members of `tag`, insertion order. Individual
    /// failures are logged and skipped rather than failing the batch.
    pub fn tagged(&self, tag: &str) -> Vec<Service> {
        let mut services = Vec::new();
        for id in self.state.tags.tagged_ids(tag) {
            match self.get(&id) {
                Ok(service) => services.push(service),
                Err(err) => {
                    warn!(tag, id = %id, error = %err, "Skipping tagged service");
                }
            }
        }
        services
    }

    /// Registers an explicit multi-binding for `resolve_all`.
    pub fn add_multi_binding(&self, id: &str, concrete: Concrete, priority: i32) {
        self.state.tags.add_multi_binding(id, concrete, priority);
    }

    /// Resolves every implementation of `id`:
    /// explicit multi-bindings (descending priority), then discovered
    /// concrete implementors, then services tagged with `id`,
    /// deduplicated in that order.
    pub fn resolve_all(&self, id: &str) -> Result<Vec<Service>> {
        enum Candidate {
            Concrete(Concrete),
            Identifier(String),
        }

        let mut order: indexmap::IndexMap<String, Candidate> = indexmap::IndexMap::new();

        for (index, entry) in self.state.tags.multi_bindings(id).into_iter().enumerate() {
            let key = entry
                .concrete
                .declared_class()
                .map(String::from)
                .unwrap_or_else(|| format!("{id}#closure{index}"));
            order.entry(key).or_insert(Candidate::Concrete(entry.concrete));
        }

        if self.state.options.read().auto_discovery {
            if let Ok(info) = self.state.introspector.class(id) {
                if matches!(
                    info.category(),
                    ClassCategory::Interface | ClassCategory::Abstract
                ) {
                    for class in self.state.introspector.implementors_of(id) {
                        if self.resolvable(&class) {
                            order
                                .entry(class.clone())
                                .or_insert(Candidate::Identifier(class));
                        }
                    }
                }
            }
        }

        for member in self.state.tags.tagged_ids(id) {
            order
                .entry(member.clone())
                .or_insert(Candidate::Identifier(member));
        }

        if order.is_empty() {
            return Ok(Vec::new());
        }

        let mut services = Vec::new();
        let mut failures: Vec<(String, ContainerError)> = Vec::new();
        for (key, candidate) in order {
            let resolved = match candidate {
                Candidate::Concrete(concrete) => self.construct_concrete(id, &concrete),
                Candidate::Identifier(target) => self.get(&target),
            };
            match resolved {
                Ok(service) => services.push(service),
                Err(err) => {
                    warn!(id, implementation = %key, error = %err, "Implementation failed to resolve");
                    failures.push((key, err));
                }
            }
        }

        if services.is_empty() {
            let suggestions = failures
                .iter()
                .map(|(key, err)| format!("'{key}' failed: {err}"))
                .collect();
            let cause = failures
                .into_iter()
                .next()
                .map(|(_, err)| err)
                .unwrap_or_else(|| ContainerError::not_found(id));
            return Err(ContainerError::ResolutionFailed(Box::new(
                ResolutionFailedError {
                    id: id.to_string(),
                    chain: self.state.resolving.lock().clone(),
                    suggestions,
                    cause,
                },
            )));
        }
        Ok(services)
    }

    // ── Decorators ──

    /// Registers a decorator for `id`. Lower priorities run first;
    /// equal priorities keep registration order.
    pub fn decorate(
        &self,
        id: &str,
        func: impl Fn(Service, &dyn Resolver) -> Result<Service> + Send + Sync + 'static,
        priority: i32,
    ) {
        self.state.decorators.add_decorator(id, Arc::new(func), priority);
    }

    /// Registers middleware for `id`; runs after all decorators, FIFO.
    pub fn middleware(
        &self,
        id: &str,
        func: impl Fn(Service, &dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) {
        self.state.decorators.add_middleware(id, Arc::new(func));
    }

    // ── Calls ──

    /// Invokes a callable, resolving its declared parameters from the
    /// container. `overrides` supplies values by parameter name.
    pub fn call(&self, callable: &Callable, overrides: &BTreeMap<String, Value>) -> Result<Value> {
        let args = self.bind_parameters("<callable>", &callable.params, Some(overrides))?;
        (callable.func)(args)
    }

    /// Invokes a static method registered on a class descriptor.
    pub fn call_static(
        &self,
        class: &str,
        method: &str,
        overrides: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let info = self.state.introspector.class(class)?;
        let method_info = info.method_info(method).cloned().ok_or_else(|| {
            ContainerError::NotFound(NotFoundError {
                requested: format!("{class}::{method}"),
                required_by: None,
                suggestions: Vec::new(),
            })
        })?;
        let args = self.bind_parameters(class, &method_info.params, Some(overrides))?;
        (method_info.invoke)(args)
    }

    // ── Scoped bindings ──

    /// Applies temporary bindings, runs `callback`, and restores the
    /// previous registry state on every exit path — including panic.
    pub fn scoped<R>(
        &self,
        bindings: Vec<(String, ScopedBinding)>,
        callback: impl FnOnce(&Container) -> Result<R>,
    ) -> Result<R> {
        let ids: Vec<&str> = bindings.iter().map(|(id, _)| id.as_str()).collect();
        let frame = RestoreFrame::capture(&self.state.registry, &ids);
        let _guard = ScopeGuard::new(Arc::clone(&self.state.registry), frame);

        debug!(overrides = bindings.len(), "Entering scoped bindings");
        for (id, binding) in bindings {
            self.apply_scoped(&id, binding)?;
        }
        callback(self)
    }

    fn apply_scoped(&self, id: &str, binding: ScopedBinding) -> Result<()> {
        match binding {
            ScopedBinding::Factory(factory) => self.bind(id, Concrete::Factory(factory), false),
            ScopedBinding::Class(class) => self.bind(id, Concrete::Class(class), false),
            ScopedBinding::Instance(service) => self.instance(id, service),
            ScopedBinding::Raw(Value::Str(class)) => {
                self.bind(id, Concrete::Class(class), false)
            }
            ScopedBinding::Raw(Value::Object(service)) => self.instance(id, service),
            ScopedBinding::Raw(other) => Err(ContainerError::InvalidBinding {
                id: id.to_string(),
                reason: format!("unsupported payload kind '{}'", other.type_label()),
            }),
        }
    }

    // ── Lazy, mocks, spies ──

    /// A lazy proxy that resolves `id` on first use.
    pub fn lazy(&self, id: &str) -> LazyService {
        LazyService::new(self.clone(), id)
    }

    /// Registers a mock returned for `id` ahead of every other source.
    pub fn mock(&self, id: &str, service: Service) {
        self.state.mocks.write().insert(id.to_string(), service);
    }

    pub fn clear_mocks(&self) {
        self.state.mocks.write().clear();
    }

    /// Marks `id` so every resolution is recorded in the history.
    pub fn spy(&self, id: &str) {
        self.state.history.spy(id);
    }

    pub fn resolution_history(&self) -> Vec<ResolutionRecord> {
        self.state.history.history()
    }

    // ── Hooks, providers, deferred resolution ──

    pub fn add_hook(&self, hook: Arc<dyn ResolutionHooks>) {
        self.state.hooks.add(hook);
    }

    pub fn add_provider(&self, provider: &dyn Provider) -> Result<()> {
        debug!(provider = provider.name(), "Registering provider");
        provider.register(self)
    }

    /// Registers the hook invoked once per unbound identifier; it may
    /// bind the identifier before resolution continues.
    pub fn set_deferred_resolver(&self, hook: impl Fn(&Container, &str) + Send + Sync + 'static) {
        *self.state.deferred.write() = Some(Arc::new(hook));
    }

    // ── Introspection surface ──

    /// All bindings in registration order.
    pub fn bindings(&self) -> Vec<BindingDescriptor> {
        self.state
            .registry
            .bindings_snapshot()
            .into_iter()
            .map(|(id, binding)| BindingDescriptor {
                id,
                concrete: binding.concrete.describe(),
                shared: binding.shared,
            })
            .collect()
    }

    /// Direct dependency identifiers of `id`'s concrete class.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        GraphWalker::new(&self.state.introspector, &self.state.registry).dependencies(id)
    }

    /// Statically validates the whole registry.
    pub fn validate(&self) -> ValidationReport {
        GraphWalker::new(&self.state.introspector, &self.state.registry).validate()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.state.metrics.snapshot()
    }

    // ── Compilation ──

    /// Registers a compiled factory for the `(id, class)` pair. A
    /// later `bind` of that pair substitutes the compiled factory for
    /// the reflective path.
    pub fn register_compiled(
        &self,
        id: &str,
        class: &str,
        factory: impl Fn(&dyn Resolver) -> Result<Service> + Send + Sync + 'static,
    ) {
        self.state
            .compiled
            .write()
            .insert((id.to_string(), class.to_string()), Arc::new(factory));
    }

    fn substitute_compiled(&self, id: &str, concrete: Concrete) -> Concrete {
        if let Concrete::Class(class) = &concrete {
            let key = (id.to_string(), class.clone());
            if let Some(factory) = self.state.compiled.read().get(&key) {
                debug!(id, class = %class, "Substituting compiled factory");
                return Concrete::TypedFactory {
                    class: class.clone(),
                    factory: Arc::clone(factory),
                };
            }
        }
        concrete
    }

    /// Compiles the registry to a specialized resolver source file.
    pub fn compile(&self, path: impl AsRef<Path>) -> Result<CompileSummary> {
        self.compile_with(path, CompilerOptions::default())
    }

    pub fn compile_with(
        &self,
        path: impl AsRef<Path>,
        options: CompilerOptions,
    ) -> Result<CompileSummary> {
        Compiler::new(self, options).compile(path.as_ref())
    }

    /// The deterministic fingerprint of the current registry.
    pub fn compilation_fingerprint(&self) -> String {
        Compiler::new(self, CompilerOptions::default()).fingerprint()
    }

    pub(crate) fn registry(&self) -> &Arc<BindingRegistry> {
        &self.state.registry
    }

    pub(crate) fn tag_registry(&self) -> &TagRegistry {
        &self.state.tags
    }

    pub(crate) fn decorator_registry(&self) -> &DecoratorChain {
        &self.state.decorators
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.state.registry.len())
            .field("classes", &self.state.introspector.len())
            .finish()
    }
}

impl Resolver for Container {
    fn resolve(&self, id: &str) -> Result<Service> {
        self.get(id)
    }

    fn construct(&self, class: &str) -> Result<Service> {
        self.construct_class(class)
    }

    fn invoke_constructor(&self, class: &str, args: Vec<Value>) -> Result<Service> {
        let info = self.state.introspector.class(class)?;
        let constructor = info.construct_fn().cloned().ok_or_else(|| {
            ContainerError::NotInstantiable(NotInstantiableError {
                class: class.to_string(),
                reason: "it has no registered constructor".to_string(),
            })
        })?;
        constructor(args)
    }
}

/// Pops the resolving stack on drop, on every exit path.
struct ResolvingGuard {
    stack: Arc<Mutex<Vec<String>>>,
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        self.stack.lock().pop();
    }
}

pub mod prelude {
    pub use super::{BindingDescriptor, Callable, Container, ContainerOptions};
    pub use crate::compiler::{CompileSummary, CompilerOptions};
    pub use crate::contextual::ContextualBuilder;
    pub use crate::error::{ContainerError, Result};
    pub use crate::events::ResolutionHooks;
    pub use crate::introspect::{ClassInfo, ParamInfo, TypeIntrospector, TypeKind};
    pub use crate::lazy::LazyService;
    pub use crate::provider::Provider;
    pub use crate::registry::{Concrete, Resolver};
    pub use crate::scope::ScopedBinding;
    pub use crate::value::{Service, Value};
}
