//! The type introspector — registered constructor metadata.
//!
//! Rust has no runtime constructor reflection, so classes announce
//! themselves: a [`ClassInfo`] descriptor carries the ordered
//! constructor parameter list, the interfaces the class satisfies, a
//! construction function that receives already-resolved arguments, and
//! an optional method table for static calls.
//!
//! The cache is read-mostly; [`TypeIntrospector::evict`] drops a
//! class's constructor record together with its method records.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{ContainerError, NotFoundError, Result};
use crate::value::{Service, Value};

/// Construction function: receives resolved arguments in declaration
/// order and returns the finished service.
pub type ConstructFn = Arc<dyn Fn(Vec<Value>) -> Result<Service> + Send + Sync>;

/// Static method function: resolved arguments in, a value out.
pub type MethodFn = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

/// Configure hook invoked by configured contextual bindings.
pub type ConfigureFn =
    Arc<dyn Fn(&Service, &BTreeMap<String, Value>) -> Result<()> + Send + Sync>;

/// What kind of type a constructor parameter declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// No type declaration at all.
    None,
    /// A builtin scalar type (int, string, ...). Never resolved from
    /// the container.
    Builtin(String),
    /// A named class or interface, resolvable through the container.
    Named(String),
    /// Union of named types, scanned in declaration order.
    Union(Vec<String>),
    /// Intersection of named types. Only satisfiable by default/null.
    Intersection(Vec<String>),
}

/// One constructor (or method) parameter.
#[derive(Clone)]
pub struct ParamInfo {
    pub name: String,
    pub kind: TypeKind,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ParamInfo {
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::None,
            nullable: false,
            default: None,
        }
    }

    pub fn builtin(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Builtin(ty.into()),
            nullable: false,
            default: None,
        }
    }

    pub fn named(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Named(ty.into()),
            nullable: false,
            default: None,
        }
    }

    pub fn union(name: impl Into<String>, members: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Union(members.into_iter().map(String::from).collect()),
            nullable: false,
            default: None,
        }
    }

    pub fn intersection(name: impl Into<String>, members: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Intersection(members.into_iter().map(String::from).collect()),
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl fmt::Debug for ParamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("default", &self.default)
            .finish()
    }
}

/// Whether a class can be constructed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassCategory {
    Concrete,
    Abstract,
    Interface,
}

/// A registered static method.
#[derive(Clone)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub invoke: MethodFn,
}

/// Everything the container knows about one class.
///
/// Built fluently:
/// ```rust,ignore
/// ClassInfo::concrete("ConsoleLogger")
///     .implements("Logger")
///     .param(ParamInfo::named("sink", "Sink"))
///     .constructor(|args| { ... })
/// ```
#[derive(Clone)]
pub struct ClassInfo {
    name: String,
    category: ClassCategory,
    implements: Vec<String>,
    params: Vec<ParamInfo>,
    construct: Option<ConstructFn>,
    methods: HashMap<String, MethodInfo>,
    configure: Option<ConfigureFn>,
}

impl ClassInfo {
    pub fn concrete(name: impl Into<String>) -> Self {
        Self::with_category(name, ClassCategory::Concrete)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_category(name, ClassCategory::Interface)
    }

    pub fn abstract_class(name: impl Into<String>) -> Self {
        Self::with_category(name, ClassCategory::Abstract)
    }

    fn with_category(name: impl Into<String>, category: ClassCategory) -> Self {
        Self {
            name: name.into(),
            category,
            implements: Vec::new(),
            params: Vec::new(),
            construct: None,
            methods: HashMap::new(),
            configure: None,
        }
    }

    /// Declares that this class satisfies `interface`.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Appends a constructor parameter (declaration order).
    pub fn param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    /// Registers the construction function.
    pub fn constructor(
        mut self,
        f: impl Fn(Vec<Value>) -> Result<Service> + Send + Sync + 'static,
    ) -> Self {
        self.construct = Some(Arc::new(f));
        self
    }

    /// Registers a static method.
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: Vec<ParamInfo>,
        f: impl Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.methods.insert(
            name.clone(),
            MethodInfo {
                name,
                params,
                invoke: Arc::new(f),
            },
        );
        self
    }

    /// Registers the configure hook used by configured contextual
    /// bindings.
    pub fn configurable(
        mut self,
        f: impl Fn(&Service, &BTreeMap<String, Value>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.configure = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ClassCategory {
        self.category
    }

    pub fn interfaces(&self) -> &[String] {
        &self.implements
    }

    pub fn params(&self) -> &[ParamInfo] {
        &self.params
    }

    pub fn construct_fn(&self) -> Option<&ConstructFn> {
        self.construct.as_ref()
    }

    pub fn configure_fn(&self) -> Option<&ConfigureFn> {
        self.configure.as_ref()
    }

    pub fn method_info(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.get(name)
    }

    /// A class is instantiable when it is concrete and has a
    /// registered construction function.
    pub fn is_instantiable(&self) -> bool {
        self.category == ClassCategory::Concrete && self.construct.is_some()
    }

    /// True if this class declares that it satisfies `interface`.
    pub fn satisfies(&self, interface: &str) -> bool {
        self.name == interface || self.implements.iter().any(|i| i == interface)
    }

    /// Why this class cannot be constructed; used for error messages.
    pub fn instantiability_problem(&self) -> Option<&'static str> {
        match self.category {
            ClassCategory::Interface => Some("it is an interface"),
            ClassCategory::Abstract => Some("it is an abstract class"),
            ClassCategory::Concrete if self.construct.is_none() => {
                Some("it has no registered constructor")
            }
            ClassCategory::Concrete => None,
        }
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("implements", &self.implements)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Caches class descriptors keyed by canonical name.
///
/// Registration order is preserved so auto-discovery walks classes in
/// declaration order.
pub struct TypeIntrospector {
    classes: RwLock<IndexMap<String, Arc<ClassInfo>>>,
}

impl TypeIntrospector {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(IndexMap::new()),
        }
    }

    /// Registers (or replaces) a class descriptor.
    pub fn register(&self, info: ClassInfo) {
        debug!(class = %info.name(), "Registered class descriptor");
        self.classes
            .write()
            .insert(info.name().to_string(), Arc::new(info));
    }

    /// Looks up a class descriptor.
    pub fn class(&self, name: &str) -> Result<Arc<ClassInfo>> {
        trace!(class = name, "Introspector lookup");
        self.classes.read().get(name).cloned().ok_or_else(|| {
            ContainerError::NotFound(NotFoundError {
                requested: name.to_string(),
                required_by: None,
                suggestions: Vec::new(),
            })
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// The constructor parameter list of `name`, declaration order.
    pub fn constructor_params(&self, name: &str) -> Result<Vec<ParamInfo>> {
        Ok(self.class(name)?.params().to_vec())
    }

    /// The parameter list of a registered static method.
    pub fn method_params(&self, class: &str, method: &str) -> Result<Vec<ParamInfo>> {
        let info = self.class(class)?;
        let method_info = info.method_info(method).ok_or_else(|| {
            ContainerError::NotFound(NotFoundError {
                requested: format!("{class}::{method}"),
                required_by: None,
                suggestions: Vec::new(),
            })
        })?;
        Ok(method_info.params.clone())
    }

    pub fn is_instantiable(&self, name: &str) -> bool {
        self.classes
            .read()
            .get(name)
            .map(|c| c.is_instantiable())
            .unwrap_or(false)
    }

    /// Drops a class's constructor record together with its method
    /// records.
    pub fn evict(&self, name: &str) {
        if self.classes.write().shift_remove(name).is_some() {
            debug!(class = name, "Evicted class descriptor");
        }
    }

    /// All registered class names, declaration order.
    pub fn class_names(&self) -> Vec<String> {
        self.classes.read().keys().cloned().collect()
    }

    /// Concrete classes declaring that they satisfy `interface`,
    /// declaration order.
    pub fn implementors_of(&self, interface: &str) -> Vec<String> {
        self.classes
            .read()
            .values()
            .filter(|c| {
                c.name() != interface && c.is_instantiable() && c.satisfies(interface)
            })
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl Default for TypeIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeIntrospector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeIntrospector")
            .field("classes", &self.len())
            .finish()
    }
}
