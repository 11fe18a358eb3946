//! Resolved services and the literal value domain.
//!
//! [`Service`] is what the container hands out: a type-erased object
//! tagged with the canonical class name it was constructed as.
//! [`Value`] is the argument domain for constructor parameters —
//! literal defaults plus resolved services.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased service object.
pub type Object = Arc<dyn Any + Send + Sync>;

/// A resolved service: the object plus the class name it was built as.
///
/// Cloning a `Service` is cheap (two `Arc` bumps) and preserves object
/// identity — [`Service::same_object`] compares the underlying pointers.
#[derive(Clone)]
pub struct Service {
    class: Arc<str>,
    object: Object,
}

impl Service {
    /// Wraps a freshly constructed object under `class`.
    pub fn new(class: impl AsRef<str>, object: impl Any + Send + Sync) -> Self {
        Self {
            class: Arc::from(class.as_ref()),
            object: Arc::new(object),
        }
    }

    /// Wraps an already type-erased object under `class`.
    pub fn from_object(class: impl AsRef<str>, object: Object) -> Self {
        Self {
            class: Arc::from(class.as_ref()),
            object,
        }
    }

    /// Builds a collection service from an ordered list of services.
    ///
    /// Used by tagged contextual bindings, where a consumer parameter
    /// receives a whole tag's worth of services at once.
    pub fn collection(services: Vec<Service>) -> Self {
        Self::new("collection", services)
    }

    /// The canonical class name this service was constructed as.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The type-erased object.
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Borrows the object as `T`, if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    /// Clones the object out as `Arc<T>`, if it is one.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    /// True if both services wrap the same underlying object.
    pub fn same_object(&self, other: &Service) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }

    /// Returns a service with the object replaced and the class kept.
    ///
    /// Decorators use this to swap the instance while preserving the
    /// identifier's class for later type checks.
    pub fn with_object(&self, object: Object) -> Self {
        Self {
            class: Arc::clone(&self.class),
            object,
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Literal values and resolved services, as constructor arguments.
///
/// Parameter defaults in class descriptors are the non-`Object`
/// variants; the resolver produces `Object` for service dependencies
/// and `Null` for nullable parameters it could not satisfy.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Service),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Service> {
        match self {
            Value::Object(s) => Some(s),
            _ => None,
        }
    }

    /// Consumes the value, returning the wrapped service if any.
    pub fn into_object(self) -> Option<Service> {
        match self {
            Value::Object(s) => Some(s),
            _ => None,
        }
    }

    /// Short label for error messages and the compiler.
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
        }
    }

    /// Renders a literal (non-object) value as Rust source text.
    ///
    /// Returns `None` for `Object`, which has no source form.
    pub fn render_literal(&self) -> Option<String> {
        match self {
            Value::Null => Some("Value::Null".to_string()),
            Value::Bool(b) => Some(format!("Value::Bool({b})")),
            Value::Int(i) => Some(format!("Value::Int({i})")),
            Value::Float(f) => Some(format!("Value::Float({f:?})")),
            Value::Str(s) => Some(format!("Value::Str({s:?}.to_string())")),
            Value::Object(_) => None,
        }
    }

    /// Stable text used by the compiler fingerprint.
    pub fn normalize(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("bool:{b}"),
            Value::Int(i) => format!("int:{i}"),
            Value::Float(f) => format!("float:{f:?}"),
            Value::Str(s) => format!("str:{s}"),
            Value::Object(s) => format!("object:{}", s.class()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same_object(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(s) => write!(f, "Object({})", s.class()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Service> for Value {
    fn from(v: Service) -> Self {
        Value::Object(v)
    }
}
