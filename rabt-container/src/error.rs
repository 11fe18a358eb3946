//! Error types for Rabt container operations.
//!
//! Rabt provides detailed, actionable error messages with resolving
//! chains and "did you mean?" suggestions.

use std::fmt;

use rabt_support::rendering::render_chain;

/// Main error type for all Rabt operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Identifier has no binding, instance, or resolvable class.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Identifier exists but cannot be constructed.
    #[error("{}", .0)]
    NotInstantiable(NotInstantiableError),

    /// A constructor parameter cannot be supplied from any source.
    #[error("{}", .0)]
    Unresolvable(UnresolvableError),

    /// Identifier reappeared on the current resolving stack.
    #[error("{}", .0)]
    Circular(CircularError),

    /// Instance registration or provided parameter violates the declared type.
    #[error("{}", .0)]
    TypeMismatch(TypeMismatchError),

    /// Scoped or contextual binding carries an unsupported payload kind.
    #[error("Invalid binding for '{id}': {reason}")]
    InvalidBinding { id: String, reason: String },

    /// Builder methods called out of order, or compile attempted while
    /// validation fails.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// The compiler cannot write or cannot serialize the plan.
    #[error("{}", .0)]
    CompilationFailed(CompilationFailedError),

    /// A factory or constructor failed while producing its value.
    #[error("Failed to construct {class}: {source}")]
    Construction {
        class: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Catch-all wrapper carrying the resolving chain and suggestions.
    #[error("{}", .0)]
    ResolutionFailed(Box<ResolutionFailedError>),
}

/// Error when an identifier could not be located anywhere.
#[derive(Debug)]
pub struct NotFoundError {
    /// The identifier that was requested
    pub requested: String,
    /// What required this identifier (if known)
    pub required_by: Option<String>,
    /// Similar identifiers that ARE registered
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier not found: '{}'", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: bind '{}' or register its class descriptor",
            self.requested
        )
    }
}

/// Error when an identifier names something that cannot be constructed.
#[derive(Debug)]
pub struct NotInstantiableError {
    pub class: String,
    /// Why construction is impossible (interface, abstract, no constructor)
    pub reason: String,
}

impl fmt::Display for NotInstantiableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not instantiable: {}", self.class, self.reason)?;
        write!(
            f,
            "\n  Hint: bind '{}' to a concrete implementation",
            self.class
        )
    }
}

/// Error when a constructor parameter has no source.
#[derive(Debug)]
pub struct UnresolvableError {
    /// The class being constructed
    pub class: String,
    /// The offending parameter
    pub parameter: String,
    pub reason: String,
}

impl fmt::Display for UnresolvableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unresolvable parameter '{}' of '{}': {}",
            self.parameter, self.class, self.reason
        )?;
        write!(
            f,
            "\n  Hint: give the parameter a default, mark it nullable, or bind its type"
        )
    }
}

/// Error when a circular resolution is detected.
///
/// Shows the full resolving chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularError {
    /// The chain of identifiers that forms the cycle.
    /// Example: ["A", "B", "A"]
    pub chain: Vec<String>,
}

impl fmt::Display for CircularError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  ")?;
        write!(f, "{}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: break the cycle with a lazy proxy or a factory binding"
        )
    }
}

/// Error when a registered instance does not satisfy the identifier's type.
#[derive(Debug)]
pub struct TypeMismatchError {
    pub id: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type mismatch for '{}': expected {}, got {}",
            self.id, self.expected, self.actual
        )
    }
}

/// Error raised by the ahead-of-time compiler.
#[derive(Debug, thiserror::Error)]
#[error("Compilation failed during {stage}: {detail}")]
pub struct CompilationFailedError {
    /// Which compile stage failed ("plan", "emit", "lock", "write")
    pub stage: String,
    pub detail: String,
    #[source]
    pub source: Option<std::io::Error>,
}

/// Catch-all resolution wrapper.
///
/// Carries the identifier, a snapshot of the resolving stack at failure
/// time, derived suggestions, and the underlying cause.
#[derive(Debug)]
pub struct ResolutionFailedError {
    pub id: String,
    pub chain: Vec<String>,
    pub suggestions: Vec<String>,
    pub cause: ContainerError,
}

impl fmt::Display for ResolutionFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolution of '{}' failed: {}", self.id, self.cause)?;

        if !self.chain.is_empty() {
            write!(f, "\n  While resolving: {}", render_chain(&self.chain))?;
        }

        for suggestion in &self.suggestions {
            write!(f, "\n  Suggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ResolutionFailedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl ContainerError {
    /// Shorthand for a bare [`NotFoundError`].
    pub fn not_found(requested: impl Into<String>) -> Self {
        ContainerError::NotFound(NotFoundError {
            requested: requested.into(),
            required_by: None,
            suggestions: Vec::new(),
        })
    }

    /// Shorthand for a construction failure with a message-only source.
    pub fn construction(class: impl Into<String>, message: impl Into<String>) -> Self {
        ContainerError::Construction {
            class: class.into(),
            source: message.into().into(),
        }
    }

    /// True if this error is already the resolution wrapper.
    pub fn is_resolution_failed(&self) -> bool {
        matches!(self, ContainerError::ResolutionFailed(_))
    }

    /// True if this error is a domain error that must surface unchanged
    /// rather than being wrapped by the resolver.
    pub fn is_domain(&self) -> bool {
        !matches!(self, ContainerError::Construction { .. })
    }
}

/// Convenient Result type for Rabt operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_display() {
        let err = ContainerError::NotFound(NotFoundError {
            requested: "logger".to_string(),
            required_by: Some("ReportJob".to_string()),
            suggestions: vec!["file_logger".to_string()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("not found"));
        assert!(msg.contains("logger"));
        assert!(msg.contains("ReportJob"));
        assert!(msg.contains("file_logger"));
    }

    #[test]
    fn circular_error_display() {
        let err = ContainerError::Circular(CircularError {
            chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Circular"));
        assert!(msg.contains("A -> B -> A"));
    }

    #[test]
    fn unresolvable_error_display() {
        let err = ContainerError::Unresolvable(UnresolvableError {
            class: "ReportJob".to_string(),
            parameter: "retries".to_string(),
            reason: "builtin parameter without a default".to_string(),
        });

        let msg = format!("{err}");
        assert!(msg.contains("retries"));
        assert!(msg.contains("ReportJob"));
        assert!(msg.contains("default"));
    }

    #[test]
    fn resolution_failed_display_carries_chain_and_cause() {
        let err = ContainerError::ResolutionFailed(Box::new(ResolutionFailedError {
            id: "mailer".to_string(),
            chain: vec!["app".to_string(), "mailer".to_string()],
            suggestions: vec!["interface 'mailer' is not bound".to_string()],
            cause: ContainerError::not_found("smtp"),
        }));

        let msg = format!("{err}");
        assert!(msg.contains("Resolution of 'mailer' failed"));
        assert!(msg.contains("app -> mailer"));
        assert!(msg.contains("Suggestion:"));
        assert!(msg.contains("smtp"));
    }

    #[test]
    fn domain_classification() {
        assert!(ContainerError::not_found("x").is_domain());
        assert!(!ContainerError::construction("X", "boom").is_domain());
        assert!(!ContainerError::not_found("x").is_resolution_failed());
    }

    #[test]
    fn compilation_failed_display() {
        let err = ContainerError::CompilationFailed(CompilationFailedError {
            stage: "write".to_string(),
            detail: "disk full".to_string(),
            source: None,
        });
        let msg = format!("{err}");
        assert!(msg.contains("write"));
        assert!(msg.contains("disk full"));
    }
}
