//! Static validation of the binding graph.
//!
//! Walks every binding's constructor metadata through the introspector
//! WITHOUT constructing anything:
//! - missing dependencies (with required-by and suggestions)
//! - registry-level cycles, reported with the full chain
//! - non-instantiable concretes
//!
//! Note that a cyclic *registry* is not necessarily a runtime error —
//! users may break the cycle with lazy proxies — so validation reports
//! issues instead of failing fast; the resolver only rejects cycles on
//! an actual call chain.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, instrument, warn};

use rabt_support::rendering::{render_chain, suggest_similar};

use crate::introspect::{TypeIntrospector, TypeKind};
use crate::registry::BindingRegistry;

/// One problem found during validation.
#[derive(Debug, Clone)]
pub enum ValidationIssue {
    /// A constructor parameter names a type nothing can supply.
    MissingDependency {
        consumer: String,
        dependency: String,
        suggestions: Vec<String>,
    },
    /// A parameter that can never be bound (builtin without default,
    /// untyped without default, intersection without fallback).
    UnresolvableParameter {
        class: String,
        parameter: String,
    },
    /// The binding graph contains a cycle.
    Cycle { chain: Vec<String> },
    /// A binding's concrete cannot be constructed.
    NotInstantiable {
        id: String,
        class: String,
        reason: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingDependency {
                consumer,
                dependency,
                suggestions,
            } => {
                write!(f, "'{consumer}' depends on unresolvable '{dependency}'")?;
                if !suggestions.is_empty() {
                    write!(f, " (did you mean: {})", suggestions.join(", "))?;
                }
                Ok(())
            }
            ValidationIssue::UnresolvableParameter { class, parameter } => {
                write!(f, "parameter '{parameter}' of '{class}' has no source")
            }
            ValidationIssue::Cycle { chain } => {
                write!(f, "dependency cycle: {}", render_chain(chain))
            }
            ValidationIssue::NotInstantiable { id, class, reason } => {
                write!(f, "'{id}' is bound to '{class}' which is not instantiable: {reason}")
            }
        }
    }
}

/// Everything `validate()` found.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i, ValidationIssue::Cycle { .. }))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "registry is valid");
        }
        writeln!(f, "{} issue(s) found:", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// Walks the static dependency graph.
///
/// Uses depth-first search with a visiting set for cycle detection and
/// a path for error reporting.
pub struct GraphWalker<'a> {
    introspector: &'a TypeIntrospector,
    registry: &'a BindingRegistry,
    visiting: HashSet<String>,
    validated: HashSet<String>,
    path: Vec<String>,
    issues: Vec<ValidationIssue>,
}

impl<'a> GraphWalker<'a> {
    pub fn new(introspector: &'a TypeIntrospector, registry: &'a BindingRegistry) -> Self {
        Self {
            introspector,
            registry,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Validates every registered binding.
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(mut self) -> ValidationReport {
        let ids: Vec<String> = self
            .registry
            .bindings_snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        debug!(bindings = ids.len(), "Starting binding graph validation");

        for id in ids {
            if !self.validated.contains(&id) {
                self.walk(&id);
            }
        }

        debug!(issues = self.issues.len(), "Binding graph validation done");
        ValidationReport {
            issues: self.issues,
        }
    }

    /// Direct dependency identifiers of `id`'s concrete class.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        let canonical = self.registry.canonical(id);
        let Some(class) = self.concrete_class(&canonical) else {
            return Vec::new();
        };
        let Ok(info) = self.introspector.class(&class) else {
            return Vec::new();
        };

        let mut deps = Vec::new();
        for param in info.params() {
            match &param.kind {
                TypeKind::Named(t) => deps.push(self.registry.canonical(t)),
                TypeKind::Union(members) => {
                    let chosen = members
                        .iter()
                        .find(|m| self.resolvable(m))
                        .or_else(|| members.first());
                    if let Some(member) = chosen {
                        deps.push(self.registry.canonical(member));
                    }
                }
                _ => {}
            }
        }
        deps
    }

    fn concrete_class(&self, id: &str) -> Option<String> {
        match self.registry.binding(id) {
            Some(binding) => binding
                .concrete
                .declared_class()
                .map(String::from)
                .or_else(|| {
                    matches!(binding.concrete, crate::registry::Concrete::SelfClass)
                        .then(|| id.to_string())
                }),
            None if self.introspector.contains(id) => Some(id.to_string()),
            None => None,
        }
    }

    fn resolvable(&self, id: &str) -> bool {
        let canonical = self.registry.canonical(id);
        self.registry.has_binding(&canonical)
            || self.registry.has_instance(&canonical)
            || self.introspector.is_instantiable(&canonical)
    }

    fn walk(&mut self, id: &str) {
        if self.validated.contains(id) {
            return;
        }

        if self.visiting.contains(id) {
            let cycle_start = self.path.iter().position(|k| k == id).unwrap_or(0);
            let mut chain: Vec<String> = self.path[cycle_start..].to_vec();
            chain.push(id.to_string());

            warn!(cycle = ?chain, "Registry cycle detected");
            self.issues.push(ValidationIssue::Cycle { chain });
            return;
        }

        // Instances satisfy the identifier without construction.
        if self.registry.has_instance(id) && !self.registry.has_binding(id) {
            self.validated.insert(id.to_string());
            return;
        }

        let Some(class) = self.concrete_class(id) else {
            // Opaque factory: nothing to check statically.
            self.validated.insert(id.to_string());
            return;
        };

        let info = match self.introspector.class(&class) {
            Ok(info) => info,
            Err(_) => {
                self.issues.push(ValidationIssue::NotInstantiable {
                    id: id.to_string(),
                    class,
                    reason: "no class descriptor registered".to_string(),
                });
                self.validated.insert(id.to_string());
                return;
            }
        };

        if let Some(problem) = info.instantiability_problem() {
            self.issues.push(ValidationIssue::NotInstantiable {
                id: id.to_string(),
                class: class.clone(),
                reason: problem.to_string(),
            });
            self.validated.insert(id.to_string());
            return;
        }

        self.visiting.insert(id.to_string());
        self.path.push(id.to_string());

        for param in info.params().to_vec() {
            let has_fallback = param.nullable || param.default.is_some();
            match &param.kind {
                TypeKind::Named(t) => {
                    if self.resolvable(t) {
                        let dep = self.registry.canonical(t);
                        self.walk(&dep);
                    } else if !has_fallback {
                        let suggestions = self.suggestions_for(t);
                        self.issues.push(ValidationIssue::MissingDependency {
                            consumer: class.clone(),
                            dependency: t.clone(),
                            suggestions,
                        });
                    }
                }
                TypeKind::Union(members) => {
                    if let Some(member) = members.iter().find(|m| self.resolvable(m)) {
                        let dep = self.registry.canonical(member);
                        self.walk(&dep);
                    } else if !has_fallback {
                        self.issues.push(ValidationIssue::MissingDependency {
                            consumer: class.clone(),
                            dependency: members.join("|"),
                            suggestions: Vec::new(),
                        });
                    }
                }
                TypeKind::Intersection(_) => {
                    if !has_fallback {
                        self.issues.push(ValidationIssue::UnresolvableParameter {
                            class: class.clone(),
                            parameter: param.name.clone(),
                        });
                    }
                }
                TypeKind::Builtin(_) | TypeKind::None => {
                    if !has_fallback {
                        self.issues.push(ValidationIssue::UnresolvableParameter {
                            class: class.clone(),
                            parameter: param.name.clone(),
                        });
                    }
                }
            }
        }

        self.path.pop();
        self.visiting.remove(id);
        self.validated.insert(id.to_string());
    }

    fn suggestions_for(&self, target: &str) -> Vec<String> {
        let mut known = self.registry.known_identifiers();
        known.extend(self.introspector.class_names());
        let known_refs: Vec<&str> = known.iter().map(String::as_str).collect();
        suggest_similar(target, &known_refs, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::{ClassInfo, ParamInfo};
    use crate::registry::{Binding, Concrete};
    use crate::value::Service;

    struct Stub;

    fn concrete_class(name: &str) -> ClassInfo {
        let owned = name.to_string();
        ClassInfo::concrete(name).constructor(move |_| Ok(Service::new(&owned, Stub)))
    }

    fn bind_class(registry: &BindingRegistry, id: &str, class: &str) {
        registry.bind(
            id,
            Binding {
                concrete: Concrete::Class(class.to_string()),
                shared: false,
            },
        );
    }

    #[test]
    fn valid_simple_graph() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(concrete_class("Database"));
        introspector.register(
            concrete_class("UserRepo").param(ParamInfo::named("db", "Database")),
        );
        bind_class(&registry, "db", "Database");
        introspector.register(ClassInfo::interface("Nothing"));
        bind_class(&registry, "repo", "UserRepo");

        let report = GraphWalker::new(&introspector, &registry).validate();
        assert!(report.is_clean(), "unexpected issues: {report}");
    }

    #[test]
    fn detect_registry_cycle() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(concrete_class("A").param(ParamInfo::named("b", "B")));
        introspector.register(concrete_class("B").param(ParamInfo::named("c", "C")));
        introspector.register(concrete_class("C").param(ParamInfo::named("a", "A")));
        bind_class(&registry, "A", "A");
        bind_class(&registry, "B", "B");
        bind_class(&registry, "C", "C");

        let report = GraphWalker::new(&introspector, &registry).validate();
        let cycle = report.cycles().next().expect("cycle not reported");
        match cycle {
            ValidationIssue::Cycle { chain } => assert!(chain.len() >= 4),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn detect_missing_dependency_with_suggestions() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(
            concrete_class("ReportJob").param(ParamInfo::named("logger", "LoggerX")),
        );
        introspector.register(concrete_class("Logger"));
        bind_class(&registry, "job", "ReportJob");

        let report = GraphWalker::new(&introspector, &registry).validate();
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            ValidationIssue::MissingDependency {
                consumer,
                dependency,
                suggestions,
            } => {
                assert_eq!(consumer, "ReportJob");
                assert_eq!(dependency, "LoggerX");
                assert!(suggestions.iter().any(|s| s == "Logger"));
            }
            other => panic!("expected missing dependency, got {other:?}"),
        }
    }

    #[test]
    fn nullable_missing_dependency_is_fine() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(
            concrete_class("Job").param(ParamInfo::named("logger", "Ghost").nullable()),
        );
        bind_class(&registry, "job", "Job");

        let report = GraphWalker::new(&introspector, &registry).validate();
        assert!(report.is_clean());
    }

    #[test]
    fn builtin_without_default_is_unresolvable() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(
            concrete_class("Job").param(ParamInfo::builtin("retries", "int")),
        );
        bind_class(&registry, "job", "Job");

        let report = GraphWalker::new(&introspector, &registry).validate();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0],
            ValidationIssue::UnresolvableParameter { .. }
        ));
    }

    #[test]
    fn binding_to_interface_is_not_instantiable() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(ClassInfo::interface("Logger"));
        bind_class(&registry, "logger", "Logger");

        let report = GraphWalker::new(&introspector, &registry).validate();
        assert!(matches!(
            report.issues[0],
            ValidationIssue::NotInstantiable { .. }
        ));
    }

    #[test]
    fn dependencies_lists_direct_deps() {
        let introspector = TypeIntrospector::new();
        let registry = BindingRegistry::new();

        introspector.register(concrete_class("Database"));
        introspector.register(concrete_class("Cache"));
        introspector.register(
            concrete_class("App")
                .param(ParamInfo::named("db", "Database"))
                .param(ParamInfo::named("cache", "Cache"))
                .param(ParamInfo::builtin("level", "int").default_value(1i64)),
        );
        bind_class(&registry, "app", "App");

        let walker = GraphWalker::new(&introspector, &registry);
        assert_eq!(
            walker.dependencies("app"),
            vec!["Database".to_string(), "Cache".to_string()]
        );
    }
}
