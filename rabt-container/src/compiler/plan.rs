//! Compilation plan construction.
//!
//! A binding is compilable iff it has no decorators, no contextual
//! overrides, is not tagged at top level, and its concrete identifies
//! a class (a class name, a self-binding, or a typed factory). Every
//! constructor parameter must be statically resolvable: service
//! dependencies with known classes, or literals with defaults or
//! nullability. Cycles abort the binding, not the compilation.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use super::CompileInputs;
use crate::container::Container;
use crate::introspect::TypeKind;
use crate::registry::Concrete;
use crate::value::Value;

/// One planned constructor argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgPlan {
    /// Resolve the identifier through the container at runtime.
    Get(String),
    /// A literal default (or null for a nullable parameter).
    Literal(Value),
}

/// One factory function to emit.
#[derive(Debug, Clone)]
pub struct ClassPlan {
    pub class: String,
    pub method: String,
    pub args: Vec<ArgPlan>,
}

/// One binding the compiled resolver re-registers.
#[derive(Debug, Clone)]
pub struct CompiledBinding {
    pub id: String,
    pub class: String,
    pub shared: bool,
}

/// The full compilation plan.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Factory functions keyed by class, dependency-first order.
    pub factories: IndexMap<String, ClassPlan>,
    pub bindings: Vec<CompiledBinding>,
    /// `(identifier, reason)` for every refused binding.
    pub skipped: Vec<(String, String)>,
}

/// Deterministic factory-method name: a stable hash of the class name
/// so output is reproducible across runs.
pub fn method_name(class: &str) -> String {
    let digest = super::fingerprint::sha256_hex(class);
    format!("factory_{}", &digest[..12])
}

pub(crate) fn build(container: &Container, inputs: &CompileInputs) -> Plan {
    let mut plan = Plan::default();

    for (id, binding) in &inputs.bindings {
        if inputs.decorated.contains(id) {
            plan.skipped
                .push((id.clone(), "has decorators or middleware".to_string()));
            continue;
        }
        if inputs.overridden.contains(id) {
            plan.skipped
                .push((id.clone(), "has contextual overrides".to_string()));
            continue;
        }
        if container.tag_registry().is_tagged(id) {
            plan.skipped.push((id.clone(), "is tagged".to_string()));
            continue;
        }

        let class = match &binding.concrete {
            Concrete::SelfClass => id.clone(),
            Concrete::Class(class) => class.clone(),
            Concrete::TypedFactory { class, .. } => class.clone(),
            Concrete::Factory(_) => {
                plan.skipped.push((
                    id.clone(),
                    "opaque factory with no declared class".to_string(),
                ));
                continue;
            }
        };

        // Depth-first walk into a local schedule; committed only when
        // the whole subtree is compilable.
        let mut local: IndexMap<String, ClassPlan> = IndexMap::new();
        let mut visiting = HashSet::new();
        match schedule(container, inputs, &plan.factories, &mut local, &mut visiting, &class) {
            Ok(()) => {
                for (class, class_plan) in local {
                    plan.factories.entry(class).or_insert(class_plan);
                }
                plan.bindings.push(CompiledBinding {
                    id: id.clone(),
                    class,
                    shared: binding.shared,
                });
            }
            Err(reason) => {
                trace!(id = %id, reason = %reason, "Binding not compilable");
                plan.skipped.push((id.clone(), reason));
            }
        }
    }

    plan
}

/// The statically known class behind an identifier, if any.
fn static_class_of(container: &Container, id: &str) -> Option<String> {
    let canonical = container.registry().canonical(id);
    match container.registry().binding(&canonical) {
        Some(binding) => match binding.concrete {
            Concrete::SelfClass => Some(canonical),
            Concrete::Class(class) => Some(class),
            Concrete::TypedFactory { class, .. } => Some(class),
            Concrete::Factory(_) => None,
        },
        None if container.introspector().is_instantiable(&canonical) => Some(canonical),
        None => None,
    }
}

fn schedule(
    container: &Container,
    inputs: &CompileInputs,
    committed: &IndexMap<String, ClassPlan>,
    local: &mut IndexMap<String, ClassPlan>,
    visiting: &mut HashSet<String>,
    class: &str,
) -> std::result::Result<(), String> {
    if committed.contains_key(class) || local.contains_key(class) {
        return Ok(());
    }
    if visiting.contains(class) {
        return Err(format!("dependency cycle through '{class}'"));
    }
    // Compiled factories skip the context-stack push, so a class with
    // contextual consumer bindings would lose its overrides.
    if inputs.consumers.contains(class) {
        return Err(format!("'{class}' is a contextual consumer"));
    }
    visiting.insert(class.to_string());

    let info = container
        .introspector()
        .class(class)
        .map_err(|_| format!("no class descriptor for '{class}'"))?;
    if !info.is_instantiable() {
        return Err(format!("'{class}' is not instantiable"));
    }

    let mut args = Vec::with_capacity(info.params().len());
    for param in info.params() {
        let fallback = || -> Option<ArgPlan> {
            if let Some(default) = &param.default {
                Some(ArgPlan::Literal(default.clone()))
            } else if param.nullable {
                Some(ArgPlan::Literal(Value::Null))
            } else {
                None
            }
        };

        match &param.kind {
            TypeKind::Named(ty) => match static_class_of(container, ty) {
                Some(dep_class) => {
                    schedule(container, inputs, committed, local, visiting, &dep_class)?;
                    args.push(ArgPlan::Get(ty.clone()));
                }
                None => match fallback() {
                    Some(arg) => args.push(arg),
                    None => {
                        return Err(format!(
                            "parameter '{}' of '{class}': '{ty}' is not statically resolvable",
                            param.name
                        ));
                    }
                },
            },
            // Literal parameters compile only through a default or
            // nullability; union and intersection likewise.
            TypeKind::None
            | TypeKind::Builtin(_)
            | TypeKind::Union(_)
            | TypeKind::Intersection(_) => match fallback() {
                Some(arg) => args.push(arg),
                None => {
                    return Err(format!(
                        "parameter '{}' of '{class}' has no static source",
                        param.name
                    ));
                }
            },
        }
    }

    visiting.remove(class);
    local.insert(
        class.to_string(),
        ClassPlan {
            class: class.to_string(),
            method: method_name(class),
            args,
        },
    );
    Ok(())
}
