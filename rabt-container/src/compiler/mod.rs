//! Ahead-of-time compilation of the binding graph.
//!
//! The compiler analyzes the registry and emits Rust source for a
//! specialized resolver: one pre-planned factory function per
//! compilable class, plus an `install` function that re-registers
//! bindings, aliases, and contextual bindings on a fresh container.
//! Compiled factories call `invoke_constructor` with fully planned
//! arguments, so no parameter introspection happens at runtime.

mod emit;
mod fingerprint;
mod plan;

pub use plan::{ArgPlan, ClassPlan, CompiledBinding, Plan};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::container::Container;
use crate::contextual::Implementation;
use crate::error::{ContainerError, Result};
use crate::registry::Binding;

/// Options controlling compilation.
///
/// Everything except `validate` participates in the fingerprint.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Name stamped into the generated header.
    pub class_name: String,
    /// Module namespace stamped into the generated header.
    pub namespace: String,
    /// Refuse to compile while `validate()` reports issues.
    pub validate: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            class_name: "CompiledResolver".to_string(),
            namespace: "compiled".to_string(),
            validate: true,
        }
    }
}

/// What a successful compile produced.
#[derive(Debug, Clone)]
pub struct CompileSummary {
    pub path: PathBuf,
    pub fingerprint: String,
    pub total_bindings: usize,
    pub compiled_bindings: usize,
    pub compiled_classes: usize,
    pub aliases: usize,
    pub contextual_bindings: usize,
    /// Bindings refused with the reason, for diagnostics.
    pub skipped: Vec<(String, String)>,
}

/// Snapshot of everything the compiler reads from the container.
pub(crate) struct CompileInputs {
    pub bindings: Vec<(String, Binding)>,
    pub aliases: Vec<(String, String)>,
    pub contextual: Vec<(String, String, Implementation)>,
    pub decorated: HashSet<String>,
    pub overridden: HashSet<String>,
    /// Classes appearing as contextual consumers. Compiled factories
    /// never push a construction context, so these classes must keep
    /// the reflective path.
    pub consumers: HashSet<String>,
}

impl CompileInputs {
    fn snapshot(container: &Container) -> Self {
        let contextual = container.contextual_bindings().snapshot();
        let consumers = contextual
            .iter()
            .map(|(consumer, _, _)| consumer.clone())
            .collect();
        Self {
            bindings: container.registry().bindings_snapshot(),
            aliases: container.registry().aliases_snapshot(),
            contextual,
            decorated: container
                .decorator_registry()
                .decorated_ids()
                .into_iter()
                .collect(),
            overridden: container
                .contextual_bindings()
                .overridden_ids()
                .into_iter()
                .collect(),
            consumers,
        }
    }
}

/// Compiles one container's registry.
pub struct Compiler<'a> {
    container: &'a Container,
    options: CompilerOptions,
}

impl<'a> Compiler<'a> {
    pub fn new(container: &'a Container, options: CompilerOptions) -> Self {
        Self { container, options }
    }

    /// SHA-256 fingerprint over the normalized inputs. Two
    /// semantically equal registries yield the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let inputs = CompileInputs::snapshot(self.container);
        fingerprint::compute(&inputs, &self.options)
    }

    /// Builds the plan and atomically emits the specialized resolver.
    #[instrument(skip(self), name = "compile", fields(path = %path.display()))]
    pub fn compile(&self, path: &Path) -> Result<CompileSummary> {
        if self.options.validate {
            let report = self.container.validate();
            if !report.is_clean() {
                return Err(ContainerError::InvalidUsage(format!(
                    "compile refused while validation fails: {report}"
                )));
            }
        }

        let inputs = CompileInputs::snapshot(self.container);
        let plan = plan::build(self.container, &inputs);
        let fingerprint = fingerprint::compute(&inputs, &self.options);

        debug!(
            compiled = plan.bindings.len(),
            classes = plan.factories.len(),
            skipped = plan.skipped.len(),
            "Compilation plan ready"
        );

        let source = emit::render(&plan, &inputs, &self.options, &fingerprint);
        emit::write_atomic(path, &source)?;

        Ok(CompileSummary {
            path: path.to_path_buf(),
            fingerprint,
            total_bindings: inputs.bindings.len(),
            compiled_bindings: plan.bindings.len(),
            compiled_classes: plan.factories.len(),
            aliases: inputs.aliases.len(),
            contextual_bindings: inputs.contextual.len(),
            skipped: plan.skipped.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::{ClassInfo, ParamInfo};
    use crate::value::Service;
    use tempfile::TempDir;

    struct Stub;

    fn concrete(name: &str) -> ClassInfo {
        let owned = name.to_string();
        ClassInfo::concrete(name).constructor(move |_| Ok(Service::new(&owned, Stub)))
    }

    fn sample_container() -> Container {
        let container = Container::new();
        container.register_class(concrete("ConsoleLogger").implements("Logger"));
        container.register_class(
            concrete("ReportJob")
                .param(ParamInfo::named("logger", "logger"))
                .param(ParamInfo::builtin("retries", "int").default_value(3i64)),
        );
        container.bind_shared("logger", "ConsoleLogger").unwrap();
        container.bind_class("job", "ReportJob", false).unwrap();
        container.alias("log", "logger").unwrap();
        container
    }

    #[test]
    fn compile_writes_resolver_source() {
        let container = sample_container();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");

        let summary = container.compile(&path).unwrap();
        assert_eq!(summary.total_bindings, 2);
        assert_eq!(summary.compiled_bindings, 2);
        assert_eq!(summary.compiled_classes, 2);
        assert_eq!(summary.aliases, 1);
        assert!(summary.skipped.is_empty());

        let source = std::fs::read_to_string(&path).unwrap();
        assert!(source.contains("pub fn install(container: &Container)"));
        assert!(source.contains(&format!("\"{}\"", summary.fingerprint)));
        assert!(source.contains("register_compiled"));
        assert!(source.contains("container.alias(\"log\", \"logger\")?;"));
        assert!(source.contains(&plan::method_name("ConsoleLogger")));
        assert!(source.contains("Value::Int(3)"));
    }

    #[test]
    fn compile_refuses_while_validation_fails() {
        let container = Container::new();
        container.register_class(
            concrete("Broken").param(ParamInfo::named("dep", "Missing")),
        );
        container.bind_class("broken", "Broken", false).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");
        match container.compile(&path) {
            Err(ContainerError::InvalidUsage(msg)) => {
                assert!(msg.contains("validation"));
            }
            other => panic!("expected InvalidUsage, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn validation_toggle_can_be_disabled() {
        let container = Container::new();
        container.register_class(
            concrete("Broken").param(ParamInfo::named("dep", "Missing")),
        );
        container.bind_class("broken", "Broken", false).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");
        let options = CompilerOptions {
            validate: false,
            ..CompilerOptions::default()
        };
        let summary = container.compile_with(&path, options).unwrap();
        // The broken binding is skipped rather than compiled.
        assert_eq!(summary.compiled_bindings, 0);
        assert_eq!(summary.skipped.len(), 1);
        assert!(path.exists());
    }

    #[test]
    fn decorated_bindings_are_skipped() {
        let container = sample_container();
        container.decorate("job", |svc, _| Ok(svc), 1);

        let dir = TempDir::new().unwrap();
        let summary = container.compile(dir.path().join("resolver.rs")).unwrap();
        assert_eq!(summary.compiled_bindings, 1);
        assert!(summary
            .skipped
            .iter()
            .any(|(id, reason)| id == "job" && reason.contains("decorator")));
    }

    #[test]
    fn contextual_overrides_exclude_the_identifier() {
        let container = sample_container();
        container.register_class(concrete("FileLogger").implements("Logger"));
        container
            .when("ReportJob")
            .needs("logger")
            .give("FileLogger")
            .unwrap();

        let dir = TempDir::new().unwrap();
        let summary = container.compile(dir.path().join("resolver.rs")).unwrap();
        assert!(summary
            .skipped
            .iter()
            .any(|(id, reason)| id == "logger" && reason.contains("contextual")));
        assert_eq!(summary.contextual_bindings, 1);

        let source = std::fs::read_to_string(dir.path().join("resolver.rs")).unwrap();
        assert!(source.contains(
            "container.when(\"ReportJob\").needs(\"logger\").give(\"FileLogger\")?;"
        ));
    }

    #[test]
    fn fingerprint_matches_summary() {
        let container = sample_container();
        let fingerprint = container.compilation_fingerprint();

        let dir = TempDir::new().unwrap();
        let summary = container.compile(dir.path().join("resolver.rs")).unwrap();
        assert_eq!(summary.fingerprint, fingerprint);
    }
}
