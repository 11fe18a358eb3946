//! Source emission and atomic file replacement.
//!
//! The output file is written under an exclusive advisory lock on
//! `<output>.lock`, through a uniquely named temporary file in the
//! same directory that is renamed onto the final path. On any failure
//! the final path is unchanged and the temporary file is removed.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use tracing::debug;

use super::plan::{ArgPlan, Plan};
use super::{CompileInputs, CompilerOptions};
use crate::contextual::Implementation;
use crate::error::{CompilationFailedError, ContainerError, Result};

pub(crate) fn render(
    plan: &Plan,
    inputs: &CompileInputs,
    options: &CompilerOptions,
    fingerprint: &str,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "//! @generated by the rabt compiler -- do not edit.");
    let _ = writeln!(out, "//!");
    let _ = writeln!(
        out,
        "//! Resolver: {}::{}",
        options.namespace, options.class_name
    );
    let _ = writeln!(
        out,
        "//! Compiled bindings construct through pre-planned factories and"
    );
    let _ = writeln!(out, "//! bypass parameter introspection at runtime.");
    let _ = writeln!(out);

    let needs_btreemap = inputs
        .contextual
        .iter()
        .any(|(_, _, imp)| matches!(imp, Implementation::Configured { .. }));
    if needs_btreemap {
        let _ = writeln!(out, "use std::collections::BTreeMap;");
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "use rabt_container::prelude::*;");
    let _ = writeln!(out);

    let _ = writeln!(out, "pub const GENERATED_AT: &str = \"{}\";", epoch_seconds());
    let _ = writeln!(out, "pub const FINGERPRINT: &str = \"{fingerprint}\";");
    let _ = writeln!(
        out,
        "pub const TOTAL_BINDINGS: usize = {};",
        inputs.bindings.len()
    );
    let _ = writeln!(
        out,
        "pub const COMPILED_BINDINGS: usize = {};",
        plan.bindings.len()
    );
    let _ = writeln!(
        out,
        "pub const COMPILED_CLASSES: usize = {};",
        plan.factories.len()
    );
    let _ = writeln!(out, "pub const ALIAS_COUNT: usize = {};", inputs.aliases.len());
    let _ = writeln!(
        out,
        "pub const CONTEXTUAL_COUNT: usize = {};",
        inputs.contextual.len()
    );
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "/// Installs the compiled resolver into `container`. The class"
    );
    let _ = writeln!(
        out,
        "/// descriptors it constructs through must already be registered."
    );
    let _ = writeln!(out, "pub fn install(container: &Container) -> Result<()> {{");

    if !plan.bindings.is_empty() {
        let _ = writeln!(
            out,
            "    // Compiled (identifier, class) pairs: later binds of the same"
        );
        let _ = writeln!(out, "    // pair reuse the compiled factory.");
        for binding in &plan.bindings {
            let method = plan
                .factories
                .get(&binding.class)
                .map(|p| p.method.clone())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    container.register_compiled({:?}, {:?}, {method});",
                binding.id, binding.class
            );
        }
        let _ = writeln!(out);
    }

    if !plan.factories.is_empty() {
        let _ = writeln!(out, "    // Pre-registered class factories.");
        for class_plan in plan.factories.values() {
            let _ = writeln!(
                out,
                "    container.bind_typed_factory({:?}, {:?}, false, {})?;",
                class_plan.class, class_plan.class, class_plan.method
            );
        }
        let _ = writeln!(out);
    }

    if !plan.bindings.is_empty() {
        let _ = writeln!(out, "    // Compiled bindings.");
        for binding in &plan.bindings {
            let _ = writeln!(
                out,
                "    container.bind_class({:?}, {:?}, {})?;",
                binding.id, binding.class, binding.shared
            );
        }
        let _ = writeln!(out);
    }

    if !inputs.aliases.is_empty() {
        let _ = writeln!(out, "    // Aliases.");
        let mut aliases = inputs.aliases.clone();
        aliases.sort();
        for (alias, target) in aliases {
            let _ = writeln!(out, "    container.alias({alias:?}, {target:?})?;");
        }
        let _ = writeln!(out);
    }

    if !inputs.contextual.is_empty() {
        let _ = writeln!(out, "    // Contextual bindings.");
        for (consumer, needed, implementation) in &inputs.contextual {
            match implementation {
                Implementation::Class(class) => {
                    let _ = writeln!(
                        out,
                        "    container.when({consumer:?}).needs({needed:?}).give({class:?})?;"
                    );
                }
                Implementation::Tagged(tag) => {
                    let _ = writeln!(
                        out,
                        "    container.when({consumer:?}).needs({needed:?}).give_tagged({tag:?})?;"
                    );
                }
                Implementation::Configured { class, options } => {
                    let _ = writeln!(
                        out,
                        "    container.when({consumer:?}).needs({needed:?}).give_configured({class:?}, {{"
                    );
                    let _ = writeln!(out, "        let mut options = BTreeMap::new();");
                    for (key, value) in options {
                        if let Some(literal) = value.render_literal() {
                            let _ = writeln!(
                                out,
                                "        options.insert({key:?}.to_string(), {literal});"
                            );
                        }
                    }
                    let _ = writeln!(out, "        options");
                    let _ = writeln!(out, "    }})?;");
                }
                Implementation::Factory(_) | Implementation::Instance(_) => {
                    let _ = writeln!(
                        out,
                        "    // skipped: contextual binding {consumer} -> {needed} ({}) is not serializable",
                        implementation.normalize()
                    );
                }
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "    Ok(())");
    let _ = writeln!(out, "}}");

    for class_plan in plan.factories.values() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "fn {}(resolver: &dyn Resolver) -> Result<Service> {{",
            class_plan.method
        );
        let _ = writeln!(out, "    resolver.invoke_constructor(");
        let _ = writeln!(out, "        {:?},", class_plan.class);
        if class_plan.args.is_empty() {
            let _ = writeln!(out, "        Vec::new(),");
        } else {
            let _ = writeln!(out, "        vec![");
            for arg in &class_plan.args {
                match arg {
                    ArgPlan::Get(id) => {
                        let _ = writeln!(
                            out,
                            "            Value::Object(resolver.resolve({id:?})?),"
                        );
                    }
                    ArgPlan::Literal(value) => {
                        if let Some(literal) = value.render_literal() {
                            let _ = writeln!(out, "            {literal},");
                        }
                    }
                }
            }
            let _ = writeln!(out, "        ],");
        }
        let _ = writeln!(out, "    )");
        let _ = writeln!(out, "}}");
    }

    out
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn failed(stage: &str, detail: impl Into<String>, source: std::io::Error) -> ContainerError {
    ContainerError::CompilationFailed(CompilationFailedError {
        stage: stage.to_string(),
        detail: detail.into(),
        source: Some(source),
    })
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Writes `content` to `path` atomically.
///
/// Creates the target directory if absent, takes an exclusive
/// advisory lock on `<output>.lock`, writes a temporary file in the
/// same directory with mode 0644, and renames it onto the final path.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|e| failed("write", format!("cannot create '{}'", dir.display()), e))?;

    let lock_path = lock_path_for(path);
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| failed("lock", format!("cannot open '{}'", lock_path.display()), e))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| failed("lock", format!("cannot lock '{}'", lock_path.display()), e))?;

    let result = write_locked(path, &dir, content);
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

fn write_locked(path: &Path, dir: &Path, content: &str) -> Result<()> {
    // NamedTempFile removes itself on drop, so a failed write leaves
    // no leftovers and never touches the final path.
    let mut tmp = tempfile::Builder::new()
        .prefix(".rabt-compiled-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| failed("write", "cannot create temporary file", e))?;

    tmp.write_all(content.as_bytes())
        .map_err(|e| failed("write", "cannot write temporary file", e))?;
    tmp.flush()
        .map_err(|e| failed("write", "cannot flush temporary file", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| failed("write", "cannot set permissions", e))?;
    }

    tmp.persist(path)
        .map_err(|e| failed("write", format!("cannot rename onto '{}'", path.display()), e.error))?;

    debug!(path = %path.display(), "Emitted compiled resolver");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_file_and_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("resolver.rs");

        write_atomic(&path, "pub fn install() {}\n").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "pub fn install() {}\n"
        );
        assert!(lock_path_for(&path).exists());
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");

        write_atomic(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn failure_leaves_existing_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");
        write_atomic(&path, "original").unwrap();

        // Turn the parent of a nested target into a regular file so
        // directory creation fails.
        let blocked = dir.path().join("resolver.rs").join("deeper.rs");
        let err = write_atomic(&blocked, "new").unwrap_err();
        assert!(matches!(err, ContainerError::CompilationFailed(_)));

        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn no_temporary_files_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolver.rs");
        write_atomic(&path, "content").unwrap();

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
    }

    #[test]
    fn unix_mode_is_0644() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("resolver.rs");
            write_atomic(&path, "content").unwrap();
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
