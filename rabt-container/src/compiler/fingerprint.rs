//! Deterministic registry fingerprinting.
//!
//! SHA-256 over the normalized compile inputs: sorted bindings with
//! normalized concretes, sorted aliases, sorted contextual bindings,
//! the emitted class name and namespace, and every fingerprint-
//! relevant option. The validation toggle is excluded: it changes
//! behavior of `compile`, not the meaning of the registry.

use sha2::{Digest, Sha256};

use super::{CompileInputs, CompilerOptions};

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn compute(inputs: &CompileInputs, options: &CompilerOptions) -> String {
    let mut lines: Vec<String> = Vec::new();

    let mut bindings: Vec<String> = inputs
        .bindings
        .iter()
        .map(|(id, binding)| {
            format!(
                "binding|{id}|{}|{}",
                binding.concrete.normalize(),
                binding.shared
            )
        })
        .collect();
    bindings.sort();
    lines.extend(bindings);

    let mut aliases: Vec<String> = inputs
        .aliases
        .iter()
        .map(|(alias, target)| format!("alias|{alias}|{target}"))
        .collect();
    aliases.sort();
    lines.extend(aliases);

    let mut contextual: Vec<String> = inputs
        .contextual
        .iter()
        .map(|(consumer, needed, implementation)| {
            format!("contextual|{consumer}|{needed}|{}", implementation.normalize())
        })
        .collect();
    contextual.sort();
    lines.extend(contextual);

    lines.push(format!("class|{}", options.class_name));
    lines.push(format!("namespace|{}", options.namespace));

    sha256_hex(&lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::introspect::ClassInfo;
    use crate::value::Service;

    struct Stub;

    fn concrete(name: &str) -> ClassInfo {
        let owned = name.to_string();
        ClassInfo::concrete(name).constructor(move |_| Ok(Service::new(&owned, Stub)))
    }

    fn populated() -> Container {
        let container = Container::new();
        container.register_class(concrete("ConsoleLogger"));
        container.register_class(concrete("MemCache"));
        container.bind_shared("logger", "ConsoleLogger").unwrap();
        container.bind_class("cache", "MemCache", false).unwrap();
        container.alias("log", "logger").unwrap();
        container
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("rabt"),
            sha256_hex("rabt"),
        );
        assert_eq!(sha256_hex("rabt").len(), 64);
        assert_ne!(sha256_hex("rabt"), sha256_hex("rabT"));
    }

    #[test]
    fn equal_registries_fingerprint_equally() {
        let a = populated();
        let b = populated();
        assert_eq!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn registration_order_is_cosmetic() {
        let a = populated();

        let b = Container::new();
        b.register_class(concrete("MemCache"));
        b.register_class(concrete("ConsoleLogger"));
        b.bind_class("cache", "MemCache", false).unwrap();
        b.bind_shared("logger", "ConsoleLogger").unwrap();
        b.alias("log", "logger").unwrap();

        assert_eq!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn new_binding_changes_fingerprint() {
        let a = populated();
        let b = populated();
        b.register_class(concrete("Extra"));
        b.bind_class("extra", "Extra", false).unwrap();
        assert_ne!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn shared_flag_changes_fingerprint() {
        let a = populated();
        let b = populated();
        b.bind_class("cache", "MemCache", true).unwrap();
        assert_ne!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn alias_changes_fingerprint() {
        let a = populated();
        let b = populated();
        b.alias("log2", "logger").unwrap();
        assert_ne!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn contextual_binding_changes_fingerprint() {
        let a = populated();
        let b = populated();
        b.register_class(concrete("FileLogger"));
        b.when("MemCache").needs("logger").give("FileLogger").unwrap();
        assert_ne!(a.compilation_fingerprint(), b.compilation_fingerprint());
    }

    #[test]
    fn validation_toggle_is_not_fingerprint_relevant() {
        let container = populated();
        let inputs = CompileInputs::snapshot(&container);

        let with = CompilerOptions {
            validate: true,
            ..CompilerOptions::default()
        };
        let without = CompilerOptions {
            validate: false,
            ..CompilerOptions::default()
        };
        assert_eq!(compute(&inputs, &with), compute(&inputs, &without));
    }

    #[test]
    fn class_name_option_is_fingerprint_relevant() {
        let container = populated();
        let inputs = CompileInputs::snapshot(&container);

        let default = CompilerOptions::default();
        let renamed = CompilerOptions {
            class_name: "FastResolver".to_string(),
            ..CompilerOptions::default()
        };
        assert_ne!(compute(&inputs, &default), compute(&inputs, &renamed));
    }
}
