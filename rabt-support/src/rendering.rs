//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format resolving chains, identifier names,
//! and helpful suggestions in error output.

/// Renders a resolving chain as a readable string.
///
/// # Examples
/// ```
/// use rabt_support::rendering::render_chain;
///
/// let chain = vec!["UserService", "UserRepo", "Database", "UserService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "UserService -> UserRepo -> Database -> UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Shortens a namespaced identifier for display.
///
/// Identifiers may be plain strings, `::`-separated Rust paths, or
/// `\`-separated namespaces carried over from foreign registries.
///
/// ```
/// use rabt_support::rendering::shorten_identifier;
///
/// assert_eq!(shorten_identifier("app::services::UserService"), "UserService");
/// assert_eq!(shorten_identifier("App\\Log\\FileLogger"), "FileLogger");
/// assert_eq!(shorten_identifier("cache"), "cache");
/// ```
pub fn shorten_identifier(full_name: &str) -> &str {
    let after_path = full_name.rsplit("::").next().unwrap_or(full_name);
    after_path.rsplit('\\').next().unwrap_or(after_path)
}

/// Generates a "did you mean?" suggestion list based on registered names.
///
/// Compares the requested identifier against available identifiers and
/// returns the closest matches, best first.
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_identifier(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&name| {
            if name == requested {
                return None;
            }
            let name_lower = name.to_lowercase();
            let name_short = shorten_identifier(name).to_lowercase();

            // Exact substring match (highest priority)
            if name_lower.contains(&requested_lower)
                || requested_lower.contains(&name_lower)
            {
                return Some((name, 100));
            }

            // Short name match
            if name_short.contains(&requested_short)
                || requested_short.contains(&name_short)
            {
                return Some((name, 80));
            }

            if close_match(&name_short, &requested_short) {
                return Some((name, 60));
            }

            // Common prefix
            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            if common >= 3 {
                return Some((name, common * 10));
            }

            None
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Simple check if two strings are "close enough" to count as a typo.
///
/// Not a full Levenshtein — just a quick heuristic for suggestions.
pub fn close_match(a: &str, b: &str) -> bool {
    let len_diff = a.len().abs_diff(b.len());
    if len_diff > 3 {
        return false;
    }

    let common: usize = a
        .chars()
        .zip(b.chars())
        .filter(|(ca, cb)| ca == cb)
        .count();

    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return true;
    }

    // At least 60% of characters match
    common * 100 / max_len >= 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_simple_chain() {
        let chain = vec!["A", "B", "C", "A"];
        assert_eq!(render_chain(&chain), "A -> B -> C -> A");
    }

    #[test]
    fn render_single_element_chain() {
        let chain = vec!["A"];
        assert_eq!(render_chain(&chain), "A");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn shorten_rust_path() {
        assert_eq!(shorten_identifier("app::services::UserService"), "UserService");
    }

    #[test]
    fn shorten_backslash_namespace() {
        assert_eq!(shorten_identifier("App\\Cache\\RedisStore"), "RedisStore");
    }

    #[test]
    fn shorten_plain_identifier() {
        assert_eq!(shorten_identifier("logger"), "logger");
    }

    #[test]
    fn suggest_similar_identifiers() {
        let available = vec!["UserService", "UserRepository", "Logger", "Database"];

        let suggestions = suggest_similar("UserServise", &available, 3);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0], "UserService");
    }

    #[test]
    fn suggest_skips_exact_name() {
        let available = vec!["Logger"];
        let suggestions = suggest_similar("Logger", &available, 3);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn suggest_no_match() {
        let available = vec!["Database"];
        let suggestions = suggest_similar("XyzAbcDef", &available, 3);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn close_match_check() {
        assert!(close_match("userservice", "userservise")); // typo
        assert!(close_match("database", "databse"));        // typo
        assert!(!close_match("database", "logger"));        // different
    }
}
