//! Slash-delimited organizational unit paths.
//!
//! A top-level OU has `path == name`; every other OU has `parent.path + "/" + name`.

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Append `name` to `parent`. An empty parent denotes the root.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Non-empty segments of `path`, top-down.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Every prefix of `path`, shortest first: `A/B/C` → `A`, `A/B`, `A/B/C`.
pub fn prefixes(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in segments(path) {
        current = join(&current, segment);
        out.push(current.clone());
    }
    out
}

/// First segment of `path`.
pub fn top_level(path: &str) -> &str {
    segments(path).next().unwrap_or("")
}

/// Last segment of `path`.
pub fn leaf(path: &str) -> &str {
    segments(path).last().unwrap_or("")
}

pub fn is_top_level(path: &str) -> bool {
    segments(path).count() == 1
}

/// File stem used when an OU entry lives in its own configuration file.
pub fn file_stem(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_root_parent() {
        assert_eq!(join("", "core"), "core");
        assert_eq!(join("Infrastructure", "Network"), "Infrastructure/Network");
    }

    #[test]
    fn prefixes_are_shortest_first() {
        assert_eq!(prefixes("A/B/C"), vec!["A", "A/B", "A/B/C"]);
        assert_eq!(prefixes("/A//B/"), vec!["A", "A/B"]);
    }

    #[test]
    fn top_level_and_leaf() {
        assert_eq!(top_level("Infrastructure/Network/Dev"), "Infrastructure");
        assert_eq!(leaf("Infrastructure/Network/Dev"), "Dev");
        assert!(is_top_level("core"));
        assert!(!is_top_level("core/dev"));
    }

    #[test]
    fn file_stem_replaces_separators() {
        assert_eq!(file_stem("Infrastructure/Network"), "Infrastructure_Network");
    }
}
