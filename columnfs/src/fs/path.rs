//! Path helpers. Entries are addressed by `(parent_path, name)`; the parent of
//! a top-level entry is always `"/"` and non-root parents carry no trailing
//! separator, so `join(split(p))` round-trips any normalized path.

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

fn trim_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() && path.starts_with(SEPARATOR) {
        ROOT
    } else {
        trimmed
    }
}

pub fn is_root(path: &str) -> bool {
    matches!(trim_trailing(path), "" | "." | ROOT)
}

/// Splits a path into `(parent_path, name)`. The root splits into `("/", "")`.
pub fn split(path: &str) -> (String, String) {
    if is_root(path) {
        return (ROOT.to_string(), String::new());
    }

    let path = trim_trailing(path);
    match path.rfind(SEPARATOR) {
        Some(idx) => {
            let parent = &path[..idx];
            let name = &path[idx + 1..];
            (normalize_parent(parent), name.to_string())
        }
        None => (ROOT.to_string(), path.to_string()),
    }
}

fn normalize_parent(parent: &str) -> String {
    if is_root(parent) {
        ROOT.to_string()
    } else {
        trim_trailing(parent).to_string()
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if is_root(parent) {
        format!("{SEPARATOR}{name}")
    } else {
        format!("{}{SEPARATOR}{name}", trim_trailing(parent))
    }
}

/// Canonical spelling of a path: leading separator, no trailing separator.
pub fn normalize(path: &str) -> String {
    let (parent, name) = split(path);
    if name.is_empty() {
        ROOT.to_string()
    } else {
        join(&parent, &name)
    }
}

/// True when `path` equals `ancestor` or lies anywhere beneath it.
pub fn is_same_or_descendant(ancestor: &str, path: &str) -> bool {
    let ancestor = normalize(ancestor);
    let path = normalize(path);
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Rewrites the `from` prefix of `path` to `to`. `path` must be `from` itself
/// or one of its descendants.
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    let path = normalize(path);
    let from = normalize(from);
    let to = normalize(to);
    match path.strip_prefix(from.as_str()) {
        Some("") => to,
        Some(rest) if to == ROOT => rest.to_string(),
        Some(rest) => format!("{to}{rest}"),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_str(path: &str) -> (String, String) {
        split(path)
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_str("/a"), ("/".into(), "a".into()));
        assert_eq!(split_str("/a/"), ("/".into(), "a".into()));
    }

    #[test]
    fn test_split_nested() {
        assert_eq!(split_str("/d/f.txt"), ("/d".into(), "f.txt".into()));
        assert_eq!(split_str("/a/b/c//"), ("/a/b".into(), "c".into()));
    }

    #[test]
    fn test_split_root_forms() {
        for root in ["/", "", ".", "///"] {
            assert_eq!(split_str(root), ("/".into(), "".into()), "{root:?}");
        }
    }

    #[test]
    fn test_split_relative_parent_normalized() {
        assert_eq!(split_str("name"), ("/".into(), "name".into()));
        assert_eq!(split_str("./name"), ("/".into(), "name".into()));
    }

    #[test]
    fn test_join_round_trip() {
        for path in ["/a", "/a/b", "/d/f.txt"] {
            let (parent, name) = split(path);
            assert_eq!(join(&parent, &name), path);
        }
    }

    #[test]
    fn test_descendant_check_respects_component_boundaries() {
        assert!(is_same_or_descendant("/a", "/a"));
        assert!(is_same_or_descendant("/a", "/a/b/c"));
        assert!(!is_same_or_descendant("/a", "/ab"));
        assert!(!is_same_or_descendant("/a/b", "/a"));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("/a", "/a", "/x"), "/x");
        assert_eq!(rebase("/a/b/c", "/a", "/x/y"), "/x/y/b/c");
        assert_eq!(rebase("/a/b", "/a/b", "/b"), "/b");
    }
}
