//! Helpers for `/`-separated remote logical paths
//!
//! Remote paths are independent of the local OS path syntax, so they are kept
//! as plain strings and never go through `std::path`.

/// True if `path` starts at the namespace root
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Collapse repeated separators and resolve `.` and `..` components.
///
/// The result is absolute if the input was absolute. `..` never climbs above
/// the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if is_absolute(path) {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Append `name` to `base`
pub fn join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Last component of `path`; empty for the root
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Parent collection of `path`, or `None` for the root
pub fn parent(path: &str) -> Option<String> {
    let normalized = normalize(path);
    if normalized == "/" || normalized.is_empty() {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(at) => Some(normalized[..at].to_string()),
        None => None,
    }
}

/// Resolve `path` against `home` when it is relative
pub fn resolve(home: &str, path: &str) -> String {
    if is_absolute(path) {
        normalize(path)
    } else {
        normalize(&join(home, path))
    }
}

/// True if `path` is `ancestor` or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    if ancestor == "/" {
        return is_absolute(&path);
    }
    path == ancestor || path.starts_with(&format!("{}/", ancestor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../.."), "/");
        assert_eq!(normalize("a/b"), "a/b");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/dest", "a.txt"), "/dest/a.txt");
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("/dest/", "/a.txt"), "/dest/a.txt");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("/home/kepler/data.bin"), "data.bin");
        assert_eq!(file_name("/home/kepler/"), "kepler");
        assert_eq!(file_name("/"), "");
        assert_eq!(parent("/home/kepler"), Some("/home".to_string()));
        assert_eq!(parent("/home"), Some("/".to_string()));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_resolve_relative_against_home() {
        assert_eq!(resolve("/home/kepler", "runs/1"), "/home/kepler/runs/1");
        assert_eq!(resolve("/home/kepler", "/tmp/x"), "/tmp/x");
        assert_eq!(resolve("/home/kepler", ".."), "/home");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b/c", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }
}
