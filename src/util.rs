/// Strip the dump root from a repository-absolute path, yielding the
/// dump-relative path bundles expect. Paths outside the root pass through
/// unchanged.
pub fn path_relative_to_root(root: &str, path: &str) -> String {
    match path.strip_prefix(root) {
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

/// Normalize a root to the stored form: empty, or `/`-terminated.
pub fn sanitize_root(root: &str) -> String {
    if root.is_empty() || root == "/" {
        return String::new();
    }
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{root}/")
    }
}

/// True when `file` lives under `root`. The empty root covers everything.
pub fn root_contains(root: &str, file: &str) -> bool {
    file.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_strips_root() {
        assert_eq!(path_relative_to_root("svc/", "svc/a.go"), "a.go");
        assert_eq!(path_relative_to_root("", "svc/a.go"), "svc/a.go");
    }

    #[test]
    fn relative_path_passes_through_outside_root() {
        assert_eq!(path_relative_to_root("svc/", "lib/b.go"), "lib/b.go");
    }

    #[test]
    fn sanitize_root_terminates_with_slash() {
        assert_eq!(sanitize_root(""), "");
        assert_eq!(sanitize_root("/"), "");
        assert_eq!(sanitize_root("svc"), "svc/");
        assert_eq!(sanitize_root("svc/"), "svc/");
    }

    #[test]
    fn empty_root_contains_everything() {
        assert!(root_contains("", "any/path.rs"));
        assert!(root_contains("a/", "a/sub/f.go"));
        assert!(!root_contains("a/sub/", "a/f.go"));
    }
}
