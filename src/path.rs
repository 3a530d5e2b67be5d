//! Remote path normalization.
//!
//! Deploy configurations hand us paths in whatever shape the local side
//! produced: relative, backslash-separated, doubled slashes. The remote side
//! only ever sees absolute forward-slash paths rooted at `/`.

/// Normalize a local-style path to the remote absolute form.
///
/// The result always starts with exactly one `/`, uses `/` separators with
/// no doubling, and has `.` and `..` segments resolved (`..` never climbs
/// above the root). Idempotent.
pub fn to_remote_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Normalized parent directory of `path`. The parent of `/` is `/`.
pub fn remote_parent(path: &str) -> String {
    let normalized = to_remote_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_relative_paths() {
        assert_eq!(to_remote_path("var/www/app"), "/var/www/app");
        assert_eq!(to_remote_path("index.html"), "/index.html");
    }

    #[test]
    fn test_collapses_separators() {
        assert_eq!(to_remote_path("//var///www//"), "/var/www");
        assert_eq!(to_remote_path("/var/www/"), "/var/www");
    }

    #[test]
    fn test_converts_backslashes() {
        assert_eq!(to_remote_path("var\\www\\app"), "/var/www/app");
        assert_eq!(to_remote_path("\\var\\www"), "/var/www");
    }

    #[test]
    fn test_resolves_dot_segments() {
        assert_eq!(to_remote_path("/var/./www"), "/var/www");
        assert_eq!(to_remote_path("/var/www/../html"), "/var/html");
        assert_eq!(to_remote_path("../../etc"), "/etc");
    }

    #[test]
    fn test_empty_input_is_root() {
        assert_eq!(to_remote_path(""), "/");
        assert_eq!(to_remote_path("/"), "/");
    }

    #[test]
    fn test_single_leading_slash() {
        for input in ["a/b", "/a/b", "//a//b", "a\\b", ""] {
            let out = to_remote_path(input);
            assert!(out.starts_with('/'), "{out:?} must start with /");
            assert!(!out.starts_with("//"), "{out:?} must not double the root");
            assert!(!out.contains("//"), "{out:?} must not contain //");
        }
    }

    #[test]
    fn test_idempotent() {
        for input in ["a/b", "/a/b/", "\\a\\b", "//x///y", "x/../y"] {
            let once = to_remote_path(input);
            assert_eq!(to_remote_path(&once), once);
        }
    }

    #[test]
    fn test_parent() {
        assert_eq!(remote_parent("/var/www/index.html"), "/var/www");
        assert_eq!(remote_parent("var/www"), "/var");
        assert_eq!(remote_parent("/index.html"), "/");
        assert_eq!(remote_parent("/"), "/");
        assert_eq!(remote_parent("index.html"), "/");
    }
}
