use std::path::PathBuf;

use crate::error::{Error, Result};

/// Why an entry name cannot be placed under the destination root.
pub(crate) mod reason {
    pub const EMPTY: &str = "empty path";
    pub const NUL: &str = "path contains a NUL byte";
    pub const ABSOLUTE: &str = "absolute path";
    pub const DRIVE: &str = "path carries a drive prefix";
    pub const TRAVERSAL: &str = "parent traversal escapes the destination root";
}

/// Result of sanitizing an archive entry path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedPath {
    pub original: String,
    /// Normalized path relative to the destination root.
    pub relative: PathBuf,
}

/// Normalize an untrusted entry name into root-relative segments.
///
/// Both `/` and `\` separate segments, `.` and empty segments vanish, and `..`
/// pops a segment. Popping past the root is a traversal attempt.
pub(crate) fn normalize(name: &str) -> std::result::Result<Vec<&str>, &'static str> {
    if name.contains('\0') {
        return Err(reason::NUL);
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(reason::ABSOLUTE);
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(reason::DRIVE);
    }

    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(reason::TRAVERSAL);
                }
            }
            normal => segments.push(normal),
        }
    }
    if segments.is_empty() {
        return Err(reason::EMPTY);
    }
    Ok(segments)
}

/// Sanitize an entry name for extraction, optionally dropping leading
/// components the way `tar --strip-components` does.
pub fn sanitize_entry_path(name: &str, strip_components: usize) -> Result<SanitizedPath> {
    let segments = normalize(name).map_err(|reason| Error::UnsafePath {
        path: name.to_string(),
        reason,
    })?;

    if segments.len() <= strip_components {
        return Err(Error::NoComponentsRemaining {
            original: PathBuf::from(name),
            count: strip_components,
        });
    }

    Ok(SanitizedPath {
        original: name.to_string(),
        relative: segments[strip_components..].iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn basic_path_sanitization() {
        let result = sanitize_entry_path("bin/tool", 0).unwrap();
        assert_eq!(result.original, "bin/tool");
        assert_eq!(result.relative, Path::new("bin/tool"));
    }

    #[test]
    fn inner_parent_segments_are_resolved() {
        let result = sanitize_entry_path("a/b/../c/./d", 0).unwrap();
        assert_eq!(result.relative, Path::new("a/c/d"));
    }

    #[test]
    fn backslashes_are_separators() {
        let result = sanitize_entry_path("foo\\bar//baz", 0).unwrap();
        assert_eq!(result.relative, Path::new("foo/bar/baz"));
    }

    #[test]
    fn traversal_is_rejected() {
        for name in ["../etc/passwd", "a/../../b", "..", "a\\..\\..\\b"] {
            assert!(
                matches!(
                    sanitize_entry_path(name, 0),
                    Err(Error::UnsafePath { reason: reason::TRAVERSAL, .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn absolute_paths_are_rejected() {
        assert!(matches!(
            sanitize_entry_path("/etc/passwd", 0),
            Err(Error::UnsafePath { reason: reason::ABSOLUTE, .. })
        ));
        assert!(matches!(
            sanitize_entry_path("\\windows\\system32", 0),
            Err(Error::UnsafePath { reason: reason::ABSOLUTE, .. })
        ));
        assert!(matches!(
            sanitize_entry_path("C:\\evil.exe", 0),
            Err(Error::UnsafePath { reason: reason::DRIVE, .. })
        ));
    }

    #[test]
    fn nul_and_empty_are_rejected() {
        assert_eq!(normalize("a\0b"), Err(reason::NUL));
        assert_eq!(normalize("./"), Err(reason::EMPTY));
        assert_eq!(normalize(""), Err(reason::EMPTY));
    }

    #[test]
    fn path_with_component_stripping() {
        let result = sanitize_entry_path("tool-1.0/bin/tool", 1).unwrap();
        assert_eq!(result.relative, Path::new("bin/tool"));
    }

    #[test]
    fn stripping_everything_fails() {
        assert!(matches!(
            sanitize_entry_path("tool-1.0/", 1),
            Err(Error::NoComponentsRemaining { count: 1, .. })
        ));
    }
}
