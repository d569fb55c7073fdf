use std::fmt::{self, Display};

use crate::error::{Error, Result};

/// Maximum length of an object key in bytes, matching the S3 and GCS limits.
pub const MAX_PATH_LEN: usize = 1024;

/// The location of an object within the backend's namespace.
///
/// Paths are `/`-separated keys such as `images/2024/a.png`. Construction validates the naming rules
/// shared by all backends, so a `RemotePath` can be joined onto a local directory or appended to a
/// bucket URL without further checks:
///
/// - must not be empty,
/// - must not start with `/` or contain empty segments (`a//b`),
/// - must not contain `.` or `..` segments,
/// - must not contain backslashes or control characters,
/// - must be at most [`MAX_PATH_LEN`] bytes long.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath(String);

impl RemotePath {
    /// Validates and wraps a remote path.
    ///
    /// Returns [`Error::InvalidArgument`] for an empty path and [`Error::InvalidPath`] for any
    /// other rule violation.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(Error::InvalidArgument("remote path must not be empty".into()));
        }

        if let Err(reason) = check_naming_rules(&path) {
            return Err(Error::InvalidPath { path, reason });
        }

        Ok(Self(path))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last segment of the path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

fn check_naming_rules(path: &str) -> Result<(), &'static str> {
    if path.len() > MAX_PATH_LEN {
        return Err("path exceeds 1024 bytes");
    }
    if path.chars().any(|c| c.is_control()) {
        return Err("path contains control characters");
    }
    if path.contains('\\') {
        return Err("path contains a backslash");
    }

    for segment in path.split('/') {
        match segment {
            "" => return Err("path contains an empty segment or a leading or trailing '/'"),
            "." | ".." => return Err("path contains a relative segment"),
            _ => {}
        }
    }

    Ok(())
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_keys() {
        let path = RemotePath::new("a/b.png").unwrap();
        assert_eq!(path.as_str(), "a/b.png");
        assert_eq!(path.file_name(), "b.png");

        let path = RemotePath::new("x.txt").unwrap();
        assert_eq!(path.file_name(), "x.txt");
    }

    #[test]
    fn rejects_empty_as_invalid_argument() {
        let err = RemotePath::new("").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_naming_violations() {
        for path in [
            "/absolute",
            "trailing/",
            "a//b",
            "../escape",
            "a/./b",
            "a\\b",
            "nul\0byte",
            "line\nbreak",
        ] {
            let err = RemotePath::new(path).unwrap_err();
            assert!(
                matches!(err, Error::InvalidPath { .. }),
                "expected InvalidPath for {path:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_overlong_keys() {
        assert!(RemotePath::new("a".repeat(MAX_PATH_LEN)).is_ok());

        let err = RemotePath::new("a".repeat(MAX_PATH_LEN + 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }
}
