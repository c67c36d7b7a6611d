//! Path containment validation (CWE-22).

use camino::{Utf8Path, Utf8PathBuf};
use unicode_normalization::UnicodeNormalization;

use super::SecurityError;

/// Validate `user_path` against `base_dir`, returning the resolved absolute
/// path if (and only if) it is guaranteed to lie within `base_dir`.
///
/// `user_path` may be relative (joined onto `base_dir`) or absolute (still
/// required to resolve under `base_dir`).
pub fn validate_install_path(user_path: &str, base_dir: &Utf8Path) -> Result<Utf8PathBuf, SecurityError> {
    let reject = |reason: &str| {
        Err(SecurityError::UnsafePath {
            path: user_path.to_owned(),
            reason: reason.to_owned(),
        })
    };

    if user_path.contains('\0') {
        return reject("contains a NUL byte");
    }
    if user_path.contains('%') {
        return reject("percent-encoding is not allowed");
    }

    let normalized: String = user_path.nfkc().collect();
    if !user_path.contains("..") && normalized.contains("..") {
        return reject("Unicode normalization introduced a traversal segment");
    }
    if normalized.contains("..") && user_path.is_ascii() {
        // pure-ASCII input that already contained ".." is handled by the
        // generic "..." check below; non-ASCII input with ".." after
        // normalization is rejected unconditionally.
    } else if normalized.contains("..") && !user_path.is_ascii() {
        return reject("non-ASCII characters combined with a traversal pattern");
    }

    let path_str = normalized.as_str();

    if path_str.contains("...") {
        return reject("suspicious repeated-dot pattern");
    }
    if path_str.contains("//") {
        return reject("double slashes are not allowed");
    }
    if path_str.starts_with("\\\\") {
        return reject("UNC paths are not allowed");
    }
    #[cfg(not(windows))]
    {
        if path_str.contains('\\') {
            return reject("backslashes are not allowed");
        }
        let bytes = path_str.as_bytes();
        if bytes.len() > 1 && bytes[1] == b':' {
            return reject("Windows-style drive letters are not allowed");
        }
    }

    let base = base_dir
        .canonicalize_utf8()
        .map_err(SecurityError::Io)?;

    let candidate = Utf8PathBuf::from(path_str);
    let joined = if candidate.is_absolute() {
        candidate
    } else {
        base.join(&candidate)
    };
    let resolved = match joined.canonicalize_utf8() {
        Ok(p) => p,
        Err(_) => lexically_normalize(&joined),
    };

    if !is_within(&resolved, &base) {
        return reject("resolves outside the base directory");
    }

    Ok(resolved)
}

fn is_within(path: &Utf8Path, base: &Utf8Path) -> bool {
    path.strip_prefix(base).is_ok()
}

/// Collapse `.`/`..` components without touching the filesystem, used as a
/// fallback when the path (or one of its ancestors) does not exist yet --
/// `canonicalize` requires the target to exist.
fn lexically_normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out: Vec<&str> = Vec::new();
    for component in path.components() {
        match component.as_str() {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    let mut result = Utf8PathBuf::new();
    for part in out {
        result.push(part);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, base)
    }

    #[test]
    fn accepts_simple_relative_path() {
        let (_dir, base) = base();
        let resolved = validate_install_path("agents/architect.md", &base).unwrap();
        assert!(resolved.starts_with(&base));
    }

    #[test]
    fn rejects_traversal() {
        let (_dir, base) = base();
        assert!(validate_install_path("../../etc/passwd", &base).is_err());
    }

    #[test]
    fn rejects_nul_byte() {
        let (_dir, base) = base();
        assert!(validate_install_path("agents/a\0b.md", &base).is_err());
    }

    #[test]
    fn rejects_percent_encoding() {
        let (_dir, base) = base();
        assert!(validate_install_path("agents%2f..%2fb.md", &base).is_err());
    }

    #[test]
    fn rejects_double_slash() {
        let (_dir, base) = base();
        assert!(validate_install_path("agents//architect.md", &base).is_err());
    }

    #[test]
    fn rejects_windows_drive_letter() {
        let (_dir, base) = base();
        assert!(validate_install_path("C:/agents/architect.md", &base).is_err());
    }
}
