//! Safe parsing of untrusted declarative documents (CWE-502).
//!
//! Parses with `serde_yml`'s plain-data `Value` tree only: no tag ever
//! instantiates anything beyond a `Value` variant, but we still have to
//! reject tags ourselves, because a tag like `!!python/object` parses to a
//! harmless [`serde_yml::value::TaggedValue`] node that a careless caller
//! could hand to something less safe downstream.

use std::fs;
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use super::SecurityError;
use crate::config::Config;

const SENSITIVE_PREFIXES: [&str; 5] = ["/etc/", "/root/", "/var/", "/sys/", "/proc/"];

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"&(\w+)").expect("anchor pattern is valid"))
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*(\w+)").expect("alias pattern is valid"))
}

/// Read and parse `path` as a document, enforcing every limit in
/// [`Config`]: size, encoding, anchor/alias complexity, parse timeout,
/// expansion ratio, symlink target, and tag safety.
pub fn parse_document_safe(path: &Utf8Path, config: &Config) -> Result<serde_yml::Value, SecurityError> {
    reject_sensitive_symlink(path)?;

    let metadata = fs::metadata(path)?;
    if metadata.len() > config.max_yaml_size {
        return Err(SecurityError::TooLarge {
            size: metadata.len(),
            max: config.max_yaml_size,
        });
    }

    let bytes = fs::read(path)?;
    parse_bytes_safe(&bytes, config)
}

/// The parsing half of [`parse_document_safe`], usable directly on an
/// in-memory buffer (e.g. from an async file read) once the caller has
/// already performed its own filesystem-level checks.
pub fn parse_bytes_safe(bytes: &[u8], config: &Config) -> Result<serde_yml::Value, SecurityError> {
    if bytes.len() as u64 > config.max_yaml_size {
        return Err(SecurityError::TooLarge {
            size: bytes.len() as u64,
            max: config.max_yaml_size,
        });
    }
    if bytes.contains(&0) {
        return Err(SecurityError::InvalidEncoding);
    }
    let content = std::str::from_utf8(bytes).map_err(|_| SecurityError::InvalidEncoding)?;

    check_complexity(content)?;

    let value = parse_with_timeout(content.to_owned(), config.yaml_timeout)?;
    reject_executable_tags(&value)?;

    let raw_len = bytes.len() as u64;
    let parsed_len = serde_yml::to_string(&value)
        .map(|s| s.len() as u64)
        .unwrap_or(raw_len);
    if raw_len > 0 && parsed_len > raw_len.saturating_mul(10) {
        return Err(SecurityError::ExpansionBomb {
            raw: raw_len,
            parsed: parsed_len,
        });
    }

    Ok(value)
}

fn check_complexity(content: &str) -> Result<(), SecurityError> {
    let anchors: std::collections::HashSet<&str> = anchor_pattern()
        .captures_iter(content)
        .map(|c| c.get(1).unwrap().as_str())
        .collect();
    let aliases: std::collections::HashSet<&str> = alias_pattern()
        .captures_iter(content)
        .map(|c| c.get(1).unwrap().as_str())
        .collect();

    if anchors.len() > 3 {
        return Err(SecurityError::ComplexityBomb {
            reason: format!("{} anchor declarations exceeds limit of 3", anchors.len()),
        });
    }
    if aliases.len() > 5 {
        return Err(SecurityError::ComplexityBomb {
            reason: format!("{} alias references exceeds limit of 5", aliases.len()),
        });
    }
    if anchors.intersection(&aliases).next().is_some() {
        return Err(SecurityError::ComplexityBomb {
            reason: "identifier used as both anchor and alias".to_owned(),
        });
    }
    Ok(())
}

fn parse_with_timeout(content: String, timeout: Duration) -> Result<serde_yml::Value, SecurityError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let parsed = serde_yml::from_str::<serde_yml::Value>(&content);
        let _ = tx.send(parsed);
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(SecurityError::ComplexityBomb {
            reason: format!("malformed document: {err}"),
        }),
        Err(_) => Err(SecurityError::ParseTimeout(timeout)),
    }
}

fn reject_executable_tags(value: &serde_yml::Value) -> Result<(), SecurityError> {
    match value {
        serde_yml::Value::Tagged(tagged) => Err(SecurityError::ExecutableTag {
            tag: tagged.tag.to_string(),
        }),
        serde_yml::Value::Sequence(items) => {
            items.iter().try_for_each(reject_executable_tags)
        }
        serde_yml::Value::Mapping(map) => map.iter().try_for_each(|(k, v)| {
            reject_executable_tags(k)?;
            reject_executable_tags(v)
        }),
        _ => Ok(()),
    }
}

fn reject_sensitive_symlink(path: &Utf8Path) -> Result<(), SecurityError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(()),
    };
    if !meta.file_type().is_symlink() {
        return Ok(());
    }
    let resolved = fs::canonicalize(path)?;
    let resolved = Utf8PathBuf::try_from(resolved).map_err(|_| SecurityError::InvalidEncoding)?;
    if SENSITIVE_PREFIXES.iter().any(|p| resolved.as_str().starts_with(p)) {
        return Err(SecurityError::SensitiveSymlink {
            path: path.to_path_buf(),
            target: resolved,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn accepts_plain_document() {
        let yaml = "id: architect\nname: Architect\n";
        assert!(parse_bytes_safe(yaml.as_bytes(), &cfg()).is_ok());
    }

    #[test]
    fn rejects_nul_bytes() {
        let bytes = b"id: a\x00bc\n";
        assert!(matches!(
            parse_bytes_safe(bytes, &cfg()),
            Err(SecurityError::InvalidEncoding)
        ));
    }

    #[test]
    fn rejects_too_many_anchors() {
        let yaml = "a: &one 1\nb: &two 2\nc: &three 3\nd: &four 4\n";
        assert!(matches!(
            parse_bytes_safe(yaml.as_bytes(), &cfg()),
            Err(SecurityError::ComplexityBomb { .. })
        ));
    }

    #[test]
    fn rejects_identifier_used_as_anchor_and_alias() {
        let yaml = "base: &parent\n  x: 1\nchild:\n  <<: *parent\n";
        assert!(matches!(
            parse_bytes_safe(yaml.as_bytes(), &cfg()),
            Err(SecurityError::ComplexityBomb { .. })
        ));
    }

    #[test]
    fn rejects_executable_tag() {
        let yaml = "value: !!python/object:os.system \"echo hi\"\n";
        assert!(matches!(
            parse_bytes_safe(yaml.as_bytes(), &cfg()),
            Err(SecurityError::ExecutableTag { .. })
        ));
    }

    #[test]
    fn rejects_oversized_document() {
        let mut cfg = cfg();
        cfg.max_yaml_size = 4;
        let yaml = "id: architect\n";
        assert!(matches!(
            parse_bytes_safe(yaml.as_bytes(), &cfg),
            Err(SecurityError::TooLarge { .. })
        ));
    }
}
