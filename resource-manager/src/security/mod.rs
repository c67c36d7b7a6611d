//! Safety primitives: the only code in this crate that is allowed to touch
//! untrusted bytes, paths, or URLs directly.
//!
//! Each primitive fails closed with a single [`SecurityError`] rather than a
//! generic I/O or parse error, so callers can distinguish "this input was
//! actively unsafe" from "this input was merely absent or malformed".

pub mod document;
pub mod path;
pub mod url;

pub use document::parse_document_safe;
pub use path::validate_install_path;
pub use url::validate_download_url;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Every way a safety primitive can reject untrusted input.
#[derive(Debug, Error, Diagnostic)]
pub enum SecurityError {
    /// The document exceeded the configured size ceiling before parsing.
    #[error("document size {size} exceeds maximum allowed size {max}")]
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Configured ceiling in bytes.
        max: u64,
    },

    /// The document was not valid UTF-8, or contained an embedded NUL byte.
    #[error("document contains invalid UTF-8 or a NUL byte")]
    InvalidEncoding,

    /// Too many anchors or aliases, or an identifier used as both.
    #[error("potential document bomb detected: {reason}")]
    ComplexityBomb {
        /// Which heuristic tripped.
        reason: String,
    },

    /// Parsing did not complete within the configured wall-clock bound.
    #[error("document parse exceeded {0:?} timeout")]
    ParseTimeout(std::time::Duration),

    /// The parsed result's serialized form vastly exceeds the raw input.
    #[error("document expansion bomb: parsed size {parsed} exceeds {raw} raw bytes by more than 10x")]
    ExpansionBomb {
        /// Raw input size in bytes.
        raw: u64,
        /// Size of the re-serialized parsed result.
        parsed: u64,
    },

    /// Document declared a tag that would instantiate a host object.
    #[error("document uses an executable/constructor tag: {tag}")]
    ExecutableTag {
        /// The offending tag.
        tag: String,
    },

    /// A symlink's resolved target lies under a sensitive root.
    #[error("symlink {path} resolves to sensitive path {target}")]
    SensitiveSymlink {
        /// The symlink that was rejected.
        path: Utf8PathBuf,
        /// Its resolved target.
        target: Utf8PathBuf,
    },

    /// The install path escaped the configured base directory, or was
    /// otherwise structurally unsafe (NUL byte, percent-encoding, UNC
    /// prefix, drive letter, mixed separators, Unicode normalization
    /// smuggling `..`).
    #[error("unsafe install path {path:?}: {reason}")]
    UnsafePath {
        /// The rejected (raw, pre-validation) path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The URL failed one of the allow-list/scheme/credential/port checks.
    #[error("unsafe download URL {url:?}: {reason}")]
    UnsafeUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O failure encountered while resolving a path or reading a file,
    /// distinct from a deliberate security rejection.
    #[error("I/O error while validating input: {0}")]
    Io(#[from] std::io::Error),
}
