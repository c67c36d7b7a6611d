//! Top-level error type for `resource-manager`.
//!
//! Each component (security, loader, resolver, installer) defines its own
//! focused error enum; this type exists only to let callers that cross
//! component boundaries propagate with `?` without losing which component
//! failed.

use miette::Diagnostic;
use thiserror::Error;

use crate::catalog::LoadError;
use crate::resolver::DependencyError;
use crate::security::SecurityError;

/// An alias for the common `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, RmError>;

/// Every way the engine can fail: input/format, security, not-found,
/// dependency, and filesystem errors each surface as their own variant
/// rather than a generic catch-all.
#[derive(Debug, Error, Diagnostic)]
pub enum RmError {
    /// A safety primitive (document parse, path, or URL validation) rejected
    /// untrusted input.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Security(#[from] SecurityError),

    /// The catalog loader failed to find, parse, or validate a document.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    /// Dependency resolution or installation ordering failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Dependency(#[from] DependencyError),

    /// A resource's declared fields violated the schema's own invariants.
    #[error(transparent)]
    Schema(#[from] resource_manager_schema::SchemaError),

    /// Any other I/O failure not already classified above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
