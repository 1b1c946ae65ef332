use std::path::PathBuf;

use psxpack_core::DiscError;
use thiserror::Error;

/// Errors surfaced by the rip, build, and inject pipelines.
///
/// Warnings (requested-LBN collisions, identifier character advisories,
/// non-XA discs) are not errors: they go to the log and processing
/// continues. Per-file sector read failures during a rip are downgraded
/// too; the affected file is marked incomplete.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Disc(#[from] DiscError),

    /// Malformed catalog text.
    #[error("syntax error in catalog file line {line}: {message}")]
    CatalogSyntax { line: usize, message: String },

    /// A structural rule was violated (duplicate root, bad identifier,
    /// LBN out of range, overflow without strict mode).
    #[error("{0}")]
    Invariant(String),

    /// A host path could not be opened or created.
    #[error("cannot open {path}: {source}")]
    HostFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::CatalogSyntax {
            line,
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn host_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::HostFile {
            path: path.into(),
            source,
        }
    }
}
