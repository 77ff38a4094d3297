//! Crate error types.

use thiserror::Error;

/// Error raised while loading or validating a rule source.
///
/// Rule validation is fail-fast: the first invalid node aborts the whole
/// source, and `path` pins the failure to an exact location (node index
/// chain, optional `(name)` suffix, optional `.property` suffix).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid rule at {path}: {message}")]
pub struct ValidationError {
    /// Location of the offending node, e.g. `rules.yml[2](My Rule).add`.
    pub path: String,
    /// One-line human-readable description.
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Return the validation error when this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
