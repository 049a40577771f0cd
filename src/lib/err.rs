//! The tagged error taxonomy shared by every component in the solver.
//!
//! §7 fixes a small, closed set of tag values that must survive all the way
//! to the JSON emitted on stdout. `ErrorKind` is that set; `SolveError` pairs
//! a kind with the human-readable reason string callers see both on stderr
//! (`"<Kind>: <reason>"`) and in the emitted error object.

use std::fmt;

use thiserror::Error;

/// The tag values from §7. `Library(name)` covers "any other resolver-library
/// error" whose kind is the library's own error-class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Error,
    MarkingErrors,
    DepsolveError,
    RepoError,
    GPGKeyReadError,
    Library(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidRequest => write!(f, "InvalidRequest"),
            ErrorKind::Error => write!(f, "Error"),
            ErrorKind::MarkingErrors => write!(f, "MarkingErrors"),
            ErrorKind::DepsolveError => write!(f, "DepsolveError"),
            ErrorKind::RepoError => write!(f, "RepoError"),
            ErrorKind::GPGKeyReadError => write!(f, "GPGKeyReadError"),
            ErrorKind::Library(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {reason}")]
pub struct SolveError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl SolveError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        SolveError {
            kind,
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::InvalidRequest, reason)
    }

    pub fn generic(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::Error, reason)
    }

    pub fn marking(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::MarkingErrors, reason)
    }

    pub fn depsolve(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::DepsolveError, reason)
    }

    pub fn repo(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::RepoError, reason)
    }

    pub fn gpg(reason: impl Into<String>) -> Self {
        SolveError::new(ErrorKind::GPGKeyReadError, reason)
    }
}

pub type Res<T> = Result<T, SolveError>;

// Library errors we don't model explicitly are folded in with their Rust
// type name standing in for "the library's error-class name" (§7).
impl From<std::io::Error> for SolveError {
    fn from(e: std::io::Error) -> Self {
        SolveError::new(ErrorKind::Library("IOError".to_string()), e.to_string())
    }
}

impl From<serde_json::Error> for SolveError {
    fn from(e: serde_json::Error) -> Self {
        SolveError::new(ErrorKind::InvalidRequest, e.to_string())
    }
}

impl From<reqwest::Error> for SolveError {
    fn from(e: reqwest::Error) -> Self {
        SolveError::new(ErrorKind::RepoError, e.to_string())
    }
}

impl From<quick_xml::Error> for SolveError {
    fn from(e: quick_xml::Error) -> Self {
        SolveError::new(ErrorKind::RepoError, e.to_string())
    }
}
