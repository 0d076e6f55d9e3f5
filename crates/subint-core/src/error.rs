//! Error types for integer type resolution

use crate::ir::LocalId;
use crate::typing::TypeNode;
use serde::Serialize;
use thiserror::Error;

/// A statement the collector cannot translate into constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement {index} (`{text}`): {reason}")]
pub struct MalformedStatement {
    pub index: usize,
    pub text: String,
    pub reason: String,
}

/// Phase-1 rejection. It triggers the fallback pass and only escapes
/// [`crate::resolve`] when fallback is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{reason}")]
pub struct RetryableInferenceFailure {
    pub statement: Option<usize>,
    pub reason: String,
}

/// Phase-2 rejection: the body cannot be typed and is left untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement {statement} (`{text}`) requires {required} but {local_name} is {found}{}", conflict_suffix(.conflicting))]
pub struct FatalTypeError {
    pub statement: usize,
    pub text: String,
    pub local: Option<LocalId>,
    pub local_name: String,
    pub found: TypeNode,
    pub required: TypeNode,
    /// Earlier statement that forced the conflicting type, when known
    pub conflicting: Option<(usize, String)>,
}

fn conflict_suffix(conflicting: &Option<(usize, String)>) -> String {
    match conflicting {
        Some((index, text)) => format!(" (forced by statement {index} `{text}`)"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("cannot type integer locals of `{method}`: {error}")]
    Fatal { method: String, error: FatalTypeError },

    #[error("malformed body `{method}`: {error}")]
    Malformed { method: String, error: MalformedStatement },

    #[error("optimistic pass rejected `{method}` and fallback is disabled: {error}")]
    Rejected {
        method: String,
        error: RetryableInferenceFailure,
    },
}

impl ResolveError {
    pub fn method(&self) -> &str {
        match self {
            ResolveError::Fatal { method, .. }
            | ResolveError::Malformed { method, .. }
            | ResolveError::Rejected { method, .. } => method,
        }
    }

    /// Index of the statement the failure is attributed to
    pub fn statement(&self) -> Option<usize> {
        match self {
            ResolveError::Fatal { error, .. } => Some(error.statement),
            ResolveError::Malformed { error, .. } => Some(error.index),
            ResolveError::Rejected { error, .. } => error.statement,
        }
    }
}

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;
