//! Error taxonomy surfaced to callers of the converter.

use core::time::Duration;

use thiserror::Error;

use crate::interpreter::InterpreterError;
use crate::parser::ParseError;
use crate::path::Path;

/// A structural problem found after a script finished executing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("target '{dependent}' depends on undeclared target '{missing}'")]
    DanglingDependency { dependent: String, missing: String },

    #[error("target '{name}' is declared more than once")]
    DuplicateTarget { name: String },

    #[error("variable reference cycle: {}", .path.join(" -> "))]
    ReferenceCycle { path: Vec<String> },

    #[error("variable '{variable}' refers to undefined variable '{reference}'")]
    UnresolvedReference { variable: String, reference: String },
}

/// A nested script could not be loaded. Carries the requesting logical
/// name and the resolved path.
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("script '{name}' not found at {path}")]
    NotFound { name: String, path: Path },

    #[error("failed to read script '{name}' at {path}: {message}")]
    Io {
        name: String,
        path: Path,
        message: String,
    },

    #[error("syntax error in script '{name}' ({path}): {source}")]
    Syntax {
        name: String,
        path: Path,
        #[source]
        source: ParseError,
    },

    #[error("script '{name}' ({path}) failed: {source}")]
    Execution {
        name: String,
        path: Path,
        #[source]
        source: Box<InterpreterError>,
    },

    #[error("script '{name}' ({path}) is already being loaded")]
    Recursive { name: String, path: Path },

    /// An earlier inclusion of the same script failed; it is not run again.
    #[error("script '{name}' ({path}) failed earlier: {message}")]
    Failed {
        name: String,
        path: Path,
        message: String,
        fatal: bool,
    },
}

impl IncludeError {
    pub fn name(&self) -> &str {
        match self {
            IncludeError::NotFound { name, .. }
            | IncludeError::Io { name, .. }
            | IncludeError::Syntax { name, .. }
            | IncludeError::Execution { name, .. }
            | IncludeError::Recursive { name, .. }
            | IncludeError::Failed { name, .. } => name,
        }
    }

    /// Timeouts must never be swallowed by a tolerant include.
    pub fn is_timeout(&self) -> bool {
        match self {
            IncludeError::Execution { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Whether a tolerant include must still propagate this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            IncludeError::Recursive { .. } => true,
            IncludeError::Execution { source, .. } => source.is_fatal(),
            IncludeError::Failed { fatal, .. } => *fatal,
            _ => false,
        }
    }
}

/// Why one file's conversion produced no output.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{path}: {source}")]
    Syntax {
        path: Path,
        #[source]
        source: ParseError,
    },

    #[error("{path}: {source}")]
    Execution {
        path: Path,
        #[source]
        source: InterpreterError,
    },

    #[error("{path}: conversion timed out after {:.1}s", .elapsed.as_secs_f64())]
    Timeout { path: Path, elapsed: Duration },

    #[error("{path}: {} validation error(s): {}", .errors.len(), join_errors(.errors))]
    Validation {
        path: Path,
        errors: Vec<ValidationError>,
    },

    #[error("{path}: {source}")]
    Include {
        path: Path,
        #[source]
        source: IncludeError,
    },

    #[error("{path}: {message}")]
    Io { path: Path, message: String },
}

impl ConvertError {
    pub fn path(&self) -> &Path {
        match self {
            ConvertError::Syntax { path, .. }
            | ConvertError::Execution { path, .. }
            | ConvertError::Timeout { path, .. }
            | ConvertError::Validation { path, .. }
            | ConvertError::Include { path, .. }
            | ConvertError::Io { path, .. } => path,
        }
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConvertError::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
