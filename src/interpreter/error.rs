use core::fmt;
use core::time::Duration;
use std::borrow::Cow;

use crate::error::IncludeError;

#[derive(Debug)]
pub enum InterpreterError {
    UndefinedVariable(Cow<'static, str>),
    UndefinedFunction(Cow<'static, str>),
    TypeError(Cow<'static, str>),
    RuntimeError(Cow<'static, str>),
    /// The script's time budget ran out.
    Timeout(Duration),
    /// A nested script could not be included.
    Include(Box<IncludeError>),
    /// A `raise` statement or failed `assert` in the script itself.
    Raised(Cow<'static, str>),
    /// `Exit()` / `sys.exit()`.
    Exit(i64),
    /// An error annotated with the script position it escaped from.
    Located {
        script: String,
        line: usize,
        error: Box<InterpreterError>,
    },
}

macro_rules! bail_type_error {
    ($msg:expr, $($arg:tt)*) => { return Err(InterpreterError::TypeError(format!($msg, $($arg)*).into())) };
    ($msg:expr) =>              { return Err(InterpreterError::TypeError(format!($msg).into())) };
    () =>                       { return Err(InterpreterError::TypeError("Type mismatch".into())) };
}

macro_rules! bail_runtime_error {
    ($msg:expr, $($arg:tt)*) => { return Err(InterpreterError::RuntimeError(format!($msg, $($arg)*).into())) };
    ($msg:expr) =>              { return Err(InterpreterError::RuntimeError(format!($msg).into())) };
    () =>                       { return Err(InterpreterError::RuntimeError("Runtime error".into())) };
}

pub(crate) use {bail_runtime_error, bail_type_error};

impl InterpreterError {
    /// The error without any location annotations.
    pub fn root(&self) -> &InterpreterError {
        match self {
            InterpreterError::Located { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self.root() {
            InterpreterError::Timeout(_) => true,
            InterpreterError::Include(include) => include.is_timeout(),
            _ => false,
        }
    }

    /// Errors a script-level `try` may not swallow.
    pub fn is_fatal(&self) -> bool {
        self.is_timeout() || matches!(self.root(), InterpreterError::Exit(_))
    }

    pub(crate) fn at(self, script: &str, line: usize) -> Self {
        match self {
            located @ InterpreterError::Located { .. } => located,
            error => InterpreterError::Located {
                script: script.to_string(),
                line,
                error: Box::new(error),
            },
        }
    }

    /// Message as seen by a script `except ... as e` binding.
    pub(crate) fn message(&self) -> String {
        match self.root() {
            InterpreterError::Raised(msg) => msg.to_string(),
            other => other.to_string(),
        }
    }
}

pub trait ErrorContext: Sized {
    type Ok;
    fn context_type(self, msg: impl Into<Cow<'static, str>>) -> Result<Self::Ok, InterpreterError> {
        self.with_context_type(|| msg)
    }
    fn context_runtime(
        self,
        msg: impl Into<Cow<'static, str>>,
    ) -> Result<Self::Ok, InterpreterError> {
        self.with_context_runtime(|| msg)
    }
    fn with_context_type<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<Self::Ok, InterpreterError>;
    fn with_context_runtime<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<Self::Ok, InterpreterError>;
}

impl<T, E: core::fmt::Display> ErrorContext for Result<T, E> {
    type Ok = T;
    fn with_context_type<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, InterpreterError> {
        self.map_err(|e| InterpreterError::TypeError(Cow::from(format!("{}: {}", f().into(), e))))
    }
    fn with_context_runtime<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, InterpreterError> {
        self.map_err(|e| {
            InterpreterError::RuntimeError(Cow::from(format!("{}: {}", f().into(), e)))
        })
    }
}

impl<T> ErrorContext for Option<T> {
    type Ok = T;
    fn with_context_type<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, InterpreterError> {
        self.ok_or_else(|| InterpreterError::TypeError(f().into()))
    }
    fn with_context_runtime<R: Into<Cow<'static, str>>>(
        self,
        f: impl FnOnce() -> R,
    ) -> Result<T, InterpreterError> {
        self.ok_or_else(|| InterpreterError::RuntimeError(f().into()))
    }
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InterpreterError::UndefinedVariable(name) => write!(f, "Undefined variable: {}", name),
            InterpreterError::UndefinedFunction(name) => write!(f, "Undefined function: {}", name),
            InterpreterError::TypeError(msg) => write!(f, "Type error: {}", msg),
            InterpreterError::RuntimeError(msg) => write!(f, "Runtime error: {}", msg),
            InterpreterError::Timeout(limit) => {
                write!(f, "Execution exceeded {:.1}s", limit.as_secs_f64())
            }
            InterpreterError::Include(err) => write!(f, "Include failed: {}", err),
            InterpreterError::Raised(msg) => write!(f, "Raised: {}", msg),
            InterpreterError::Exit(code) => write!(f, "Script exited with status {}", code),
            InterpreterError::Located {
                script,
                line,
                error,
            } => write!(f, "{}:{}: {}", script, line, error),
        }
    }
}

impl core::error::Error for InterpreterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_applied_once() {
        let err = InterpreterError::Raised("boom".into())
            .at("SConstruct", 3)
            .at("SConstruct", 9);
        assert_eq!(err.to_string(), "SConstruct:3: Raised: boom");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_timeout_survives_location() {
        let err = InterpreterError::Timeout(Duration::from_secs(1)).at("SConstruct", 1);
        assert!(err.is_timeout());
        assert!(err.is_fatal());
        assert!(!InterpreterError::Raised("x".into()).is_fatal());
    }
}
