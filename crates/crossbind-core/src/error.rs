//! Error types for marshaling and dispatch.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ConversionError  - one converter/executor could not interpret a value
//! NativeFault      - the native call itself reported a fault
//! CallError        - one overload attempt failed (carries an ErrorKind)
//! DispatchError    - every overload failed, or a signature lookup missed
//! CompileError     - trampoline source failed to compile
//! ```
//!
//! Conversion errors are always recovered by the dispatcher's scan loop.
//! They only reach the caller folded into [`DispatchError::Exhausted`].

use std::fmt;

use thiserror::Error;

// ============================================================================
// Error kinds
// ============================================================================

/// Host-visible category of a failure.
///
/// The dispatcher uses the kind to decide what error type an aggregated
/// failure reports: the common kind when every attempt agrees, otherwise
/// [`ErrorKind::TypeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeError,
    ValueError,
    LookupError,
    /// The attempted conversion exists in principle but is not supported.
    /// Never decides the kind of an aggregated error.
    NotImplemented,
    SystemError,
    NativeFault,
    /// An error raised by host code, e.g. inside a host callback.
    HostError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::LookupError => "LookupError",
            ErrorKind::NotImplemented => "NotImplementedError",
            ErrorKind::SystemError => "SystemError",
            ErrorKind::NativeFault => "NativeFault",
            ErrorKind::HostError => "HostError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Conversion errors
// ============================================================================

/// A single converter or executor could not interpret a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("{expected} expected, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("{0}")]
    InvalidValue(String),

    #[error("string of length {len} does not fit buffer of size {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("buffer of {actual} passed where buffer of {expected} was required")]
    BufferKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("object of class {actual} is not a {expected}")]
    WrongClass { expected: String, actual: String },

    #[error("object proxy is stale or its native object was destroyed")]
    StaleProxy,

    #[error("object is not movable")]
    NotMovable,

    #[error("cannot convert argument of unknown type \"{0}\"")]
    UnknownType(String),

    #[error("conversion for \"{0}\" is not implemented")]
    NotImplemented(String),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::OutOfRange { .. }
            | ConversionError::InvalidValue(_)
            | ConversionError::TooLong { .. } => ErrorKind::ValueError,
            ConversionError::StaleProxy => ErrorKind::ValueError,
            ConversionError::NotImplemented(_) => ErrorKind::NotImplemented,
            _ => ErrorKind::TypeError,
        }
    }

    pub fn mismatch(expected: &'static str, actual: &'static str) -> Self {
        ConversionError::TypeMismatch { expected, actual }
    }
}

// ============================================================================
// Native faults
// ============================================================================

/// A fault reported by the native call itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("native fault: {0}")]
pub struct NativeFault(pub String);

// ============================================================================
// Call errors
// ============================================================================

/// Failure of one overload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    /// Prefix the message with the prototype of the overload that failed.
    pub fn in_context(mut self, prototype: &str) -> Self {
        self.message = format!("{prototype} =>\n    {}", self.message);
        self
    }
}

impl From<ConversionError> for CallError {
    fn from(err: ConversionError) -> Self {
        CallError::new(err.kind(), err.to_string())
    }
}

impl From<NativeFault> for CallError {
    fn from(err: NativeFault) -> Self {
        CallError::new(ErrorKind::NativeFault, err.to_string())
    }
}

// ============================================================================
// Dispatch errors
// ============================================================================

/// Errors surfaced to the caller of an overload set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Every overload failed.
    #[error("{message}")]
    Exhausted { kind: ErrorKind, message: String },

    /// The only overload failed, reported as-is.
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("signature \"{0}\" not found")]
    SignatureNotFound(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Exhausted { kind, .. } => *kind,
            DispatchError::Call(err) => err.kind,
            DispatchError::SignatureNotFound(_) => ErrorKind::LookupError,
        }
    }
}

// ============================================================================
// Compile errors
// ============================================================================

/// A generated trampoline failed to compile or link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to compile trampoline for '{class}': {message}")]
pub struct CompileError {
    pub class: String,
    pub message: String,
    /// The generated translation unit, for diagnostics.
    pub unit: String,
}
