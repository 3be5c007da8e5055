//! Top-level error type.

use thiserror::Error;

use crossbind_core::{CallError, CompileError, ConversionError, DispatchError, ErrorKind};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Every failure the bridge surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("'{scope}' has no operation named '{name}'")]
    UnknownOverload { scope: String, name: String },

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("'{class}' has no virtual method '{method}' to override")]
    NotOverridable { class: String, method: String },
}

impl BridgeError {
    /// Host-visible category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Dispatch(err) => err.kind(),
            BridgeError::Compile(_) => ErrorKind::SystemError,
            BridgeError::Call(err) => err.kind,
            BridgeError::Conversion(err) => err.kind(),
            BridgeError::UnknownOverload { .. } | BridgeError::UnknownClass(_) => {
                ErrorKind::LookupError
            }
            BridgeError::NotOverridable { .. } => ErrorKind::TypeError,
        }
    }
}
