//! Error types shared by the keyspace and the command executor.
//!
//! Absence is never an error: every operation defines what it returns for a
//! missing key or field. The variants below are the failures a caller can
//! observe. `WrongType`, `NotANumber`, `NotAFloat` and `OutOfRange` are
//! reported before any mutation happens, so a failed command leaves the
//! keyspace exactly as it found it.

use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key exists but holds a different structure type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Integer arithmetic on a value that does not parse as `i64`.
    #[error("value is not an integer or out of range")]
    NotANumber,

    /// Float arithmetic on a value that does not parse as `f64`,
    /// or a NaN delta or result.
    #[error("value is not a valid float")]
    NotAFloat,

    /// Integer overflow or an argument outside its valid range.
    #[error("{0}")]
    OutOfRange(&'static str),

    /// A variadic command was called with too few arguments.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// Malformed command arguments.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The operation requires an existing key.
    #[error("no such key")]
    NoSuchKey,

    /// A blocking operation exceeded its deadline.
    #[error("timed out waiting for data")]
    Timeout,

    /// A blocking operation was withdrawn by its caller.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised while building an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held something that is not a number.
    #[error("invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    /// A setting is outside its accepted range.
    #[error("{0}")]
    Invalid(String),
}

/// Convenience alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;
