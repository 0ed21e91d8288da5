//! Error types for month parsing and identifier validation.

use thiserror::Error;

/// Errors that can occur when parsing a month.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonthError {
    /// The month string is empty.
    #[error("month cannot be empty")]
    Empty,

    /// The month string is not `YYYY-MM` or `YYYY-MM-DD`.
    #[error("invalid month '{input}': expected YYYY-MM or YYYY-MM-DD")]
    InvalidFormat { input: String },

    /// The month arithmetic left the supported calendar range.
    #[error("month out of range")]
    OutOfRange,
}

/// Errors that can occur when building a SQL identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// The identifier is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The identifier exceeds the Postgres limit of 63 bytes.
    #[error("identifier '{name}' is {len} bytes; the limit is 63")]
    TooLong { name: String, len: usize },

    /// The identifier contains a character outside the allow-list.
    #[error("identifier '{name}' contains disallowed character {ch:?}")]
    InvalidChar { name: String, ch: char },

    /// The identifier does not start with a letter or underscore.
    #[error("identifier '{name}' must start with a letter or underscore")]
    InvalidStart { name: String },
}
