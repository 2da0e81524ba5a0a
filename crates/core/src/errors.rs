//! Core error types for the performance engine.
//!
//! This module defines storage-agnostic error types. Backend-specific errors
//! (filesystem, serialization) are converted to these types by the storage layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use rust_decimal::Decimal;
use std::num::ParseFloatError;
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the performance engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Data integrity check failed: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Unknown performance field '{0}'")]
    UnknownField(String),

    #[error("Data point for {date} appended out of order (last date is {last})")]
    PointOutOfOrder { date: NaiveDate, last: NaiveDate },

    #[error("Block store operation failed: {0}")]
    Repository(String),

    #[error("Performance source failed: {0}")]
    Source(String),

    #[error("Composite operation failed: {0}")]
    Composite(#[from] CompositeError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to load configuration: {0}")]
    ConfigIO(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Raised when independently derived values for a data point disagree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataIntegrityError {
    #[error(
        "pnl mismatch on {date}: attribution pnl {attributed} vs market value pnl {derived}"
    )]
    PnlMismatch {
        date: NaiveDate,
        attributed: Decimal,
        derived: Decimal,
    },
}

/// Errors raised by composite membership implementations.
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Composite '{0}' does not exist")]
    NotFound(String),

    #[error("Composite '{0}' already exists")]
    AlreadyExists(String),
}

/// Validation errors for caller input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Failed to parse number: {0}")]
    NumberParse(#[from] ParseFloatError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Repository(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Repository(err.to_string())
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
