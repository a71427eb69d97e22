//! Error types for ItemSQL
//!
//! Every failure of the engine, from value arithmetic up to select execution,
//! is reported through the single [`Error`] enum below.

use crate::item_data::{ItemDataType, ItemId};
use thiserror::Error;

/// The main error type for ItemSQL operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Type Errors ==========
    #[error(
        "Undefined operation: '{operator}' between {lhs} and {rhs} (ItemID: {lhs_id} and {rhs_id})"
    )]
    UndefinedOperation {
        operator: &'static str,
        lhs: ItemDataType,
        rhs: ItemDataType,
        lhs_id: ItemId,
        rhs_id: ItemId,
    },

    #[error(
        "Invalid operation: '{operator}' between {lhs} and {rhs} (ItemID: {lhs_id} and {rhs_id})"
    )]
    InvalidOperation {
        operator: &'static str,
        lhs: ItemDataType,
        rhs: ItemDataType,
        lhs_id: ItemId,
        rhs_id: ItemId,
    },

    #[error("Undefined operation: '{operator}' on {operand} (ItemID: {id})")]
    UndefinedUnaryOperation {
        operator: &'static str,
        operand: ItemDataType,
        id: ItemId,
    },

    #[error("Payload type mismatch for item {id}: expected {expected}, found {found}")]
    PayloadTypeMismatch {
        id: ItemId,
        expected: ItemDataType,
        found: ItemDataType,
    },

    // ========== Schema Errors ==========
    #[error("Type mismatch at column {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: ItemDataType,
        found: ItemDataType,
    },

    #[error("Item group is frozen")]
    GroupFrozen,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    // ========== Query Errors ==========
    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    // ========== Limit Errors ==========
    #[error("Join result exceeds the limit of {limit} rows")]
    JoinLimitExceeded { limit: usize },

    #[error("Query result exceeds the limit of {limit} rows")]
    ResultLimitExceeded { limit: usize },

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ItemSQL operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error comes from an operation between value types
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Error::UndefinedOperation { .. }
                | Error::InvalidOperation { .. }
                | Error::UndefinedUnaryOperation { .. }
                | Error::PayloadTypeMismatch { .. }
        )
    }

    /// Returns true if this error is a violation of a row or table schema
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. } | Error::GroupFrozen | Error::ColumnNotFound(_)
        )
    }

    /// Returns true if this error was raised while parsing SQL text
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::QueryParse(_))
    }

    /// Returns true if this error indicates a programming-logic fault
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}
