//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for vulnerability ingestion
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid CVE identifier: {id}")]
    InvalidCveId { id: String },

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("No existing composite and no new records to reconcile")]
    NothingToReconcile,

    #[error("Record {record_id} belongs to {found}, not to composite {expected}")]
    IdentifierMismatch {
        record_id: i64,
        expected: String,
        found: String,
    },
}
