//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by the transcoder, the query builder,
//! the executor and the subscription manager. Use [`DocumentStoreResult<T>`] as the
//! return type for fallible operations.
//!
//! Absence of a document on a read is not an error: single-document reads return
//! `Ok(None)`.

use std::fmt::Display;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// A native document handle's path does not decode to a `collection/id` chain.
    #[error("Malformed document path: {0}")]
    MalformedPath(String),
    /// The store rejected the query shape (e.g. inequality filters on multiple fields).
    ///
    /// This is a defect of the query itself and is never retried.
    #[error("Query execution error: {0}")]
    QueryExecution(String),
    /// The query could not be serialized into a native query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The document violates structural constraints (bad id, non-map payload, sentinel in a read).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The requested document was not found by an operation that requires it to exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// Serialization/deserialization error when converting between models and values.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A failure reported by the underlying store driver, relayed unmodified.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Returns `true` when the error denotes a query the store can never execute.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::QueryExecution(_) | DocumentStoreError::InvalidQuery(_)
        )
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl serde::ser::Error for DocumentStoreError {
    fn custom<T: Display>(msg: T) -> Self {
        DocumentStoreError::Serialization(msg.to_string())
    }
}

impl serde::de::Error for DocumentStoreError {
    fn custom<T: Display>(msg: T) -> Self {
        DocumentStoreError::Serialization(msg.to_string())
    }
}
