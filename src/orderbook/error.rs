//! Order book error types

use thiserror::Error;

/// Errors returned by the book's fallible APIs.
///
/// Command processing never returns these: invalid commands become
/// [`Event::Error`](super::event::Event::Error) entries instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrderBookError {
    /// Key `0` is reserved for the skip list header.
    #[error("invalid price key: 0 is reserved")]
    InvalidKey,

    /// Order not found in the book
    #[error("order not found: {0}")]
    OrderNotFound(u64),

    /// An order with the same id already rests in the book
    #[error("duplicate order: {0}")]
    DuplicateOrder(u64),

    /// Snapshot is for another market
    #[error("snapshot market mismatch: expected {expected}, got {actual}")]
    MarketMismatch {
        /// Market served by the book
        expected: String,
        /// Market named by the snapshot
        actual: String,
    },

    /// Error while serializing snapshot data
    #[error("serialization error: {message}")]
    SerializationError {
        /// Underlying error message
        message: String,
    },

    /// Error while deserializing snapshot data
    #[error("deserialization error: {message}")]
    DeserializationError {
        /// Underlying error message
        message: String,
    },

    /// Snapshot format version is not understood
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// Snapshot integrity check failed
    #[error("checksum mismatch: expected {expected}, but computed {actual}")]
    ChecksumMismatch {
        /// Expected checksum value
        expected: String,
        /// Actual checksum value
        actual: String,
    },
}
