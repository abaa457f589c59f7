//! Transport errors

use thiserror::Error;

/// Errors that can occur on the pub/sub transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker refused or could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established session dropped
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The subscription request could not be queued
    #[error("Subscribe to '{topic}' failed: {message}")]
    SubscribeFailed {
        /// Requested topic filter
        topic: String,
        /// Client error text
        message: String,
    },

    /// The broker ended the session
    #[error("Closed by broker")]
    Closed,

    /// `start` was called twice
    #[error("Connection manager already started")]
    AlreadyStarted,
}
