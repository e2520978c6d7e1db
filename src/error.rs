//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
///
/// Rejecting a request is not an error: the limiter reports it as a normal
/// `false` decision.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Invalid limiter or service configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A time source moved backwards
    #[error("Clock error: {0}")]
    Clock(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
