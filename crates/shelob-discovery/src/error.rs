//! Error types for peer discovery.

use thiserror::Error;

/// Result type alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur while resolving a peer group.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No in-cluster identity could be loaded or the client could not be built.
    #[error("failed to load cluster credentials: {0}")]
    Credentials(String),

    #[error("group not found: {0}")]
    NotFound(String),

    #[error("directory query failed: {0}")]
    Api(String),
}
