//! Error types for the pad subsystem

use super::handler::HandlerKind;
use thiserror::Error;

/// Errors raised by pad backends and the pad thread
#[derive(Debug, Error)]
pub enum PadError {
    /// The backend has no device matching the requested identifier
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The backend kind is not compiled into this build
    #[error("Handler not available on this platform: {0}")]
    HandlerUnavailable(HandlerKind),

    /// The backend failed to set up its platform resources
    #[error("Backend initialization error: {0}")]
    BackendInit(String),

    /// bind was called before init succeeded
    #[error("Handler not initialized: {0}")]
    NotInitialized(HandlerKind),

    #[error("Failed to spawn pad thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
