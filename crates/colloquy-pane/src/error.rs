//! Error types for the colloquy-pane crate

use thiserror::Error;

/// Result type alias for colloquy-pane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for colloquy-pane
#[derive(Error, Debug)]
pub enum Error {
    /// Remote channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] colloquy_api::ChannelError),

    /// Asset fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] colloquy_api::FetchError),

    /// The pane task is gone and can no longer accept commands
    #[error("Pane handle closed")]
    HandleClosed,
}
