//! Error types for stkpak-common.

use thiserror::Error;

/// Common error type for stkpak operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A UTF-16 string contained an unpaired surrogate.
    #[error("invalid UTF-16 string at offset {offset}")]
    InvalidUtf16 { offset: usize },
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
