// src/utils/error.rs

use thiserror::Error;

/// The primary error type for all operations in the MJV encoder library.
///
/// Every error is fatal to the current encode call: no partial bitstream is
/// emitted and no automatic recovery is attempted.
#[derive(Error, Debug)]
pub enum MjvError {
    /// An error occurred during I/O operations (e.g., file not found).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed source selector, unsupported file type, or a frame that is
    /// missing a channel.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration option is out of range or names an unknown variant.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Frame dimensions are incompatible with the requested block geometry.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// An internal invariant was violated. Seeing this is a bug in the
    /// encoder, not in the caller's input.
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Decoding a source image failed.
    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// A specialized `Result` type for encoder operations.
pub type Result<T> = std::result::Result<T, MjvError>;
