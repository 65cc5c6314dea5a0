// src/utils/log.rs

//! Structured logging for the encoder library.
//!
//! Uses the `tracing` crate for level-based, structured, context-aware
//! logging. Initialize the subscriber once before using the library:
//!
//! ```
//! mjv_encoder::utils::log::init_subscriber(tracing::Level::DEBUG);
//! ```
//!
//! The encoders emit `debug!`/`trace!` events at frame and GOP boundaries.

pub use tracing::{debug, error, info, span, trace, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initializes a global logging subscriber.
///
/// This should be called once at the beginning of the program's execution.
///
/// # Arguments
/// * `max_level` - The maximum level of messages to log (e.g., `Level::INFO`).
pub fn init_subscriber(max_level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_target(false)
        .finish();

    // A second call (e.g. from parallel tests) leaves the first subscriber
    // in place.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
