//! The motion-compensated video wrapper: configuration, input sources,
//! the GOP driver and the container bitstream.

pub mod config;
pub mod encoder;
pub mod source;
pub mod stats;

pub use config::{EncoderConfig, FrameKind, GopStructure};
pub use encoder::{EncodeResult, VideoEncoder};
pub use source::Source;
pub use stats::{EncodeStats, FrameStats};
