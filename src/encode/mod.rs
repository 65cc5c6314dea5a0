//! The encoding core: transform coding, Huffman generation, entropy coding,
//! the baseline JPEG still encoder, and block-matching motion estimation.

pub mod dct;
pub mod entropy;
pub mod huffman;
pub mod jpeg;
pub mod motion;
pub mod quant;
pub mod rle;
pub mod zigzag;

// Re-export commonly used encoding functionality
pub use huffman::{CodeTable, HuffmanTable};
pub use jpeg::{FrameEncoding, HuffmanMode, JpegEncoder, StageToggles};
pub use motion::{DistortionMetric, MotionField, MotionParams, MotionVector, SearchAlgorithm};
pub use quant::QuantTable;
