//! A motion-compensated video encoder built on a baseline JPEG core.
//!
//! Intra (I) frames go through a standard ITU-T T.81 baseline still-image
//! pipeline with the Annex K default Huffman tables; predicted (P) frames
//! are block-matched against the encoder's own reconstruction of the
//! previous frame, and their range-mapped residual goes through the same
//! JPEG pipeline with Huffman tables trained per GOP on the pooled residual
//! statistics. Frames are wrapped in a compact container that reuses
//! reserved JPEG markers.
//!
//! # Quick Start
//!
//! ```no_run
//! use mjv_encoder::{EncoderConfig, GopStructure, VideoEncoder};
//!
//! let config = EncoderConfig {
//!     quality: 75,
//!     gop: GopStructure::parse("ippp")?,
//!     ..Default::default()
//! };
//! let encoder = VideoEncoder::new(config)?;
//! let result = encoder.encode_selector("frames/f:001:120:.png")?;
//! std::fs::write("clip.mjv", &result.bitstream)?;
//! for frame in &result.stats.frames {
//!     println!(
//!         "{} {}: {} bits, psnr {:?}",
//!         frame.kind, frame.index, frame.frame_bits, frame.luma_psnr
//!     );
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The still-image path is usable on its own through
//! [`encode::JpegEncoder`], which emits standalone baseline JPEG files.

// Core modules
pub mod bits;
pub mod encode;
pub mod image;
pub mod utils;
pub mod video;

// Public driver API
pub use video::{EncodeResult, EncodeStats, EncoderConfig, FrameKind, FrameStats, GopStructure,
    Source, VideoEncoder};

// Still-image API
pub use encode::{FrameEncoding, HuffmanMode, JpegEncoder, StageToggles};

// Frame types
pub use crate::image::{ChromaMode, PlanarFrame, YCbCrFrame};

// Error types
pub use utils::error::{MjvError, Result};
