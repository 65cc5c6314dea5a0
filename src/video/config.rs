// src/video/config.rs

//! Encoder configuration and GOP structure parsing.

use std::fmt;
use std::str::FromStr;

use crate::encode::jpeg::{HuffmanMode, StageToggles};
use crate::encode::motion::{DistortionMetric, MotionParams, SearchAlgorithm};
use crate::image::ChromaMode;
use crate::utils::{MjvError, Result};

/// How one frame of a GOP is coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Intra-coded, without reference to any other frame.
    Intra,
    /// Predictively coded as motion vectors plus a residual.
    Predicted,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Intra => f.write_str("I"),
            FrameKind::Predicted => f.write_str("P"),
        }
    }
}

/// A parsed GOP structure string such as `"ippp"`.
///
/// The input stream is partitioned into consecutive GOPs of this length
/// (the final GOP may be shorter). The first character must be `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopStructure {
    kinds: Vec<FrameKind>,
}

impl GopStructure {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(MjvError::InvalidParameter(
                "GOP structure must not be empty".into(),
            ));
        }
        let mut kinds = Vec::with_capacity(s.len());
        for c in s.chars() {
            match c.to_ascii_lowercase() {
                'i' => kinds.push(FrameKind::Intra),
                'p' => kinds.push(FrameKind::Predicted),
                other => {
                    return Err(MjvError::InvalidParameter(format!(
                        "GOP structure may only contain 'i' and 'p', got {other:?}"
                    )))
                }
            }
        }
        if kinds[0] != FrameKind::Intra {
            return Err(MjvError::InvalidParameter(
                "a GOP must begin with an I frame".into(),
            ));
        }
        Ok(Self { kinds })
    }

    /// Frames per full GOP.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The coding kind at position `index` within a GOP.
    pub fn kind(&self, index: usize) -> FrameKind {
        self.kinds[index]
    }

    /// Number of predicted frames per full GOP.
    pub fn predicted_count(&self) -> usize {
        self.kinds
            .iter()
            .filter(|k| **k == FrameKind::Predicted)
            .count()
    }

    /// True when any frame of the structure is predicted.
    pub fn has_predicted(&self) -> bool {
        self.predicted_count() > 0
    }
}

impl FromStr for GopStructure {
    type Err = MjvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for GopStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for k in &self.kinds {
            match k {
                FrameKind::Intra => f.write_str("i")?,
                FrameKind::Predicted => f.write_str("p")?,
            }
        }
        Ok(())
    }
}

/// All options of the video encoder, with their defaults.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Quantisation quality factor, 1..=100.
    pub quality: u8,
    /// Chroma sampling mode.
    pub subsampling: ChromaMode,
    /// GOP structure.
    pub gop: GopStructure,
    /// Declared frame rate, 1..=255, written to the container header.
    pub framerate: u8,
    /// Block-matching search strategy.
    pub block_matching: SearchAlgorithm,
    /// Maximum motion-vector component magnitude in luma pixels.
    pub search_distance: i32,
    /// Macroblock edge length in luma pixels; at least 8 and a multiple of 8.
    pub macroblock_size: usize,
    /// Block distortion measure.
    pub metric: DistortionMetric,
    /// When set, the standalone still-image path trains optimised Huffman
    /// tables instead of using the Annex K defaults (see
    /// [`still_huffman_mode`](Self::still_huffman_mode)). The GOP driver
    /// ignores this option: intra frames always emit the Annex K default
    /// tables, and predicted frames always use the tables trained per GOP
    /// on their pooled residual symbols.
    pub custom_huffman: bool,
    /// Pipeline stage toggles.
    pub stages: StageToggles,
}

pub const DEFAULT_QUALITY: u8 = 50;
pub const DEFAULT_FRAMERATE: u8 = 25;
pub const DEFAULT_GOP: &str = "ippp";
pub const DEFAULT_SEARCH_DISTANCE: i32 = 8;
pub const DEFAULT_MACROBLOCK_SIZE: usize = 16;

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            subsampling: ChromaMode::default(),
            gop: GopStructure::parse(DEFAULT_GOP).expect("default GOP structure is valid"),
            framerate: DEFAULT_FRAMERATE,
            block_matching: SearchAlgorithm::default(),
            search_distance: DEFAULT_SEARCH_DISTANCE,
            macroblock_size: DEFAULT_MACROBLOCK_SIZE,
            metric: DistortionMetric::default(),
            custom_huffman: false,
            stages: StageToggles::default(),
        }
    }
}

impl EncoderConfig {
    /// Checks every option, surfacing the first violation before any coding
    /// starts.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(MjvError::InvalidParameter(format!(
                "quality must be in 1..=100, got {}",
                self.quality
            )));
        }
        if self.framerate == 0 {
            return Err(MjvError::InvalidParameter(
                "framerate must be in 1..=255".into(),
            ));
        }
        if self.macroblock_size < 8 || self.macroblock_size % 8 != 0 {
            return Err(MjvError::InvalidParameter(format!(
                "macroblock size must be a multiple of 8 and at least 8, got {}",
                self.macroblock_size
            )));
        }
        if self.search_distance < 1 {
            return Err(MjvError::InvalidParameter(format!(
                "search distance must be positive, got {}",
                self.search_distance
            )));
        }
        if self.gop.has_predicted() && !self.stages.reconstruction {
            return Err(MjvError::InvalidParameter(
                "predicted frames require the reconstruction stage (closed loop)".into(),
            ));
        }
        Ok(())
    }

    /// The block-matcher parameters implied by this configuration.
    pub fn motion_params(&self) -> MotionParams {
        MotionParams {
            block_size: self.macroblock_size,
            search_distance: self.search_distance,
            algorithm: self.block_matching,
            metric: self.metric,
        }
    }

    /// The Huffman mode the still-image path uses under this configuration.
    pub fn still_huffman_mode(&self) -> HuffmanMode {
        if self.custom_huffman {
            HuffmanMode::Trained
        } else {
            HuffmanMode::Default
        }
    }
}
