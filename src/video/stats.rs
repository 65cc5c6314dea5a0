// src/video/stats.rs

//! Per-frame statistics recorded while encoding.

use super::config::FrameKind;

/// What one frame cost, and how faithful its reconstruction is.
#[derive(Debug, Clone)]
pub struct FrameStats {
    /// Position of the frame in the input stream.
    pub index: usize,
    pub kind: FrameKind,
    /// Bits of this frame's container payload (markers, scans, and the
    /// motion-vector segment).
    pub frame_bits: usize,
    /// Bits of the entropy-coded motion-vector data, before padding.
    pub mv_bits: usize,
    /// Cumulative size of the bitstream up to and including this frame.
    pub total_bits: usize,
    /// Luma PSNR of the reconstruction against the input, when the
    /// reconstruction stage is enabled.
    pub luma_psnr: Option<f64>,
}

/// Statistics for a whole encode run.
#[derive(Debug, Clone, Default)]
pub struct EncodeStats {
    pub frames: Vec<FrameStats>,
}

impl EncodeStats {
    pub fn push(&mut self, stats: FrameStats) {
        self.frames.push(stats);
    }

    /// Total bits of the emitted bitstream.
    pub fn total_bits(&self) -> usize {
        self.frames.last().map_or(0, |f| f.total_bits)
    }

    pub fn intra_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Intra)
            .count()
    }

    pub fn predicted_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Predicted)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut stats = EncodeStats::default();
        for (i, kind) in [FrameKind::Intra, FrameKind::Predicted, FrameKind::Predicted]
            .into_iter()
            .enumerate()
        {
            stats.push(FrameStats {
                index: i,
                kind,
                frame_bits: 100,
                mv_bits: 0,
                total_bits: (i + 1) * 100,
                luma_psnr: None,
            });
        }
        assert_eq!(stats.intra_count(), 1);
        assert_eq!(stats.predicted_count(), 2);
        assert_eq!(stats.total_bits(), 300);
    }
}
