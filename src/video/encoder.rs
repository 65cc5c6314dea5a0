// src/video/encoder.rs

//! The GOP driver: partitions the input into groups of pictures, encodes
//! I frames through the JPEG still path and P frames as motion vectors plus
//! a JPEG-coded residual, maintains the closed-loop reference buffer, and
//! emits the container bitstream.
//!
//! Container layout (all lengths big-endian):
//!
//! ```text
//! FFB0 | gop_p_count(2) | fps(1)
//! DQT
//! per GOP:
//!   SOF0
//!   mv_table_len(2) | MV table BITS(16) + HUFFVAL
//!   DHT (four tables)
//!   FFB1
//!   per frame:
//!     FFB2 (I) or FFB3 (P)
//!     SOS + ECS for Y, Cb, Cr
//!     if P: FFB4 | mv_len(1) | entropy-coded vectors
//! FFBF
//! ```

use byteorder::{BigEndian, WriteBytesExt};
use tracing::{debug, info};

use super::config::{EncoderConfig, FrameKind};
use super::source::Source;
use super::stats::{EncodeStats, FrameStats};
use crate::bits::{category_of, BitString};
use crate::encode::huffman::{CodeTable, HuffmanTable};
use crate::encode::jpeg::{self, ChannelEncoding, FrameEncoding, FrameTables, HuffmanMode, JpegEncoder};
use crate::encode::motion::{self, MotionField, Residual};
use crate::image::subsample::{to_packed, to_planar};
use crate::image::{Plane, PlanarFrame, SignedPlane, YCbCrFrame};
use crate::utils::{psnr::psnr, MjvError, Result};

/// Container marker codes (reserved JPEG markers).
pub mod marker {
    pub const START_OF_VIDEO: u16 = 0xFFB0;
    pub const START_OF_GOP: u16 = 0xFFB1;
    pub const INTRA_FRAME: u16 = 0xFFB2;
    pub const PREDICTED_FRAME: u16 = 0xFFB3;
    pub const MOTION_VECTORS: u16 = 0xFFB4;
    pub const END_OF_VIDEO: u16 = 0xFFBF;
}

/// Everything an encode run produces.
#[derive(Debug, Clone)]
pub struct EncodeResult {
    /// The container bitstream; empty when a pipeline stage is toggled off.
    pub bitstream: Vec<u8>,
    pub stats: EncodeStats,
    /// The closed-loop reconstruction of every frame, packed back to
    /// full-resolution YCbCr. Empty when reconstruction is disabled.
    pub reconstructed: Vec<YCbCrFrame>,
}

/// One frame's buffered output, held until the GOP's Huffman and
/// motion-vector tables have been trained.
struct FrameRecord {
    index: usize,
    kind: FrameKind,
    scans: Vec<u8>,
    /// The transformed-but-not-yet-entropy-coded frame of a predicted
    /// frame; its scan bits are filled in once the GOP's pooled tables
    /// exist. Intra frames are finished immediately.
    enc: Option<FrameEncoding>,
    field: Option<MotionField>,
    luma_psnr: Option<f64>,
}

/// The video encoder.
pub struct VideoEncoder {
    config: EncoderConfig,
    jpeg: JpegEncoder,
}

impl VideoEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        let jpeg = JpegEncoder::new(config.quality, config.stages)?;
        Ok(Self { config, jpeg })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Parses a selector, materialises the source and encodes it.
    pub fn encode_selector(&self, selector: &str) -> Result<EncodeResult> {
        self.encode(Source::parse(selector)?)
    }

    /// Materialises a source and encodes it.
    pub fn encode(&self, source: Source) -> Result<EncodeResult> {
        let frames = source.materialise()?;
        self.encode_frames(&frames)
    }

    /// Encodes already-materialised packed frames.
    pub fn encode_frames(&self, frames: &[YCbCrFrame]) -> Result<EncodeResult> {
        self.config.validate()?;
        if frames.is_empty() {
            return Err(MjvError::InvalidInput("no frames to encode".into()));
        }
        let width = frames[0].width();
        let height = frames[0].height();
        for (i, frame) in frames.iter().enumerate() {
            if frame.width() != width || frame.height() != height {
                return Err(MjvError::Geometry(format!(
                    "frame {i} is {}x{}, expected {width}x{height}",
                    frame.width(),
                    frame.height()
                )));
            }
        }

        let mode = self.config.subsampling;
        let planar_frames: Vec<PlanarFrame> = frames
            .iter()
            .map(|f| to_planar(f, mode))
            .collect::<Result<_>>()?;

        let emit = self.config.stages.bitstream && self.config.stages.codes_entropy();
        let params = self.config.motion_params();
        let gop_len = self.config.gop.len();

        let mut out: Vec<u8> = Vec::new();
        if emit {
            out.write_u16::<BigEndian>(marker::START_OF_VIDEO)?;
            out.write_u16::<BigEndian>(self.config.gop.predicted_count() as u16)?;
            out.write_u8(self.config.framerate)?;
            self.jpeg.write_dqt(&mut out)?;
        }

        let mut stats = EncodeStats::default();
        let mut reconstructed = Vec::new();
        let mut reference: Option<PlanarFrame> = None;

        for (gop_index, gop_frames) in planar_frames.chunks(gop_len).enumerate() {
            let first_index = gop_index * gop_len;
            let mut records: Vec<FrameRecord> = Vec::with_capacity(gop_frames.len());

            for (j, planar) in gop_frames.iter().enumerate() {
                let kind = self.config.gop.kind(j);
                let record = match kind {
                    FrameKind::Intra => self.encode_intra(
                        first_index + j,
                        planar,
                        emit,
                        &mut reference,
                        &mut reconstructed,
                    )?,
                    FrameKind::Predicted => self.encode_predicted(
                        first_index + j,
                        planar,
                        &params,
                        &mut reference,
                        &mut reconstructed,
                    )?,
                };
                records.push(record);
            }

            // Train one Huffman table set per GOP from the pooled symbols
            // of every predicted frame, then entropy-code those frames
            // with it. This is the table set the GOP's DHT declares, so
            // every scan in the GOP decodes against the emitted header.
            // An I-only GOP keeps the Annex K defaults the intra path uses.
            let trained_sets: Vec<&[ChannelEncoding; 3]> = records
                .iter()
                .filter_map(|r| r.enc.as_ref().map(|e| &e.channels))
                .collect();
            let gop_tables = if trained_sets.is_empty() {
                FrameTables::annex_k_defaults()
            } else {
                FrameTables::train(&trained_sets)?
            };

            for record in &mut records {
                if let Some(enc) = record.enc.as_mut() {
                    self.jpeg.entropy_code(enc, &gop_tables)?;
                    if emit {
                        self.jpeg.emit_scans(enc, &mut record.scans)?;
                    }
                }
            }

            // Train the GOP's motion-vector table on every component of
            // every P frame in the GOP.
            let mv_symbols: Vec<u8> = records
                .iter()
                .filter_map(|r| r.field.as_ref())
                .flat_map(|f| f.components_raster())
                .map(category_of)
                .collect();
            let mv_table = HuffmanTable::train(mv_symbols)?;

            if emit {
                self.emit_gop(
                    &records,
                    &gop_tables,
                    &mv_table,
                    planar_frames[0].display_width,
                    planar_frames[0].display_height,
                    &mut out,
                    &mut stats,
                )?;
            } else {
                for record in &records {
                    stats.push(FrameStats {
                        index: record.index,
                        kind: record.kind,
                        frame_bits: 0,
                        mv_bits: 0,
                        total_bits: 0,
                        luma_psnr: record.luma_psnr,
                    });
                }
            }

            debug!(
                gop = gop_index,
                frames = gop_frames.len(),
                mv_symbols = mv_table.len(),
                "encoded GOP"
            );
        }

        if emit {
            out.write_u16::<BigEndian>(marker::END_OF_VIDEO)?;
        }

        info!(
            frames = frames.len(),
            bytes = out.len(),
            "video encode complete"
        );

        Ok(EncodeResult {
            bitstream: out,
            stats,
            reconstructed,
        })
    }

    fn encode_intra(
        &self,
        index: usize,
        planar: &PlanarFrame,
        emit: bool,
        reference: &mut Option<PlanarFrame>,
        reconstructed: &mut Vec<YCbCrFrame>,
    ) -> Result<FrameRecord> {
        // Intra frames always emit the Annex K default tables; decoders
        // know them without reading the GOP's DHT.
        let enc = self.jpeg.encode_planar(planar, HuffmanMode::Default)?;

        let mut scans = Vec::new();
        if emit {
            self.jpeg.emit_scans(&enc, &mut scans)?;
        }

        let luma_psnr = enc.reconstruction.as_ref().map(|r| luma_psnr(planar, r));
        if let Some(recon) = enc.reconstruction {
            reconstructed.push(to_packed(&recon)?);
            *reference = Some(recon);
        }

        Ok(FrameRecord {
            index,
            kind: FrameKind::Intra,
            scans,
            enc: None,
            field: None,
            luma_psnr,
        })
    }

    fn encode_predicted(
        &self,
        index: usize,
        planar: &PlanarFrame,
        params: &motion::MotionParams,
        reference: &mut Option<PlanarFrame>,
        reconstructed: &mut Vec<YCbCrFrame>,
    ) -> Result<FrameRecord> {
        let reference_frame = reference.as_ref().ok_or_else(|| {
            MjvError::InternalInvariant("predicted frame without a reference".into())
        })?;

        let (field, residual) = motion::estimate(planar, reference_frame, params)?;
        let mapped = map_residual(&residual, planar)?;

        // The residual goes through the JPEG transform now; its entropy
        // coding waits for the GOP's pooled tables. The reconstruction
        // only depends on the quantised coefficients, so the closed loop
        // advances immediately.
        let mut enc = self.jpeg.transform_planar(&mapped)?;

        let recon_mapped = enc.reconstruction.take().ok_or_else(|| {
            MjvError::InternalInvariant("predicted frame encoded without reconstruction".into())
        })?;
        let recon_residual = unmap_residual(&recon_mapped);
        let recon = motion::reconstruct(reference_frame, &field, &recon_residual, params)?;

        let luma_psnr = Some(luma_psnr(planar, &recon));
        reconstructed.push(to_packed(&recon)?);
        *reference = Some(recon);

        Ok(FrameRecord {
            index,
            kind: FrameKind::Predicted,
            scans: Vec::new(),
            enc: Some(enc),
            field: Some(field),
            luma_psnr,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_gop(
        &self,
        records: &[FrameRecord],
        gop_tables: &FrameTables,
        mv_table: &HuffmanTable,
        display_width: usize,
        display_height: usize,
        out: &mut Vec<u8>,
        stats: &mut EncodeStats,
    ) -> Result<()> {
        jpeg::write_sof0(display_width, display_height, self.config.subsampling, out)?;

        // Motion-vector Huffman table: length, BITS, HUFFVAL.
        out.write_u16::<BigEndian>((16 + mv_table.values.len()) as u16)?;
        out.extend_from_slice(&mv_table.bits);
        out.extend_from_slice(&mv_table.values);

        jpeg::write_dht(gop_tables, out)?;
        out.write_u16::<BigEndian>(marker::START_OF_GOP)?;

        let mv_codes = if mv_table.is_empty() {
            None
        } else {
            Some(CodeTable::from_table(mv_table)?)
        };

        for record in records {
            let frame_start = out.len();
            let mut mv_bit_count = 0usize;

            match record.kind {
                FrameKind::Intra => out.write_u16::<BigEndian>(marker::INTRA_FRAME)?,
                FrameKind::Predicted => out.write_u16::<BigEndian>(marker::PREDICTED_FRAME)?,
            }
            out.extend_from_slice(&record.scans);

            if let Some(field) = &record.field {
                let codes = mv_codes.as_ref().ok_or_else(|| {
                    MjvError::InternalInvariant("P frame but empty MV table".into())
                })?;
                let mut bits = BitString::new();
                for component in field.components_column_major() {
                    let category = category_of(component);
                    let (code, len) = codes.code(category)?;
                    bits.push_bits(code as u32, len);
                    bits.push_magnitude(component, category);
                }
                mv_bit_count = bits.len();
                bits.pad_to_byte_boundary();
                let bytes = bits.to_bytes()?;
                if bytes.len() > 255 {
                    // The container's single length byte cannot express a
                    // larger segment.
                    return Err(MjvError::InternalInvariant(format!(
                        "motion-vector segment exceeds 255 bytes ({})",
                        bytes.len()
                    )));
                }
                out.write_u16::<BigEndian>(marker::MOTION_VECTORS)?;
                out.write_u8(bytes.len() as u8)?;
                out.extend_from_slice(&bytes);
            }

            stats.push(FrameStats {
                index: record.index,
                kind: record.kind,
                frame_bits: (out.len() - frame_start) * 8,
                mv_bits: mv_bit_count,
                total_bits: out.len() * 8,
                luma_psnr: record.luma_psnr,
            });
        }

        Ok(())
    }
}

/// Maps a residual value in [-255, 255] into the 8-bit sample range with
/// `r' = round((r + 255) / 2)`.
fn map_residual(residual: &Residual, shape: &PlanarFrame) -> Result<PlanarFrame> {
    let map_plane = |res: &SignedPlane| -> Result<Plane> {
        let samples: Vec<u8> = res
            .as_raw()
            .iter()
            .map(|&r| {
                debug_assert!((-255..=255).contains(&r));
                ((r as i32 + 256) / 2) as u8
            })
            .collect();
        Plane::from_samples(res.width(), res.height(), &samples)
    };
    Ok(PlanarFrame {
        y: map_plane(&residual.y)?,
        cb: map_plane(&residual.cb)?,
        cr: map_plane(&residual.cr)?,
        mode: shape.mode,
        display_width: shape.display_width,
        display_height: shape.display_height,
    })
}

/// Inverts the residual range mapping symmetrically: `r = 2 * r' - 255`.
fn unmap_residual(mapped: &PlanarFrame) -> Residual {
    let unmap_plane = |plane: &Plane| -> SignedPlane {
        let mut out = SignedPlane::zeroed(plane.width(), plane.height());
        for y in 0..plane.height() {
            for x in 0..plane.width() {
                out.set(x, y, 2 * plane.get(x, y) as i16 - 255);
            }
        }
        out
    };
    Residual {
        y: unmap_plane(&mapped.y),
        cb: unmap_plane(&mapped.cb),
        cr: unmap_plane(&mapped.cr),
    }
}

/// Luma PSNR over the display region of a frame and its reconstruction.
fn luma_psnr(input: &PlanarFrame, recon: &PlanarFrame) -> f64 {
    let a = input.y.crop(input.display_width, input.display_height);
    let b = recon.y.crop(recon.display_width, recon.display_height);
    psnr(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ChromaMode;
    use crate::video::config::GopStructure;

    fn grey_frames(n: usize, w: usize, h: usize) -> Vec<YCbCrFrame> {
        (0..n)
            .map(|_| YCbCrFrame::from_packed(w, h, vec![128u8; w * h * 3]).unwrap())
            .collect()
    }

    fn config(gop: &str) -> EncoderConfig {
        EncoderConfig {
            gop: GopStructure::parse(gop).unwrap(),
            subsampling: ChromaMode::F444,
            ..Default::default()
        }
    }

    #[test]
    fn residual_mapping_is_symmetric() {
        // Zero maps to the mid-grey sample 128 and back to +1; odd values
        // round-trip exactly.
        assert_eq!((0i32 + 256) / 2, 128);
        for r in (-255i16..=255).step_by(2) {
            let mapped = ((r as i32 + 256) / 2) as u8;
            let back = 2 * mapped as i16 - 255;
            assert_eq!(back, r, "odd residual {r} must round-trip");
        }
        assert_eq!(((255i32 + 256) / 2) as u8, 255);
        assert_eq!(((-255i32 + 256) / 2) as u8, 0);
    }

    #[test]
    fn container_frames_the_stream() {
        let encoder = VideoEncoder::new(config("ip")).unwrap();
        let result = encoder.encode_frames(&grey_frames(2, 16, 16)).unwrap();
        let b = &result.bitstream;

        assert_eq!(&b[0..2], &[0xFF, 0xB0]);
        assert_eq!(&b[2..4], &[0, 1]); // one P frame per GOP
        assert_eq!(b[4], 25); // default framerate
        assert_eq!(&b[5..7], &[0xFF, 0xDB]); // global DQT
        assert_eq!(&b[b.len() - 2..], &[0xFF, 0xBF]);

        let count = |m: [u8; 2]| b.windows(2).filter(|w| *w == m).count();
        assert_eq!(count([0xFF, 0xB1]), 1); // one GOP
        assert_eq!(count([0xFF, 0xB2]), 1); // one I frame
        assert_eq!(count([0xFF, 0xB3]), 1); // one P frame
        assert_eq!(count([0xFF, 0xB4]), 1); // one MV segment
    }

    #[test]
    fn identical_frames_yield_zero_vectors() {
        let encoder = VideoEncoder::new(config("ip")).unwrap();
        let result = encoder.encode_frames(&grey_frames(2, 16, 16)).unwrap();
        assert_eq!(result.stats.frames.len(), 2);
        let p = &result.stats.frames[1];
        assert_eq!(p.kind, FrameKind::Predicted);
        // A 16x16 frame has one macroblock: two MV components, each coded
        // as category 0 by a one-symbol table (one bit each).
        assert_eq!(p.mv_bits, 2);
    }

    #[test]
    fn gop_partitioning() {
        let encoder = VideoEncoder::new(config("ipppp")).unwrap();
        let result = encoder.encode_frames(&grey_frames(10, 16, 16)).unwrap();
        assert_eq!(result.stats.frames.len(), 10);
        assert_eq!(result.stats.intra_count(), 2);
        assert_eq!(result.stats.predicted_count(), 8);
        let intra_indices: Vec<usize> = result
            .stats
            .frames
            .iter()
            .filter(|f| f.kind == FrameKind::Intra)
            .map(|f| f.index)
            .collect();
        assert_eq!(intra_indices, vec![0, 5]);

        let gops = result
            .bitstream
            .windows(2)
            .filter(|w| *w == [0xFF, 0xB1])
            .count();
        assert_eq!(gops, 2);
    }

    #[test]
    fn short_final_gop() {
        let encoder = VideoEncoder::new(config("ippp")).unwrap();
        let result = encoder.encode_frames(&grey_frames(6, 16, 16)).unwrap();
        // 6 frames, GOP length 4: one full GOP and one of length 2.
        assert_eq!(result.stats.intra_count(), 2);
        assert_eq!(result.stats.predicted_count(), 4);
    }

    #[test]
    fn encoding_is_deterministic() {
        let frames: Vec<YCbCrFrame> = (0..4)
            .map(|i| {
                let mut data = Vec::new();
                for p in 0..(32 * 24) {
                    data.extend_from_slice(&[((p * 7 + i * 13) % 256) as u8, 128, 130]);
                }
                YCbCrFrame::from_packed(32, 24, data).unwrap()
            })
            .collect();
        let a = VideoEncoder::new(config("ipp"))
            .unwrap()
            .encode_frames(&frames)
            .unwrap();
        let b = VideoEncoder::new(config("ipp"))
            .unwrap()
            .encode_frames(&frames)
            .unwrap();
        assert_eq!(a.bitstream, b.bitstream);
    }

    #[test]
    fn custom_huffman_option_leaves_the_video_path_unchanged() {
        // Textured frames, so default and trained tables genuinely differ:
        // if the option leaked into the GOP driver the bytes would change.
        let frames: Vec<YCbCrFrame> = (0..3)
            .map(|i| {
                let mut data = Vec::new();
                for p in 0..(32 * 32) {
                    data.extend_from_slice(&[((p * 11 + i * 29) % 256) as u8, 120, 135]);
                }
                YCbCrFrame::from_packed(32, 32, data).unwrap()
            })
            .collect();
        let plain = VideoEncoder::new(config("ipp"))
            .unwrap()
            .encode_frames(&frames)
            .unwrap();
        let mut cfg = config("ipp");
        cfg.custom_huffman = true;
        let custom = VideoEncoder::new(cfg)
            .unwrap()
            .encode_frames(&frames)
            .unwrap();
        assert_eq!(plain.bitstream, custom.bitstream);
    }

    #[test]
    fn mismatched_frame_sizes_are_rejected() {
        let mut frames = grey_frames(2, 16, 16);
        frames.push(YCbCrFrame::from_packed(8, 8, vec![128u8; 8 * 8 * 3]).unwrap());
        let encoder = VideoEncoder::new(config("ippp")).unwrap();
        assert!(matches!(
            encoder.encode_frames(&frames),
            Err(MjvError::Geometry(_))
        ));
    }

    #[test]
    fn disabled_bitstream_stage_returns_empty_output() {
        let mut cfg = config("ip");
        cfg.stages.bitstream = false;
        let encoder = VideoEncoder::new(cfg).unwrap();
        let result = encoder.encode_frames(&grey_frames(2, 16, 16)).unwrap();
        assert!(result.bitstream.is_empty());
        assert_eq!(result.stats.frames.len(), 2);
        assert_eq!(result.reconstructed.len(), 2);
    }

    #[test]
    fn reconstruction_tracks_every_frame() {
        let encoder = VideoEncoder::new(config("ipp")).unwrap();
        let result = encoder.encode_frames(&grey_frames(3, 16, 16)).unwrap();
        assert_eq!(result.reconstructed.len(), 3);
        for f in &result.reconstructed {
            assert_eq!(f.width(), 16);
            assert_eq!(f.height(), 16);
        }
        for s in &result.stats.frames {
            assert!(s.luma_psnr.unwrap() > 30.0);
        }
    }
}
