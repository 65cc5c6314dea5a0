// src/encode/jpeg.rs

//! The baseline JPEG still-image encoder.
//!
//! Orchestrates the per-frame pipeline — subsample, level shift, DCT,
//! quantise, zig-zag, run-length code, DC-differential code, entropy code —
//! and emits a standard T.81 baseline bitstream (SOI, DQT, DHT, SOF0, one
//! SOS + entropy-coded segment per channel, EOI).
//!
//! The encoder optionally maintains the decoder-side reconstruction of the
//! frame (dequantise, inverse DCT, inverse level shift) from the same
//! quantised coefficients that are emitted, which the video wrapper uses as
//! its closed-loop reference.

use byteorder::{BigEndian, WriteBytesExt};
use tracing::trace;

use crate::bits::category_of;
use crate::encode::dct;
use crate::encode::entropy::{self, ScanBits};
use crate::encode::huffman::{CodeTable, HuffmanTable};
use crate::encode::quant::{self, QuantTable};
use crate::encode::rle::{self, AcToken};
use crate::encode::zigzag;
use crate::image::subsample;
use crate::image::{ChromaMode, Plane, PlanarFrame, YCbCrFrame};
use crate::utils::Result;

/// Which Huffman tables the entropy coder uses for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HuffmanMode {
    /// The recommended tables from T.81 Annex K.
    #[default]
    Default,
    /// Tables trained on this frame's own DC/AC symbols.
    Trained,
}

/// Pipeline stage toggles.
///
/// Turning a stage off skips it and everything downstream of it; the frame
/// then carries no entropy-coded bits and emission produces an empty
/// bitstream. Reconstruction is independent of the coding stages.
#[derive(Debug, Clone, Copy)]
pub struct StageToggles {
    pub reordering: bool,
    pub run_length_coding: bool,
    pub dc_differentials: bool,
    pub entropy_coding: bool,
    pub bitstream: bool,
    pub reconstruction: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            reordering: true,
            run_length_coding: true,
            dc_differentials: true,
            entropy_coding: true,
            bitstream: true,
            reconstruction: true,
        }
    }
}

impl StageToggles {
    /// True when every coding stage up to entropy coding is enabled.
    pub fn codes_entropy(&self) -> bool {
        self.reordering && self.run_length_coding && self.dc_differentials && self.entropy_coding
    }
}

/// The four Huffman tables of a frame, in DHT emission order.
#[derive(Debug, Clone)]
pub struct FrameTables {
    pub dc_luma: HuffmanTable,
    pub ac_luma: HuffmanTable,
    pub dc_chroma: HuffmanTable,
    pub ac_chroma: HuffmanTable,
}

impl FrameTables {
    pub fn annex_k_defaults() -> Self {
        Self {
            dc_luma: HuffmanTable::default_dc_luminance(),
            ac_luma: HuffmanTable::default_ac_luminance(),
            dc_chroma: HuffmanTable::default_dc_chrominance(),
            ac_chroma: HuffmanTable::default_ac_chrominance(),
        }
    }

    /// (class, id, table) triples in DHT order: DC-Y, AC-Y, DC-C, AC-C.
    pub fn in_emission_order(&self) -> [(u8, u8, &HuffmanTable); 4] {
        [
            (0, 0, &self.dc_luma),
            (1, 0, &self.ac_luma),
            (0, 1, &self.dc_chroma),
            (1, 1, &self.ac_chroma),
        ]
    }

    /// Trains one table set from the pooled symbols of one or more frames'
    /// channel encodings: a DC/AC pair from the luma channels and one from
    /// both chroma channels.
    pub fn train(frames: &[&[ChannelEncoding; 3]]) -> Result<Self> {
        let mut dc_luma = Vec::new();
        let mut ac_luma = Vec::new();
        let mut dc_chroma = Vec::new();
        let mut ac_chroma = Vec::new();
        for channels in frames {
            for (idx, channel) in channels.iter().enumerate() {
                let (dc, ac) = if idx == 0 {
                    (&mut dc_luma, &mut ac_luma)
                } else {
                    (&mut dc_chroma, &mut ac_chroma)
                };
                dc.extend(channel.dc_diffs.iter().map(|&d| category_of(d)));
                ac.extend(channel.ac_tokens.iter().flatten().map(AcToken::symbol));
            }
        }
        Ok(Self {
            dc_luma: HuffmanTable::train(dc_luma)?,
            ac_luma: HuffmanTable::train(ac_luma)?,
            dc_chroma: HuffmanTable::train(dc_chroma)?,
            ac_chroma: HuffmanTable::train(ac_chroma)?,
        })
    }
}

/// Everything the pipeline produced for one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelEncoding {
    pub blocks_wide: usize,
    pub blocks_tall: usize,
    /// Quantised coefficient blocks in raster order, row-major within a block.
    pub quantised: Vec<[i32; 64]>,
    /// Zig-zag-ordered coefficient blocks.
    pub ordered: Vec<[i32; 64]>,
    /// Run-length-coded AC token sequences, one per block.
    pub ac_tokens: Vec<Vec<AcToken>>,
    /// DC differentials in raster block order.
    pub dc_diffs: Vec<i32>,
    /// Entropy-coded bit sequences.
    pub bits: ScanBits,
}

/// The complete per-frame encoder state.
#[derive(Debug, Clone)]
pub struct FrameEncoding {
    pub display_width: usize,
    pub display_height: usize,
    pub mode: ChromaMode,
    /// Channel state in scan order Y, Cb, Cr.
    pub channels: [ChannelEncoding; 3],
    pub tables: FrameTables,
    /// The decoder-side reconstruction, when the stage is enabled.
    pub reconstruction: Option<PlanarFrame>,
}

impl FrameEncoding {
    /// Total entropy-coded bits across all channels (before padding).
    pub fn scan_bit_count(&self) -> usize {
        self.channels.iter().map(|c| c.bits.scan.len()).sum()
    }
}

/// JPEG component identifiers in scan order.
const COMPONENT_IDS: [u8; 3] = [1, 2, 3];

/// The baseline JPEG encoder for a fixed quality factor.
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    luma_quant: QuantTable,
    chroma_quant: QuantTable,
    stages: StageToggles,
}

impl JpegEncoder {
    pub fn new(quality: u8, stages: StageToggles) -> Result<Self> {
        Ok(Self {
            luma_quant: QuantTable::luminance(quality)?,
            chroma_quant: QuantTable::chrominance(quality)?,
            stages,
        })
    }

    pub fn luma_quant(&self) -> &QuantTable {
        &self.luma_quant
    }

    pub fn chroma_quant(&self) -> &QuantTable {
        &self.chroma_quant
    }

    pub fn stages(&self) -> &StageToggles {
        &self.stages
    }

    /// Encodes a packed frame: subsamples it under `mode`, then runs the
    /// planar pipeline.
    pub fn encode_packed(
        &self,
        frame: &YCbCrFrame,
        mode: ChromaMode,
        huffman: HuffmanMode,
    ) -> Result<FrameEncoding> {
        let planar = subsample::to_planar(frame, mode)?;
        self.encode_planar(&planar, huffman)
    }

    /// Runs the block pipeline over already-subsampled planes, choosing the
    /// frame's own tables: the Annex K defaults, or tables trained on this
    /// frame's symbols.
    pub fn encode_planar(&self, planar: &PlanarFrame, huffman: HuffmanMode) -> Result<FrameEncoding> {
        let mut enc = self.transform_planar(planar)?;
        let tables = match huffman {
            HuffmanMode::Default => FrameTables::annex_k_defaults(),
            HuffmanMode::Trained => FrameTables::train(&[&enc.channels])?,
        };
        self.entropy_code(&mut enc, &tables)?;
        Ok(enc)
    }

    /// Runs the transform and ordering stages only, leaving the frame
    /// without entropy-coded bits. `entropy_code` finishes the job once the
    /// caller has chosen tables (the video wrapper trains one table set per
    /// GOP across several transformed frames).
    pub fn transform_planar(&self, planar: &PlanarFrame) -> Result<FrameEncoding> {
        let mut channels: [ChannelEncoding; 3] = Default::default();
        let mut recon_planes: Vec<Plane> = Vec::with_capacity(3);

        for (idx, plane) in planar.planes().into_iter().enumerate() {
            let table = if idx == 0 {
                &self.luma_quant
            } else {
                &self.chroma_quant
            };
            let (channel, recon) = self.transform_channel(plane, table)?;
            if let Some(r) = recon {
                recon_planes.push(r);
            }
            channels[idx] = channel;
        }

        let reconstruction = if self.stages.reconstruction {
            let mut planes = recon_planes.into_iter();
            Some(PlanarFrame {
                y: planes.next().expect("three reconstruction planes"),
                cb: planes.next().expect("three reconstruction planes"),
                cr: planes.next().expect("three reconstruction planes"),
                mode: planar.mode,
                display_width: planar.display_width,
                display_height: planar.display_height,
            })
        } else {
            None
        };

        Ok(FrameEncoding {
            display_width: planar.display_width,
            display_height: planar.display_height,
            mode: planar.mode,
            channels,
            tables: FrameTables::annex_k_defaults(),
            reconstruction,
        })
    }

    /// Entropy-codes a transformed frame with the given tables, which are
    /// recorded on the frame so emission and the container's DHT agree with
    /// the scan bits.
    pub fn entropy_code(&self, enc: &mut FrameEncoding, tables: &FrameTables) -> Result<()> {
        enc.tables = tables.clone();
        if !self.stages.codes_entropy() {
            return Ok(());
        }

        let code_tables = [
            (
                CodeTable::from_table(&tables.dc_luma)?,
                CodeTable::from_table(&tables.ac_luma)?,
            ),
            (
                CodeTable::from_table(&tables.dc_chroma)?,
                CodeTable::from_table(&tables.ac_chroma)?,
            ),
        ];
        for (idx, channel) in enc.channels.iter_mut().enumerate() {
            let (dc_codes, ac_codes) = &code_tables[usize::from(idx != 0)];
            channel.bits =
                entropy::encode_channel(&channel.dc_diffs, &channel.ac_tokens, dc_codes, ac_codes)?;
        }

        trace!(
            width = enc.display_width,
            height = enc.display_height,
            scan_bits = enc.channels.iter().map(|c| c.bits.scan.len()).sum::<usize>(),
            "entropy-coded frame"
        );
        Ok(())
    }

    /// Transforms one plane: level shift, DCT, quantise, and (optionally)
    /// the inverse path for reconstruction; then the ordering/coding stages.
    fn transform_channel(
        &self,
        plane: &Plane,
        table: &QuantTable,
    ) -> Result<(ChannelEncoding, Option<Plane>)> {
        let blocks_wide = plane.blocks_wide();
        let blocks_tall = plane.blocks_tall();
        let mut quantised = Vec::with_capacity(blocks_wide * blocks_tall);
        let mut recon = self
            .stages
            .reconstruction
            .then(|| Plane::filled(plane.width(), plane.height(), 0));

        for by in 0..blocks_tall {
            for bx in 0..blocks_wide {
                let mut block = [0f32; 64];
                for y in 0..8 {
                    for x in 0..8 {
                        block[y * 8 + x] = dct::level_shift(plane.get(bx * 8 + x, by * 8 + y));
                    }
                }
                let coeffs = dct::forward_8x8(&block);
                let levels = quant::quantise_block(&coeffs, table);

                if let Some(recon) = recon.as_mut() {
                    let dequantised = quant::dequantise_block(&levels, table);
                    let samples = dct::inverse_8x8(&dequantised);
                    for y in 0..8 {
                        for x in 0..8 {
                            recon.set(
                                bx * 8 + x,
                                by * 8 + y,
                                dct::level_unshift(samples[y * 8 + x]),
                            );
                        }
                    }
                }

                quantised.push(levels);
            }
        }

        let mut channel = ChannelEncoding {
            blocks_wide,
            blocks_tall,
            quantised,
            ..Default::default()
        };

        if self.stages.reordering {
            channel.ordered = channel.quantised.iter().map(zigzag::reorder_block).collect();

            if self.stages.run_length_coding {
                channel.ac_tokens = channel.ordered.iter().map(rle::run_length_code).collect();

                if self.stages.dc_differentials {
                    let dc_values: Vec<i32> = channel.ordered.iter().map(|b| b[0]).collect();
                    channel.dc_diffs = rle::dc_differentials(&dc_values);
                }
            }
        }

        Ok((channel, recon))
    }

    // --- bitstream emission ---------------------------------------------

    /// Emits a standalone T.81 baseline JPEG stream for the frame.
    pub fn emit_jpeg(&self, enc: &FrameEncoding) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if !(self.stages.bitstream && self.stages.codes_entropy()) {
            return Ok(out);
        }
        out.write_u16::<BigEndian>(marker::SOI)?;
        self.write_dqt(&mut out)?;
        write_dht(&enc.tables, &mut out)?;
        write_sof0(enc.display_width, enc.display_height, enc.mode, &mut out)?;
        self.emit_scans(enc, &mut out)?;
        out.write_u16::<BigEndian>(marker::EOI)?;
        Ok(out)
    }

    /// Emits the three per-channel scans (SOS header + byte-stuffed ECS).
    pub fn emit_scans(&self, enc: &FrameEncoding, out: &mut Vec<u8>) -> Result<()> {
        for (idx, channel) in enc.channels.iter().enumerate() {
            let table_id = u8::from(idx != 0);
            out.write_u16::<BigEndian>(marker::SOS)?;
            out.write_u16::<BigEndian>(8)?; // Ls = 6 + 2 * Ns
            out.write_u8(1)?; // Ns: one component per scan
            out.write_u8(COMPONENT_IDS[idx])?;
            out.write_u8(table_id << 4 | table_id)?; // Td:Ta
            out.write_u8(0)?; // Ss
            out.write_u8(63)?; // Se
            out.write_u8(0)?; // Ah:Al

            let mut ecs = channel.bits.scan.clone();
            ecs.pad_to_byte_boundary();
            out.extend_from_slice(&ecs.to_stuffed_bytes()?);
        }
        Ok(())
    }

    /// Emits one DQT segment holding the luminance and chrominance tables,
    /// both in zig-zag order.
    pub fn write_dqt(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u16::<BigEndian>(marker::DQT)?;
        out.write_u16::<BigEndian>(2 + 2 * 65)?;
        for (id, table) in [(0u8, &self.luma_quant), (1u8, &self.chroma_quant)] {
            out.write_u8(id)?; // Pq = 0 (8-bit), Tq = id
            for zi in 0..64 {
                out.write_u8(table.values[zigzag::ZIGZAG[zi]] as u8)?;
            }
        }
        Ok(())
    }
}

/// Emits one DHT segment holding the frame's four Huffman tables.
pub fn write_dht(tables: &FrameTables, out: &mut Vec<u8>) -> Result<()> {
    let entries = tables.in_emission_order();
    let payload: usize = entries.iter().map(|(_, _, t)| 1 + 16 + t.values.len()).sum();
    out.write_u16::<BigEndian>(marker::DHT)?;
    out.write_u16::<BigEndian>((2 + payload) as u16)?;
    for (class, id, table) in entries {
        out.write_u8(class << 4 | id)?;
        out.extend_from_slice(&table.bits);
        out.extend_from_slice(&table.values);
    }
    Ok(())
}

/// Emits the SOF0 frame header for a three-component frame.
pub fn write_sof0(width: usize, height: usize, mode: ChromaMode, out: &mut Vec<u8>) -> Result<()> {
    let (h_luma, v_luma) = mode.luma_sampling_factors();
    out.write_u16::<BigEndian>(marker::SOF0)?;
    out.write_u16::<BigEndian>(8 + 3 * 3)?; // Lf
    out.write_u8(8)?; // sample precision
    out.write_u16::<BigEndian>(height as u16)?;
    out.write_u16::<BigEndian>(width as u16)?;
    out.write_u8(3)?; // Nf
    for (idx, id) in COMPONENT_IDS.iter().enumerate() {
        out.write_u8(*id)?;
        if idx == 0 {
            out.write_u8(h_luma << 4 | v_luma)?;
            out.write_u8(0)?; // luminance quant table
        } else {
            out.write_u8(0x11)?;
            out.write_u8(1)?; // chrominance quant table
        }
    }
    Ok(())
}

/// JPEG marker codes used by the emitters.
pub mod marker {
    pub const SOI: u16 = 0xFFD8;
    pub const DQT: u16 = 0xFFDB;
    pub const DHT: u16 = 0xFFC4;
    pub const SOF0: u16 = 0xFFC0;
    pub const SOS: u16 = 0xFFDA;
    pub const EOI: u16 = 0xFFD9;
}
