//! Integration tests for the baseline JPEG bitstream: marker structure,
//! entropy-coded content, and the closed-loop reconstruction property.
//!
//! A small scan decoder lives at the bottom of this file so the tests can
//! read back what the encoder wrote; it only understands the subset the
//! encoder emits (baseline, non-interleaved, 8-bit).

use mjv_encoder::encode::{dct, zigzag};
use mjv_encoder::{ChromaMode, HuffmanMode, JpegEncoder, StageToggles, YCbCrFrame};

fn encoder(quality: u8) -> JpegEncoder {
    JpegEncoder::new(quality, StageToggles::default()).unwrap()
}

fn grey_frame(w: usize, h: usize) -> YCbCrFrame {
    YCbCrFrame::from_packed(w, h, vec![128u8; w * h * 3]).unwrap()
}

fn ramp_frame(w: usize, h: usize) -> YCbCrFrame {
    let mut data = Vec::with_capacity(w * h * 3);
    for _y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[x as u8, 128, 128]);
        }
    }
    YCbCrFrame::from_packed(w, h, data).unwrap()
}

#[test]
fn grey_frame_emits_the_expected_marker_sequence() {
    let jpeg = encoder(50);
    let enc = jpeg
        .encode_packed(&grey_frame(16, 16), ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    assert_eq!(parsed.width, 16);
    assert_eq!(parsed.height, 16);
    assert_eq!(parsed.component_count, 3);
    assert_eq!(parsed.huffman_tables.len(), 4);
    assert_eq!(parsed.scans.len(), 3);
    assert_eq!(parsed.scans[0].component, 1);
    assert_eq!(parsed.scans[1].component, 2);
    assert_eq!(parsed.scans[2].component, 3);
}

#[test]
fn grey_frame_scans_decode_to_zero_blocks() {
    let jpeg = encoder(50);
    let enc = jpeg
        .encode_packed(&grey_frame(16, 16), ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    for scan in &parsed.scans {
        // 16x16 at 4:4:4 means four 8x8 blocks per channel.
        let blocks = parsed.decode_scan(scan, 4);
        assert_eq!(blocks.len(), 4);
        for block in &blocks {
            assert!(block.iter().all(|&c| c == 0), "non-zero coefficient");
        }
    }
}

#[test]
fn quality_one_clamps_tables_and_kills_all_acs() {
    let jpeg = encoder(1);
    let enc = jpeg
        .encode_packed(&ramp_frame(16, 16), ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    for table in &parsed.quant_tables {
        assert!(table.iter().all(|&q| q == 255));
    }
    for scan in &parsed.scans {
        for block in parsed.decode_scan(scan, 4) {
            assert!(block[1..].iter().all(|&c| c == 0), "AC survived Q=1");
        }
    }
}

#[test]
fn ramp_concentrates_in_zigzag_index_one() {
    let jpeg = encoder(100);
    let enc = jpeg
        .encode_packed(&ramp_frame(16, 16), ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    let blocks = parsed.decode_scan(&parsed.scans[0], 4);
    // The first horizontal frequency of the first block survives Q=100
    // quantisation and sits at zig-zag index 1.
    assert_ne!(blocks[0][1], 0);
    // It dominates every later AC coefficient.
    let dominant = blocks[0][1].abs();
    for &c in &blocks[0][2..] {
        assert!(c.abs() <= dominant);
    }
}

#[test]
fn every_ecs_is_byte_stuffed() {
    // A busy frame to produce plenty of 0xFF-prone scan bytes.
    let mut data = Vec::new();
    for i in 0..(32 * 32) {
        data.extend_from_slice(&[
            ((i * 73) % 256) as u8,
            ((i * 151) % 256) as u8,
            ((i * 31) % 256) as u8,
        ]);
    }
    let frame = YCbCrFrame::from_packed(32, 32, data).unwrap();
    let jpeg = encoder(95);
    let enc = jpeg
        .encode_packed(&frame, ChromaMode::F444, HuffmanMode::Trained)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    for scan in &parsed.scans {
        let raw = &scan.raw_ecs;
        for i in 0..raw.len() {
            if raw[i] == 0xFF {
                assert!(
                    i + 1 < raw.len() && raw[i + 1] == 0x00,
                    "unstuffed 0xFF at ECS offset {i}"
                );
            }
        }
    }
}

#[test]
fn emitted_huffman_tables_are_prefix_free_and_avoid_all_ones() {
    let mut data = Vec::new();
    for i in 0..(16 * 16) {
        data.extend_from_slice(&[((i * 97) % 256) as u8, ((i * 7) % 256) as u8, 100]);
    }
    let frame = YCbCrFrame::from_packed(16, 16, data).unwrap();
    let jpeg = encoder(75);
    let enc = jpeg
        .encode_packed(&frame, ChromaMode::F444, HuffmanMode::Trained)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);

    for table in &parsed.huffman_tables {
        let codes = canonical_codes(&table.bits, &table.values);
        for (i, &(code_a, len_a, _)) in codes.iter().enumerate() {
            assert_ne!(code_a, (1u32 << len_a) - 1, "all-ones code emitted");
            for &(code_b, len_b, _) in codes.iter().skip(i + 1) {
                let min = len_a.min(len_b);
                assert_ne!(
                    code_a >> (len_a - min),
                    code_b >> (len_b - min),
                    "prefix collision"
                );
            }
        }
    }
}

#[test]
fn stored_reconstruction_matches_a_decode_of_the_bitstream() {
    let mut data = Vec::new();
    for y in 0..16usize {
        for x in 0..16usize {
            data.extend_from_slice(&[(x * 9 + y * 5) as u8, (60 + x * 3) as u8, (200 - y * 4) as u8]);
        }
    }
    let frame = YCbCrFrame::from_packed(16, 16, data).unwrap();
    let jpeg = encoder(50);
    let enc = jpeg
        .encode_packed(&frame, ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let bytes = jpeg.emit_jpeg(&enc).unwrap();
    let parsed = ParsedJpeg::parse(&bytes);
    let recon = enc.reconstruction.as_ref().unwrap();

    for (scan_idx, plane) in [&recon.y, &recon.cb, &recon.cr].into_iter().enumerate() {
        let blocks = parsed.decode_scan(&parsed.scans[scan_idx], 4);
        let table = &parsed.quant_tables[usize::from(scan_idx != 0)];
        let mut decoded = vec![0u8; 16 * 16];
        for (bi, zz) in blocks.iter().enumerate() {
            let bx = bi % 2;
            let by = bi / 2;
            // Undo zig-zag, dequantise, inverse DCT.
            let mut coeffs = [0f32; 64];
            for zi in 0..64 {
                coeffs[zigzag::ZIGZAG[zi]] = (zz[zi] * table[zigzag::ZIGZAG[zi]] as i32) as f32;
            }
            let samples = dct::inverse_8x8(&coeffs);
            for y in 0..8 {
                for x in 0..8 {
                    decoded[(by * 8 + y) * 16 + bx * 8 + x] =
                        dct::level_unshift(samples[y * 8 + x]);
                }
            }
        }
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(
                    decoded[y * 16 + x],
                    plane.get(x, y),
                    "closed loop broken at scan {scan_idx} ({x},{y})"
                );
            }
        }
    }
}

#[test]
fn high_quality_roundtrip_is_within_one() {
    let mut data = Vec::new();
    for y in 0..16usize {
        for x in 0..16usize {
            data.extend_from_slice(&[(x * 8 + y * 4) as u8, 128, 128]);
        }
    }
    let frame = YCbCrFrame::from_packed(16, 16, data).unwrap();
    let enc = encoder(100)
        .encode_packed(&frame, ChromaMode::F444, HuffmanMode::Default)
        .unwrap();
    let recon = enc.reconstruction.unwrap();
    for y in 0..16 {
        for x in 0..16 {
            let a = frame.pixel(x, y).0 as i32;
            let b = recon.y.get(x, y) as i32;
            assert!((a - b).abs() <= 1);
        }
    }
}

// --- test-side bitstream reader --------------------------------------------

struct HuffmanSpec {
    bits: [u8; 16],
    values: Vec<u8>,
    class: u8,
    id: u8,
}

struct Scan {
    component: u8,
    dc_table: u8,
    ac_table: u8,
    /// ECS bytes as written (still stuffed).
    raw_ecs: Vec<u8>,
}

struct ParsedJpeg {
    width: usize,
    height: usize,
    component_count: usize,
    /// Quant tables by id, natural order.
    quant_tables: Vec<[u16; 64]>,
    huffman_tables: Vec<HuffmanSpec>,
    scans: Vec<Scan>,
}

impl ParsedJpeg {
    fn parse(bytes: &[u8]) -> Self {
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8], "missing SOI");
        let mut parsed = ParsedJpeg {
            width: 0,
            height: 0,
            component_count: 0,
            quant_tables: Vec::new(),
            huffman_tables: Vec::new(),
            scans: Vec::new(),
        };

        let mut pos = 2;
        loop {
            assert_eq!(bytes[pos], 0xFF, "expected marker at {pos}");
            let m = bytes[pos + 1];
            pos += 2;
            match m {
                0xD9 => break, // EOI
                0xDB => {
                    let len = be16(bytes, pos) as usize;
                    let mut p = pos + 2;
                    while p < pos + len {
                        let id = bytes[p] & 0x0F;
                        let mut table = [0u16; 64];
                        for zi in 0..64 {
                            table[zigzag::ZIGZAG[zi]] = bytes[p + 1 + zi] as u16;
                        }
                        assert_eq!(id as usize, parsed.quant_tables.len());
                        parsed.quant_tables.push(table);
                        p += 65;
                    }
                    pos += len;
                }
                0xC4 => {
                    let len = be16(bytes, pos) as usize;
                    let mut p = pos + 2;
                    while p < pos + len {
                        let class = bytes[p] >> 4;
                        let id = bytes[p] & 0x0F;
                        let mut bits = [0u8; 16];
                        bits.copy_from_slice(&bytes[p + 1..p + 17]);
                        let count: usize = bits.iter().map(|&b| b as usize).sum();
                        let values = bytes[p + 17..p + 17 + count].to_vec();
                        parsed.huffman_tables.push(HuffmanSpec {
                            bits,
                            values,
                            class,
                            id,
                        });
                        p += 17 + count;
                    }
                    pos += len;
                }
                0xC0 => {
                    let len = be16(bytes, pos) as usize;
                    parsed.height = be16(bytes, pos + 3) as usize;
                    parsed.width = be16(bytes, pos + 5) as usize;
                    parsed.component_count = bytes[pos + 7] as usize;
                    pos += len;
                }
                0xDA => {
                    let len = be16(bytes, pos) as usize;
                    let component = bytes[pos + 3];
                    let tables = bytes[pos + 4];
                    pos += len;
                    // ECS runs until the next marker (0xFF followed by a
                    // non-zero byte).
                    let start = pos;
                    while !(bytes[pos] == 0xFF && bytes[pos + 1] != 0x00) {
                        pos += 1;
                    }
                    parsed.scans.push(Scan {
                        component,
                        dc_table: tables >> 4,
                        ac_table: tables & 0x0F,
                        raw_ecs: bytes[start..pos].to_vec(),
                    });
                }
                other => panic!("unexpected marker 0xFF{other:02X}"),
            }
        }
        parsed
    }

    fn huffman(&self, class: u8, id: u8) -> &HuffmanSpec {
        self.huffman_tables
            .iter()
            .find(|t| t.class == class && t.id == id)
            .expect("table present")
    }

    /// Decodes a scan into zig-zag-ordered quantised blocks, with the DC
    /// differentials already resolved.
    fn decode_scan(&self, scan: &Scan, block_count: usize) -> Vec<[i32; 64]> {
        let dc = canonical_codes(
            &self.huffman(0, scan.dc_table).bits,
            &self.huffman(0, scan.dc_table).values,
        );
        let ac = canonical_codes(
            &self.huffman(1, scan.ac_table).bits,
            &self.huffman(1, scan.ac_table).values,
        );

        // De-stuff.
        let mut data = Vec::with_capacity(scan.raw_ecs.len());
        let mut i = 0;
        while i < scan.raw_ecs.len() {
            data.push(scan.raw_ecs[i]);
            if scan.raw_ecs[i] == 0xFF {
                assert_eq!(scan.raw_ecs[i + 1], 0x00);
                i += 1;
            }
            i += 1;
        }

        let mut reader = BitReader { data, pos: 0 };
        let mut blocks = Vec::with_capacity(block_count);
        let mut prev_dc = 0i32;
        for _ in 0..block_count {
            let mut block = [0i32; 64];
            let category = decode_symbol(&mut reader, &dc);
            prev_dc += reader.receive_extend(category);
            block[0] = prev_dc;

            let mut zi = 1;
            while zi < 64 {
                let symbol = decode_symbol(&mut reader, &ac);
                if symbol == 0x00 {
                    break; // EOB
                }
                if symbol == 0xF0 {
                    zi += 16;
                    continue;
                }
                zi += (symbol >> 4) as usize;
                block[zi] = reader.receive_extend(symbol & 0x0F);
                zi += 1;
            }
            blocks.push(block);
        }
        blocks
    }
}

fn be16(bytes: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([bytes[pos], bytes[pos + 1]])
}

/// (code, length, symbol) triples per T.81 Annex C.
fn canonical_codes(bits: &[u8; 16], values: &[u8]) -> Vec<(u32, u8, u8)> {
    let mut out = Vec::new();
    let mut code = 0u32;
    let mut si = 0;
    for length in 1..=16u8 {
        for _ in 0..bits[(length - 1) as usize] {
            out.push((code, length, values[si]));
            code += 1;
            si += 1;
        }
        code <<= 1;
    }
    out
}

struct BitReader {
    data: Vec<u8>,
    pos: usize,
}

impl BitReader {
    fn read_bit(&mut self) -> u32 {
        let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        bit as u32
    }

    fn read_bits(&mut self, count: u8) -> u32 {
        let mut v = 0;
        for _ in 0..count {
            v = (v << 1) | self.read_bit();
        }
        v
    }

    /// Reads `category` magnitude bits and sign-extends them (T.81 F.12).
    fn receive_extend(&mut self, category: u8) -> i32 {
        if category == 0 {
            return 0;
        }
        let v = self.read_bits(category) as i32;
        if v < (1 << (category - 1)) {
            v - (1 << category) + 1
        } else {
            v
        }
    }
}

fn decode_symbol(reader: &mut BitReader, codes: &[(u32, u8, u8)]) -> u8 {
    let mut code = 0u32;
    let mut len = 0u8;
    loop {
        code = (code << 1) | reader.read_bit();
        len += 1;
        if let Some(&(_, _, symbol)) = codes
            .iter()
            .find(|&&(c, l, _)| l == len && c == code)
        {
            return symbol;
        }
        assert!(len <= 16, "no symbol for code {code:b}/{len}");
    }
}
