// src/encode/huffman.rs

//! Huffman table generation for the entropy coder.
//!
//! Two paths produce a table: the recommended tables from T.81 Annex K
//! (used for I frames and the default still path), and data-trained tables
//! built from a stream of source symbols with the Annex K procedure —
//! Huffman's algorithm over a frequency histogram with a reserved sentinel
//! symbol, followed by the `adjust_bits` loop that limits code lengths to 16.
//!
//! Either way the result is a (BITS, HUFFVAL) pair from which canonical
//! codes are derived per Annex C. The sentinel guarantees no emitted code
//! consists solely of 1-bits.

use crate::utils::{MjvError, Result};

/// Maximum code length during tree construction, before limiting to 16.
const MAX_CLEN: usize = 32;

/// A Huffman table in JPEG interchange form.
///
/// `bits[i]` is the number of codes of length `i + 1`; `values` lists the
/// symbols in order of increasing code length, ties broken by symbol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    pub bits: [u8; 16],
    pub values: Vec<u8>,
}

impl HuffmanTable {
    /// Total number of coded symbols.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Trains a length-limited table from a stream of source symbols.
    ///
    /// Follows T.81 Annex K section K.2: count frequencies, reserve the
    /// sentinel pseudo-symbol (so the all-ones codeword stays unassigned),
    /// run Huffman's merge loop, then fold code lengths deeper than 16 back
    /// up with the adjust-bits procedure.
    pub fn train(symbols: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut freq = [0i64; 257];
        for s in symbols {
            freq[s as usize] += 1;
        }
        Self::from_frequencies(&mut freq)
    }

    fn from_frequencies(freq: &mut [i64; 257]) -> Result<Self> {
        // The sentinel takes part in the tree with the lowest possible
        // nonzero frequency and ends up with the longest all-ones code,
        // which is then dropped from BITS.
        freq[256] = 1;

        let mut codesize = [0usize; 257];
        let mut others = [-1i32; 257];

        // Huffman's algorithm: repeatedly merge the two least-frequent
        // subtrees, incrementing the code size of every leaf involved.
        loop {
            let mut c1: i32 = -1;
            let mut c2: i32 = -1;
            let mut v1 = i64::MAX;
            let mut v2 = i64::MAX;
            for (i, &f) in freq.iter().enumerate() {
                if f == 0 {
                    continue;
                }
                // Ties resolve to the higher symbol index, matching the
                // reference procedure's scan direction.
                if f <= v1 {
                    v2 = v1;
                    c2 = c1;
                    v1 = f;
                    c1 = i as i32;
                } else if f <= v2 {
                    v2 = f;
                    c2 = i as i32;
                }
            }

            if c2 < 0 {
                break;
            }

            let c1 = c1 as usize;
            let c2 = c2 as usize;

            freq[c1] += freq[c2];
            freq[c2] = 0;

            codesize[c1] += 1;
            let mut node = c1;
            while others[node] >= 0 {
                node = others[node] as usize;
                codesize[node] += 1;
            }

            others[node] = c2 as i32;

            codesize[c2] += 1;
            let mut node = c2;
            while others[node] >= 0 {
                node = others[node] as usize;
                codesize[node] += 1;
            }
        }

        // Count codes per length.
        let mut bits_long = [0i32; MAX_CLEN + 1];
        for &cs in codesize.iter() {
            if cs > 0 {
                if cs > MAX_CLEN {
                    return Err(MjvError::InternalInvariant(
                        "Huffman code length exceeds construction bound".into(),
                    ));
                }
                bits_long[cs] += 1;
            }
        }

        // adjust_bits: fold lengths deeper than 16 back up by splitting a
        // shorter code into two longer siblings.
        for i in (17..=MAX_CLEN).rev() {
            while bits_long[i] > 0 {
                let mut j = i - 2;
                while j > 0 && bits_long[j] == 0 {
                    j -= 1;
                }
                if j == 0 {
                    return Err(MjvError::InternalInvariant(
                        "Huffman length limiting failed".into(),
                    ));
                }
                bits_long[i] -= 2;
                bits_long[i - 1] += 1;
                bits_long[j + 1] += 2;
                bits_long[j] -= 1;
            }
        }

        // Drop the sentinel's code from the deepest occupied length.
        let mut longest = 16;
        while longest > 0 && bits_long[longest] == 0 {
            longest -= 1;
        }
        if longest > 0 {
            bits_long[longest] -= 1;
        }

        let mut bits = [0u8; 16];
        for (i, slot) in bits.iter_mut().enumerate() {
            *slot = bits_long[i + 1] as u8;
        }

        // HUFFVAL: real symbols sorted by code size, then by value.
        let mut with_sizes: Vec<(usize, u8)> = (0..256)
            .filter(|&s| codesize[s] > 0)
            .map(|s| (codesize[s], s as u8))
            .collect();
        with_sizes.sort();
        let values: Vec<u8> = with_sizes.into_iter().map(|(_, s)| s).collect();

        debug_assert_eq!(
            values.len(),
            bits.iter().map(|&b| b as usize).sum::<usize>()
        );

        Ok(Self { bits, values })
    }

    // The four recommended tables from T.81 Annex K.

    pub fn default_dc_luminance() -> Self {
        Self {
            bits: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            values: (0..=11).collect(),
        }
    }

    pub fn default_dc_chrominance() -> Self {
        Self {
            bits: [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0],
            values: (0..=11).collect(),
        }
    }

    pub fn default_ac_luminance() -> Self {
        Self {
            bits: [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7D],
            values: vec![
                0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13,
                0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42,
                0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A,
                0x16, 0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35,
                0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A,
                0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67,
                0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84,
                0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
                0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3,
                0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7,
                0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1,
                0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4,
                0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
            ],
        }
    }

    pub fn default_ac_chrominance() -> Self {
        Self {
            bits: [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77],
            values: vec![
                0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51,
                0x07, 0x61, 0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xA1, 0xB1,
                0xC1, 0x09, 0x23, 0x33, 0x52, 0xF0, 0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24,
                0x34, 0xE1, 0x25, 0xF1, 0x17, 0x18, 0x19, 0x1A, 0x26, 0x27, 0x28, 0x29, 0x2A,
                0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
                0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66,
                0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x82,
                0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96,
                0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA,
                0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5,
                0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9,
                0xDA, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF2, 0xF3, 0xF4,
                0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
            ],
        }
    }
}

/// Canonical codes derived from a [`HuffmanTable`], indexed by symbol.
#[derive(Debug, Clone)]
pub struct CodeTable {
    /// (code, length) per symbol; length 0 means the symbol has no code.
    codes: [(u16, u8); 256],
}

impl CodeTable {
    /// Generates canonical codes per T.81 Annex C (figures C.1-C.3).
    pub fn from_table(table: &HuffmanTable) -> Result<Self> {
        let mut codes = [(0u16, 0u8); 256];
        let mut code: u32 = 0;
        let mut si = 0usize;

        for length in 1..=16u8 {
            let count = table.bits[(length - 1) as usize] as usize;
            for _ in 0..count {
                let Some(&symbol) = table.values.get(si) else {
                    return Err(MjvError::InternalInvariant(
                        "Huffman BITS and HUFFVAL disagree on symbol count".into(),
                    ));
                };
                if code >= (1u32 << length) {
                    return Err(MjvError::InternalInvariant(format!(
                        "Huffman code overflow at length {length}"
                    )));
                }
                codes[symbol as usize] = (code as u16, length);
                code += 1;
                si += 1;
            }
            code <<= 1;
        }

        if si != table.values.len() {
            return Err(MjvError::InternalInvariant(
                "Huffman BITS and HUFFVAL disagree on symbol count".into(),
            ));
        }

        Ok(Self { codes })
    }

    /// The (code, length) pair for a symbol.
    pub fn code(&self, symbol: u8) -> Result<(u16, u8)> {
        let (code, len) = self.codes[symbol as usize];
        if len == 0 {
            return Err(MjvError::InternalInvariant(format!(
                "no Huffman code for symbol {symbol:#04x}"
            )));
        }
        Ok((code, len))
    }

    /// All assigned (symbol, code, length) triples, for inspection.
    pub fn assigned(&self) -> Vec<(u8, u16, u8)> {
        self.codes
            .iter()
            .enumerate()
            .filter(|(_, (_, len))| *len > 0)
            .map(|(s, &(code, len))| (s as u8, code, len))
            .collect()
    }
}
