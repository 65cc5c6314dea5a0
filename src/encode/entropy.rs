// src/encode/entropy.rs

//! Entropy coding of DC differentials and run-length-coded AC tokens into
//! Huffman bit sequences.

use crate::bits::{category_of, BitString};
use crate::encode::huffman::CodeTable;
use crate::encode::rle::AcToken;
use crate::utils::Result;

/// Per-channel entropy-coded output.
///
/// `dc` and `ac` hold the concatenated code bits of each class on their own;
/// `scan` interleaves them per block (DC first, then the block's AC tokens),
/// which is the order the entropy-coded segment is emitted in.
#[derive(Debug, Clone, Default)]
pub struct ScanBits {
    pub dc: BitString,
    pub ac: BitString,
    pub scan: BitString,
}

/// Encodes one DC differential: the category's Huffman code followed by the
/// magnitude bits.
pub fn encode_dc(diff: i32, table: &CodeTable, out: &mut BitString) -> Result<()> {
    let category = category_of(diff);
    let (code, len) = table.code(category)?;
    out.push_bits(code as u32, len);
    out.push_magnitude(diff, category);
    Ok(())
}

/// Encodes one AC token: the (RRRR, SSSS) symbol's Huffman code followed by
/// the magnitude bits for run tokens.
pub fn encode_ac(token: &AcToken, table: &CodeTable, out: &mut BitString) -> Result<()> {
    let (code, len) = table.code(token.symbol())?;
    out.push_bits(code as u32, len);
    if let AcToken::Run { value, .. } = *token {
        out.push_magnitude(value, category_of(value));
    }
    Ok(())
}

/// Entropy-codes a whole channel: per block in raster order, the DC
/// differential then the AC token sequence.
pub fn encode_channel(
    dc_diffs: &[i32],
    ac_tokens: &[Vec<AcToken>],
    dc_table: &CodeTable,
    ac_table: &CodeTable,
) -> Result<ScanBits> {
    debug_assert_eq!(dc_diffs.len(), ac_tokens.len());
    let mut bits = ScanBits::default();

    for (diff, tokens) in dc_diffs.iter().zip(ac_tokens.iter()) {
        let mut dc_part = BitString::new();
        encode_dc(*diff, dc_table, &mut dc_part)?;

        let mut ac_part = BitString::new();
        for token in tokens {
            encode_ac(token, ac_table, &mut ac_part)?;
        }

        bits.dc.extend(&dc_part);
        bits.ac.extend(&ac_part);
        bits.scan.extend(&dc_part);
        bits.scan.extend(&ac_part);
    }

    Ok(bits)
}
