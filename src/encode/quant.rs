// src/encode/quant.rs

//! Scalar quantisation of DCT coefficients.
//!
//! The base tables are the recommended luminance/chrominance tables from
//! ITU-T T.81 Annex K, scaled by a quality factor with the IJG formula.

use crate::utils::{MjvError, Result};

/// Recommended luminance quantisation table (T.81 Table K.1), row-major.
pub const BASE_LUMINANCE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Recommended chrominance quantisation table (T.81 Table K.2), row-major.
pub const BASE_CHROMINANCE: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, //
    18, 21, 26, 66, 99, 99, 99, 99, //
    24, 26, 56, 99, 99, 99, 99, 99, //
    47, 66, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// A 64-entry quantisation table in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub values: [u16; 64],
}

impl QuantTable {
    /// Scales a base table by a quality factor in 1..=100 using the IJG
    /// formula, clamping each entry to [1, 255].
    pub fn scaled(base: &[u16; 64], quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(MjvError::InvalidParameter(format!(
                "quality must be in 1..=100, got {quality}"
            )));
        }
        let q = quality as u32;
        let scale = if q < 50 { 5000 / q } else { 200 - 2 * q };
        let mut values = [0u16; 64];
        for (out, &entry) in values.iter_mut().zip(base.iter()) {
            let scaled = (entry as u32 * scale + 50) / 100;
            *out = scaled.clamp(1, 255) as u16;
        }
        Ok(Self { values })
    }

    pub fn luminance(quality: u8) -> Result<Self> {
        Self::scaled(&BASE_LUMINANCE, quality)
    }

    pub fn chrominance(quality: u8) -> Result<Self> {
        Self::scaled(&BASE_CHROMINANCE, quality)
    }
}

/// Quantises one block of DCT coefficients, rounding half away from zero.
pub fn quantise_block(coeffs: &[f32; 64], table: &QuantTable) -> [i32; 64] {
    let mut out = [0i32; 64];
    for i in 0..64 {
        out[i] = (coeffs[i] / table.values[i] as f32).round() as i32;
    }
    out
}

/// Reverses quantisation: multiplies each level by its table entry.
pub fn dequantise_block(levels: &[i32; 64], table: &QuantTable) -> [f32; 64] {
    let mut out = [0f32; 64];
    for i in 0..64 {
        out[i] = (levels[i] * table.values[i] as i32) as f32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_fifty_is_identity() {
        let t = QuantTable::luminance(50).unwrap();
        assert_eq!(t.values, BASE_LUMINANCE);
    }

    #[test]
    fn quality_one_saturates() {
        // S = 5000, every entry (entry*5000+50)/100 >= 255
        let t = QuantTable::luminance(1).unwrap();
        assert!(t.values.iter().all(|&v| v == 255));
        let t = QuantTable::chrominance(1).unwrap();
        assert!(t.values.iter().all(|&v| v == 255));
    }

    #[test]
    fn quality_hundred_floors_at_one() {
        // S = 0, every entry (entry*0+50)/100 = 0, clamped to 1
        let t = QuantTable::luminance(100).unwrap();
        assert!(t.values.iter().all(|&v| v == 1));
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        assert!(QuantTable::luminance(0).is_err());
        assert!(QuantTable::luminance(101).is_err());
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let mut table = QuantTable::luminance(50).unwrap();
        table.values = [2; 64];
        let mut coeffs = [0f32; 64];
        coeffs[0] = 3.0; // 1.5 rounds to 2
        coeffs[1] = -3.0; // -1.5 rounds to -2
        coeffs[2] = 2.0; // 1.0
        let q = quantise_block(&coeffs, &table);
        assert_eq!(q[0], 2);
        assert_eq!(q[1], -2);
        assert_eq!(q[2], 1);
    }

    #[test]
    fn dequantise_scales_back() {
        let mut table = QuantTable::luminance(50).unwrap();
        table.values[0] = 16;
        let mut levels = [0i32; 64];
        levels[0] = -3;
        let d = dequantise_block(&levels, &table);
        assert_eq!(d[0], -48.0);
    }
}
