// src/encode/dct.rs

//! 8x8 type-II DCT with the conventional 1/4 normalisation, plus the
//! level shift applied before the forward transform.

use std::sync::OnceLock;

/// cos((2x + 1) * u * pi / 16) for x, u in 0..8.
static COS_TABLE: OnceLock<[[f32; 8]; 8]> = OnceLock::new();

fn cos_table() -> &'static [[f32; 8]; 8] {
    COS_TABLE.get_or_init(|| {
        let mut t = [[0f32; 8]; 8];
        for x in 0..8 {
            for u in 0..8 {
                t[x][u] =
                    (((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI) / 16.0).cos() as f32;
            }
        }
        t
    })
}

const INV_SQRT2: f32 = std::f32::consts::FRAC_1_SQRT_2;

fn norm(u: usize) -> f32 {
    if u == 0 {
        INV_SQRT2
    } else {
        1.0
    }
}

/// Subtracts 128 from an 8-bit sample, producing a value in [-128, 127].
#[inline]
pub fn level_shift(sample: u8) -> f32 {
    sample as f32 - 128.0
}

/// Adds 128 back and clamps to the 8-bit sample range.
#[inline]
pub fn level_unshift(value: f32) -> u8 {
    (value + 128.0).round().clamp(0.0, 255.0) as u8
}

/// Forward 8x8 type-II DCT of one level-shifted block (row-major).
pub fn forward_8x8(block: &[f32; 64]) -> [f32; 64] {
    let cos = cos_table();
    let mut out = [0f32; 64];
    for v in 0..8 {
        for u in 0..8 {
            let mut sum = 0f32;
            for y in 0..8 {
                for x in 0..8 {
                    sum += block[y * 8 + x] * cos[x][u] * cos[y][v];
                }
            }
            out[v * 8 + u] = 0.25 * norm(u) * norm(v) * sum;
        }
    }
    out
}

/// Inverse 8x8 DCT, returning level-shifted samples (row-major).
pub fn inverse_8x8(coeffs: &[f32; 64]) -> [f32; 64] {
    let cos = cos_table();
    let mut out = [0f32; 64];
    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0f32;
            for v in 0..8 {
                for u in 0..8 {
                    sum += norm(u) * norm(v) * coeffs[v * 8 + u] * cos[x][u] * cos[y][v];
                }
            }
            out[y * 8 + x] = 0.25 * sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_block_is_pure_dc() {
        // A uniform block of level-shifted value 0 transforms to all zeros;
        // a uniform block of value c has DC = 8c and no AC energy.
        let block = [12.0f32; 64];
        let coeffs = forward_8x8(&block);
        assert!((coeffs[0] - 96.0).abs() < 1e-3);
        for &ac in &coeffs[1..] {
            assert!(ac.abs() < 1e-3);
        }
    }

    #[test]
    fn horizontal_ramp_concentrates_in_first_ac() {
        // A left-to-right ramp puts its energy in coefficient (u=1, v=0):
        // the first horizontal frequency, row-major index 1.
        let mut block = [0f32; 64];
        for y in 0..8 {
            for x in 0..8 {
                block[y * 8 + x] = x as f32;
            }
        }
        let coeffs = forward_8x8(&block);
        let dominant_ac = coeffs[1].abs();
        for (i, &c) in coeffs.iter().enumerate() {
            if i != 0 && i != 1 {
                assert!(
                    c.abs() < dominant_ac,
                    "coefficient {i} ({c}) should be below the ramp frequency ({dominant_ac})"
                );
            }
        }
        assert!(dominant_ac > 1.0);
    }

    #[test]
    fn forward_inverse_roundtrip() {
        let mut block = [0f32; 64];
        for (i, v) in block.iter_mut().enumerate() {
            *v = ((i * 37 + 11) % 256) as f32 - 128.0;
        }
        let coeffs = forward_8x8(&block);
        let back = inverse_8x8(&coeffs);
        for i in 0..64 {
            assert!(
                (block[i] - back[i]).abs() < 1e-2,
                "sample {i}: {} vs {}",
                block[i],
                back[i]
            );
        }
    }

    #[test]
    fn level_shift_bounds() {
        assert_eq!(level_shift(0), -128.0);
        assert_eq!(level_shift(255), 127.0);
        assert_eq!(level_unshift(-128.0), 0);
        assert_eq!(level_unshift(127.0), 255);
        assert_eq!(level_unshift(300.0), 255);
        assert_eq!(level_unshift(-300.0), 0);
    }
}
