// src/image/subsample.rs

//! Chroma subsampling between packed frames and per-channel planes.
//!
//! Downsampling block-averages each chroma window; upsampling is
//! nearest-neighbour. Decoder compatibility only requires that the sampling
//! factors declared in the frame header match the plane dimensions.

use std::fmt;
use std::str::FromStr;

use super::frame::{Plane, PlanarFrame, YCbCrFrame};
use crate::utils::{MjvError, Result};

/// Chroma sampling structure, named per the J:a:b convention.
///
/// `ratios()` gives the divisor the chroma planes apply to the luma
/// dimensions; the luma sampling factors declared in SOF0 are the same pair
/// (T.81 A.1.1) with chroma fixed at 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaMode {
    /// No subsampling.
    F444,
    /// Chroma halved vertically.
    F440,
    /// Chroma halved horizontally.
    F422,
    /// Chroma halved both ways.
    #[default]
    F420,
    /// Chroma quartered horizontally.
    F411,
    /// Chroma quartered horizontally, halved vertically.
    F410,
}

impl ChromaMode {
    /// (horizontal, vertical) luma-to-chroma ratio.
    pub fn ratios(self) -> (usize, usize) {
        match self {
            ChromaMode::F444 => (1, 1),
            ChromaMode::F440 => (1, 2),
            ChromaMode::F422 => (2, 1),
            ChromaMode::F420 => (2, 2),
            ChromaMode::F411 => (4, 1),
            ChromaMode::F410 => (4, 2),
        }
    }

    /// Sampling factors (H, V) for the luma component in SOF0. Chroma
    /// components always declare 1x1.
    pub fn luma_sampling_factors(self) -> (u8, u8) {
        let (h, v) = self.ratios();
        (h as u8, v as u8)
    }

    /// Dimensions of a chroma plane for a `width x height` luma extent,
    /// before block padding.
    pub fn chroma_dims(self, width: usize, height: usize) -> (usize, usize) {
        let (hr, vr) = self.ratios();
        (width.div_ceil(hr), height.div_ceil(vr))
    }
}

impl fmt::Display for ChromaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChromaMode::F444 => "4:4:4",
            ChromaMode::F440 => "4:4:0",
            ChromaMode::F422 => "4:2:2",
            ChromaMode::F420 => "4:2:0",
            ChromaMode::F411 => "4:1:1",
            ChromaMode::F410 => "4:1:0",
        };
        f.write_str(s)
    }
}

impl FromStr for ChromaMode {
    type Err = MjvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "4:4:4" | "444" => Ok(ChromaMode::F444),
            "4:4:0" | "440" => Ok(ChromaMode::F440),
            "4:2:2" | "422" => Ok(ChromaMode::F422),
            "4:2:0" | "420" => Ok(ChromaMode::F420),
            "4:1:1" | "411" => Ok(ChromaMode::F411),
            "4:1:0" | "410" => Ok(ChromaMode::F410),
            other => Err(MjvError::InvalidParameter(format!(
                "unknown chroma sampling mode {other:?}"
            ))),
        }
    }
}

/// Splits a packed frame into padded per-channel planes under `mode`.
pub fn to_planar(frame: &YCbCrFrame, mode: ChromaMode) -> Result<PlanarFrame> {
    let width = frame.width();
    let height = frame.height();
    let (hr, vr) = mode.ratios();
    let (cw, ch) = mode.chroma_dims(width, height);

    let mut y_samples = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            y_samples.push(frame.pixel(x, y).0);
        }
    }

    let mut cb_samples = Vec::with_capacity(cw * ch);
    let mut cr_samples = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        for cx in 0..cw {
            // Average the chroma window, clamped at the frame edge.
            let x0 = cx * hr;
            let y0 = cy * vr;
            let x1 = (x0 + hr).min(width);
            let y1 = (y0 + vr).min(height);
            let mut cb_sum = 0u32;
            let mut cr_sum = 0u32;
            let n = ((x1 - x0) * (y1 - y0)) as u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let (_, cb, cr) = frame.pixel(x, y);
                    cb_sum += cb as u32;
                    cr_sum += cr as u32;
                }
            }
            cb_samples.push(((cb_sum + n / 2) / n) as u8);
            cr_samples.push(((cr_sum + n / 2) / n) as u8);
        }
    }

    Ok(PlanarFrame {
        y: Plane::from_samples(width, height, &y_samples)?,
        cb: Plane::from_samples(cw, ch, &cb_samples)?,
        cr: Plane::from_samples(cw, ch, &cr_samples)?,
        mode,
        display_width: width,
        display_height: height,
    })
}

/// Reassembles a packed frame from planes, upsampling chroma by
/// nearest-neighbour and trimming the block padding.
pub fn to_packed(frame: &PlanarFrame) -> Result<YCbCrFrame> {
    let width = frame.display_width;
    let height = frame.display_height;
    let (hr, vr) = frame.mode.ratios();

    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.push(frame.y.get(x, y));
            data.push(frame.cb.get(x / hr, y / vr));
            data.push(frame.cr.get(x / hr, y / vr));
        }
    }
    YCbCrFrame::from_packed(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(w: usize, h: usize) -> YCbCrFrame {
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / w.max(1)) as u8);
                data.push((y * 255 / h.max(1)) as u8);
                data.push(128);
            }
        }
        YCbCrFrame::from_packed(w, h, data).unwrap()
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("4:2:0".parse::<ChromaMode>().unwrap(), ChromaMode::F420);
        assert_eq!("444".parse::<ChromaMode>().unwrap(), ChromaMode::F444);
        assert!("4:3:2".parse::<ChromaMode>().is_err());
    }

    #[test]
    fn plane_dims_are_block_multiples() {
        let frame = gradient_frame(20, 18);
        for mode in [
            ChromaMode::F444,
            ChromaMode::F440,
            ChromaMode::F422,
            ChromaMode::F420,
            ChromaMode::F411,
            ChromaMode::F410,
        ] {
            let planar = to_planar(&frame, mode).unwrap();
            assert_eq!(planar.y.width() % 8, 0);
            assert_eq!(planar.y.height() % 8, 0);
            assert_eq!(planar.cb.width() % 8, 0);
            assert_eq!(planar.cb.height() % 8, 0);
            assert_eq!(planar.cb.width(), planar.cr.width());
        }
    }

    #[test]
    fn chroma_dims_follow_ratios() {
        let (cw, ch) = ChromaMode::F420.chroma_dims(20, 18);
        assert_eq!((cw, ch), (10, 9));
        let (cw, ch) = ChromaMode::F411.chroma_dims(17, 8);
        assert_eq!((cw, ch), (5, 8));
    }

    #[test]
    fn uniform_chroma_survives_roundtrip() {
        let frame = YCbCrFrame::from_packed(16, 16, {
            let mut d = Vec::new();
            for _ in 0..256 {
                d.extend_from_slice(&[90, 100, 200]);
            }
            d
        })
        .unwrap();
        let planar = to_planar(&frame, ChromaMode::F420).unwrap();
        let packed = to_packed(&planar).unwrap();
        assert_eq!(packed, frame);
    }

    #[test]
    fn full_resolution_mode_is_lossless() {
        let frame = gradient_frame(16, 8);
        let planar = to_planar(&frame, ChromaMode::F444).unwrap();
        let packed = to_packed(&planar).unwrap();
        assert_eq!(packed, frame);
    }
}
