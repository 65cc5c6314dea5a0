// src/image/frame.rs

//! Owned raster types for the encoder core.
//!
//! A [`YCbCrFrame`] is the packed interchange format at the input boundary:
//! one byte per channel per pixel, all three channels at luma resolution.
//! The codec itself works on a [`PlanarFrame`]: three independent
//! [`Plane`]s whose dimensions are already padded to multiples of 8 so that
//! the 8x8 block transform never sees a partial block.

use ::image::RgbImage;
use bytemuck;
use std::sync::OnceLock;

use crate::utils::{MjvError, Result};

// Fixed-point constants for YCbCr conversion (Rec.601)
const YCC_SHIFT: u32 = 16;
const YCC_HALF: i32 = 1 << (YCC_SHIFT - 1);

// Pre-computed per-channel contribution tables (computed once)
static YCC_TABLES: OnceLock<([[i32; 256]; 3], [[i32; 256]; 3], [[i32; 256]; 3])> = OnceLock::new();

fn ycc_tables() -> &'static ([[i32; 256]; 3], [[i32; 256]; 3], [[i32; 256]; 3]) {
    YCC_TABLES.get_or_init(|| {
        let mut y_table = [[0i32; 256]; 3];
        let mut cb_table = [[0i32; 256]; 3];
        let mut cr_table = [[0i32; 256]; 3];

        for i in 0..256 {
            let v = i as i32;

            y_table[0][i] = 19595 * v; // 0.299 * 65536
            y_table[1][i] = 38470 * v; // 0.587 * 65536
            y_table[2][i] = 7471 * v; // 0.114 * 65536

            cb_table[0][i] = -11059 * v; // -0.168736 * 65536
            cb_table[1][i] = -21709 * v; // -0.331264 * 65536
            cb_table[2][i] = 32768 * v; //  0.500000 * 65536

            cr_table[0][i] = 32768 * v; //  0.500000 * 65536
            cr_table[1][i] = -27439 * v; // -0.418688 * 65536
            cr_table[2][i] = -5329 * v; // -0.081312 * 65536
        }

        (y_table, cb_table, cr_table)
    })
}

/// A packed 8-bit YCbCr image: `width * height * 3` bytes, channel order
/// Y, Cb, Cr per pixel, all channels at luma resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YCbCrFrame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl YCbCrFrame {
    /// Wraps packed pixel data. The buffer must hold exactly
    /// `width * height * 3` bytes.
    pub fn from_packed(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MjvError::Geometry(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if data.len() != width * height * 3 {
            return Err(MjvError::InvalidInput(format!(
                "packed YCbCr frame needs 3 channels ({} bytes for {width}x{height}), got {}",
                width * height * 3,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a frame from an RGB image using fixed-point Rec.601 conversion.
    pub fn from_rgb(img: &RgbImage) -> Result<Self> {
        let (y_table, cb_table, cr_table) = ycc_tables();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let pixels: &[[u8; 3]] = bytemuck::cast_slice(img.as_raw());

        let mut data = Vec::with_capacity(width * height * 3);
        for &[r, g, b] in pixels {
            let (r, g, b) = (r as usize, g as usize, b as usize);
            let y = (y_table[0][r] + y_table[1][g] + y_table[2][b] + YCC_HALF) >> YCC_SHIFT;
            let cb =
                128 + ((cb_table[0][r] + cb_table[1][g] + cb_table[2][b] + YCC_HALF) >> YCC_SHIFT);
            let cr =
                128 + ((cr_table[0][r] + cr_table[1][g] + cr_table[2][b] + YCC_HALF) >> YCC_SHIFT);
            data.push(y.clamp(0, 255) as u8);
            data.push(cb.clamp(0, 255) as u8);
            data.push(cr.clamp(0, 255) as u8);
        }

        Self::from_packed(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The (Y, Cb, Cr) triple at pixel (x, y).
    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let i = (y * self.width + x) * 3;
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// An 8-bit sample plane padded to multiples of 8 in both dimensions.
///
/// `width`/`height` are the stored, padded dimensions; the true image extent
/// is tracked by the owning [`PlanarFrame`]. Padding replicates the last
/// row/column so the block transform sees smooth edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

fn round_up8(v: usize) -> usize {
    (v + 7) & !7
}

impl Plane {
    /// Creates a plane filled with `fill`, padded to multiples of 8.
    pub fn filled(width: usize, height: usize, fill: u8) -> Self {
        let pw = round_up8(width);
        let ph = round_up8(height);
        Self {
            width: pw,
            height: ph,
            data: vec![fill; pw * ph],
        }
    }

    /// Builds a padded plane from unpadded samples by edge replication.
    pub fn from_samples(width: usize, height: usize, samples: &[u8]) -> Result<Self> {
        if samples.len() != width * height {
            return Err(MjvError::InvalidInput(format!(
                "plane buffer holds {} samples, expected {}",
                samples.len(),
                width * height
            )));
        }
        let pw = round_up8(width);
        let ph = round_up8(height);
        let mut data = vec![0u8; pw * ph];
        for py in 0..ph {
            let sy = py.min(height - 1);
            for px in 0..pw {
                let sx = px.min(width - 1);
                data[py * pw + px] = samples[sy * width + sx];
            }
        }
        Ok(Self {
            width: pw,
            height: ph,
            data,
        })
    }

    /// Padded width (a multiple of 8).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Padded height (a multiple of 8).
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Copies the top-left `width x height` region out of the padded plane.
    pub fn crop(&self, width: usize, height: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(width * height);
        for y in 0..height {
            out.extend_from_slice(&self.row(y)[..width]);
        }
        out
    }

    /// Number of 8x8 blocks horizontally.
    pub fn blocks_wide(&self) -> usize {
        self.width / 8
    }

    /// Number of 8x8 blocks vertically.
    pub fn blocks_tall(&self) -> usize {
        self.height / 8
    }
}

/// A signed sample plane, used for prediction residuals in [-255, 255].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPlane {
    width: usize,
    height: usize,
    data: Vec<i16>,
}

impl SignedPlane {
    pub fn zeroed(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0i16; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, v: i16) {
        self.data[y * self.width + x] = v;
    }

    pub fn as_raw(&self) -> &[i16] {
        &self.data
    }
}

/// Three sample planes plus the geometry they were subsampled under.
///
/// The Y plane is padded luma resolution; Cb/Cr are padded chroma resolution
/// per the frame's [`ChromaMode`](crate::image::ChromaMode).
/// `display_width`/`display_height` remember the true luma extent for header
/// emission and output trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    pub y: Plane,
    pub cb: Plane,
    pub cr: Plane,
    pub mode: crate::image::ChromaMode,
    pub display_width: usize,
    pub display_height: usize,
}

impl PlanarFrame {
    /// The three planes in scan order Y, Cb, Cr.
    pub fn planes(&self) -> [&Plane; 3] {
        [&self.y, &self.cb, &self.cr]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_rejects_short_buffer() {
        let err = YCbCrFrame::from_packed(4, 4, vec![0u8; 4 * 4 * 2]);
        assert!(matches!(err, Err(MjvError::InvalidInput(_))));
    }

    #[test]
    fn rgb_grey_maps_to_neutral_chroma() {
        let img = RgbImage::from_pixel(2, 2, image::Rgb([128, 128, 128]));
        let frame = YCbCrFrame::from_rgb(&img).unwrap();
        let (y, cb, cr) = frame.pixel(0, 0);
        assert_eq!(y, 128);
        assert_eq!(cb, 128);
        assert_eq!(cr, 128);
    }

    #[test]
    fn rgb_primaries_follow_rec601() {
        let img = RgbImage::from_pixel(1, 1, image::Rgb([255, 0, 0]));
        let frame = YCbCrFrame::from_rgb(&img).unwrap();
        let (y, _, cr) = frame.pixel(0, 0);
        assert_eq!(y, 76); // 0.299 * 255
        assert_eq!(cr, 255); // red saturates Cr
    }

    #[test]
    fn plane_pads_by_edge_replication() {
        // 3x2 samples pad to 8x8
        let samples = [1u8, 2, 3, 4, 5, 6];
        let p = Plane::from_samples(3, 2, &samples).unwrap();
        assert_eq!(p.width(), 8);
        assert_eq!(p.height(), 8);
        assert_eq!(p.get(0, 0), 1);
        assert_eq!(p.get(2, 0), 3);
        assert_eq!(p.get(7, 0), 3); // right edge replicated
        assert_eq!(p.get(0, 7), 4); // bottom edge replicated
        assert_eq!(p.get(7, 7), 6); // corner replicated
    }

    #[test]
    fn crop_undoes_padding() {
        let samples: Vec<u8> = (0..12).collect();
        let p = Plane::from_samples(4, 3, &samples).unwrap();
        assert_eq!(p.crop(4, 3), samples);
    }
}
