// src/encode/motion.rs

//! Block-matching motion estimation and motion-compensated reconstruction.
//!
//! Vectors are found on the luma plane, one per macroblock, by full search
//! or diamond search under a SAD or MAD distortion metric. The residual is
//! then assembled for all three channels at their subsampled resolutions,
//! with the luma vector scaled by the chroma ratio (truncating toward zero).

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::image::{Plane, PlanarFrame, SignedPlane};
use crate::utils::{MjvError, Result};

/// Block-matching search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchAlgorithm {
    /// Exhaustive search over the full +/-S window.
    #[default]
    FullSearch,
    /// Iterative large/small diamond pattern search.
    DiamondSearch,
}

impl FromStr for SearchAlgorithm {
    type Err = MjvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FSA" => Ok(SearchAlgorithm::FullSearch),
            "DSA" => Ok(SearchAlgorithm::DiamondSearch),
            other => Err(MjvError::InvalidParameter(format!(
                "unknown block-matching algorithm {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchAlgorithm::FullSearch => f.write_str("FSA"),
            SearchAlgorithm::DiamondSearch => f.write_str("DSA"),
        }
    }
}

/// Block distortion measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionMetric {
    /// Sum of absolute differences.
    #[default]
    Sad,
    /// Mean absolute difference.
    Mad,
}

impl FromStr for DistortionMetric {
    type Err = MjvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAD" => Ok(DistortionMetric::Sad),
            "MAD" => Ok(DistortionMetric::Mad),
            other => Err(MjvError::InvalidParameter(format!(
                "unknown distortion metric {other:?}"
            ))),
        }
    }
}

impl DistortionMetric {
    fn cost(self, sad: u64, area: u64) -> f64 {
        match self {
            DistortionMetric::Sad => sad as f64,
            DistortionMetric::Mad => sad as f64 / area as f64,
        }
    }
}

/// Parameters of the block matcher.
#[derive(Debug, Clone, Copy)]
pub struct MotionParams {
    /// Macroblock edge length in luma pixels.
    pub block_size: usize,
    /// Maximum vector component magnitude in luma pixels.
    pub search_distance: i32,
    pub algorithm: SearchAlgorithm,
    pub metric: DistortionMetric,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            block_size: 16,
            search_distance: 8,
            algorithm: SearchAlgorithm::default(),
            metric: DistortionMetric::default(),
        }
    }
}

/// An integer displacement in luma pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    pub dx: i32,
    pub dy: i32,
}

impl MotionVector {
    fn l1_norm(self) -> i32 {
        self.dx.abs() + self.dy.abs()
    }

    /// Scales the vector by a chroma ratio, truncating toward zero.
    fn scaled(self, h_ratio: usize, v_ratio: usize) -> MotionVector {
        MotionVector {
            dx: self.dx / h_ratio as i32,
            dy: self.dy / v_ratio as i32,
        }
    }
}

/// One motion vector per macroblock, indexed in raster order.
#[derive(Debug, Clone)]
pub struct MotionField {
    pub blocks_x: usize,
    pub blocks_y: usize,
    vectors: Vec<MotionVector>,
}

impl MotionField {
    pub fn get(&self, bx: usize, by: usize) -> MotionVector {
        self.vectors[by * self.blocks_x + bx]
    }

    pub fn vectors(&self) -> &[MotionVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// All dx components then all dy components, raster order. Used to
    /// gather training symbols for the motion-vector Huffman table.
    pub fn components_raster(&self) -> Vec<i32> {
        let mut out = Vec::with_capacity(self.vectors.len() * 2);
        out.extend(self.vectors.iter().map(|v| v.dx));
        out.extend(self.vectors.iter().map(|v| v.dy));
        out
    }

    /// All dx components then all dy components, column-major block order.
    /// This is the order the motion-vector segment is emitted in.
    pub fn components_column_major(&self) -> Vec<i32> {
        let mut out = Vec::with_capacity(self.vectors.len() * 2);
        for bx in 0..self.blocks_x {
            for by in 0..self.blocks_y {
                out.push(self.get(bx, by).dx);
            }
        }
        for bx in 0..self.blocks_x {
            for by in 0..self.blocks_y {
                out.push(self.get(bx, by).dy);
            }
        }
        out
    }
}

/// The three-channel prediction residual of a P frame, in [-255, 255].
#[derive(Debug, Clone)]
pub struct Residual {
    pub y: SignedPlane,
    pub cb: SignedPlane,
    pub cr: SignedPlane,
}

impl Residual {
    pub fn planes(&self) -> [&SignedPlane; 3] {
        [&self.y, &self.cb, &self.cr]
    }
}

fn check_same_geometry(current: &PlanarFrame, reference: &PlanarFrame) -> Result<()> {
    if current.mode != reference.mode
        || current.y.width() != reference.y.width()
        || current.y.height() != reference.y.height()
    {
        return Err(MjvError::Geometry(format!(
            "current frame {}x{} ({}) does not match reference {}x{} ({})",
            current.y.width(),
            current.y.height(),
            current.mode,
            reference.y.width(),
            reference.y.height(),
            reference.mode
        )));
    }
    Ok(())
}

/// SAD between the `bw x bh` block of `current` at (x0, y0) and the block of
/// `reference` displaced by (dx, dy).
fn block_sad(
    current: &Plane,
    reference: &Plane,
    x0: usize,
    y0: usize,
    bw: usize,
    bh: usize,
    dx: i32,
    dy: i32,
) -> u64 {
    let mut sad = 0u64;
    for y in 0..bh {
        let cy = y0 + y;
        let ry = (cy as i32 + dy) as usize;
        for x in 0..bw {
            let cx = x0 + x;
            let rx = (cx as i32 + dx) as usize;
            let d = current.get(cx, cy) as i64 - reference.get(rx, ry) as i64;
            sad += d.unsigned_abs();
        }
    }
    sad
}

/// True when the displaced block stays inside the reference plane.
fn candidate_in_bounds(
    plane: &Plane,
    x0: usize,
    y0: usize,
    bw: usize,
    bh: usize,
    dx: i32,
    dy: i32,
) -> bool {
    let left = x0 as i32 + dx;
    let top = y0 as i32 + dy;
    left >= 0
        && top >= 0
        && (left + bw as i32) <= plane.width() as i32
        && (top + bh as i32) <= plane.height() as i32
}

/// Candidate preference: lowest cost, then smallest L1 magnitude, then
/// smaller dx, then smaller dy.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    cost: f64,
    mv: MotionVector,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.cost != other.cost {
            return self.cost < other.cost;
        }
        let key = (self.mv.l1_norm(), self.mv.dx, self.mv.dy);
        let other_key = (other.mv.l1_norm(), other.mv.dx, other.mv.dy);
        key < other_key
    }
}

struct BlockMatcher<'a> {
    current: &'a Plane,
    reference: &'a Plane,
    params: MotionParams,
}

impl BlockMatcher<'_> {
    fn evaluate(
        &self,
        x0: usize,
        y0: usize,
        bw: usize,
        bh: usize,
        dx: i32,
        dy: i32,
    ) -> Option<Candidate> {
        if !candidate_in_bounds(self.reference, x0, y0, bw, bh, dx, dy) {
            return None;
        }
        let sad = block_sad(self.current, self.reference, x0, y0, bw, bh, dx, dy);
        Some(Candidate {
            cost: self.params.metric.cost(sad, (bw * bh) as u64),
            mv: MotionVector { dx, dy },
        })
    }

    fn full_search(&self, x0: usize, y0: usize, bw: usize, bh: usize) -> MotionVector {
        let s = self.params.search_distance;
        // The zero vector is always in bounds for a block of the frame.
        let mut best = self
            .evaluate(x0, y0, bw, bh, 0, 0)
            .expect("zero displacement is in bounds");
        for dy in -s..=s {
            for dx in -s..=s {
                if let Some(candidate) = self.evaluate(x0, y0, bw, bh, dx, dy) {
                    if candidate.beats(&best) {
                        best = candidate;
                    }
                }
            }
        }
        best.mv
    }

    fn diamond_search(&self, x0: usize, y0: usize, bw: usize, bh: usize) -> MotionVector {
        const LARGE: [(i32, i32); 9] = [
            (0, 0),
            (0, -2),
            (0, 2),
            (-2, 0),
            (2, 0),
            (-1, -1),
            (-1, 1),
            (1, -1),
            (1, 1),
        ];
        const SMALL: [(i32, i32); 5] = [(0, 0), (0, -1), (0, 1), (-1, 0), (1, 0)];

        let s = self.params.search_distance;
        let mut center = self
            .evaluate(x0, y0, bw, bh, 0, 0)
            .expect("zero displacement is in bounds");

        // Large diamond until the centre wins, then one small-diamond pass.
        // Each move strictly improves the preference key, so this terminates.
        loop {
            let mut best = center;
            for (ox, oy) in LARGE {
                let dx = center.mv.dx + ox;
                let dy = center.mv.dy + oy;
                if dx.abs() > s || dy.abs() > s {
                    continue;
                }
                if let Some(candidate) = self.evaluate(x0, y0, bw, bh, dx, dy) {
                    if candidate.beats(&best) {
                        best = candidate;
                    }
                }
            }
            if best.mv == center.mv {
                break;
            }
            center = best;
        }

        let mut best = center;
        for (ox, oy) in SMALL {
            let dx = center.mv.dx + ox;
            let dy = center.mv.dy + oy;
            if dx.abs() > s || dy.abs() > s {
                continue;
            }
            if let Some(candidate) = self.evaluate(x0, y0, bw, bh, dx, dy) {
                if candidate.beats(&best) {
                    best = candidate;
                }
            }
        }
        best.mv
    }

    fn search(&self, x0: usize, y0: usize, bw: usize, bh: usize) -> MotionVector {
        match self.params.algorithm {
            SearchAlgorithm::FullSearch => self.full_search(x0, y0, bw, bh),
            SearchAlgorithm::DiamondSearch => self.diamond_search(x0, y0, bw, bh),
        }
    }
}

/// Finds the motion field of `current` against `reference` and assembles the
/// three-channel prediction residual.
pub fn estimate(
    current: &PlanarFrame,
    reference: &PlanarFrame,
    params: &MotionParams,
) -> Result<(MotionField, Residual)> {
    check_same_geometry(current, reference)?;

    let luma = &current.y;
    let b = params.block_size;
    if b < 8 || b % 8 != 0 {
        return Err(MjvError::InvalidParameter(format!(
            "macroblock size must be a multiple of 8 and at least 8, got {b}"
        )));
    }

    let blocks_x = luma.width().div_ceil(b);
    let blocks_y = luma.height().div_ceil(b);
    let matcher = BlockMatcher {
        current: luma,
        reference: &reference.y,
        params: *params,
    };

    let mut vectors = Vec::with_capacity(blocks_x * blocks_y);
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let x0 = bx * b;
            let y0 = by * b;
            let bw = b.min(luma.width() - x0);
            let bh = b.min(luma.height() - y0);
            vectors.push(matcher.search(x0, y0, bw, bh));
        }
    }

    let field = MotionField {
        blocks_x,
        blocks_y,
        vectors,
    };

    trace!(
        blocks_x = blocks_x,
        blocks_y = blocks_y,
        algorithm = %params.algorithm,
        "estimated motion field"
    );

    let predicted = compensate(reference, &field, params)?;
    let residual = Residual {
        y: plane_difference(&current.y, &predicted.y),
        cb: plane_difference(&current.cb, &predicted.cb),
        cr: plane_difference(&current.cr, &predicted.cr),
    };

    Ok((field, residual))
}

fn plane_difference(current: &Plane, predicted: &Plane) -> SignedPlane {
    let mut out = SignedPlane::zeroed(current.width(), current.height());
    for y in 0..current.height() {
        for x in 0..current.width() {
            out.set(x, y, current.get(x, y) as i16 - predicted.get(x, y) as i16);
        }
    }
    out
}

/// Builds the motion-compensated prediction of a frame from a reference and
/// a motion field.
///
/// Chroma planes use the luma vector scaled by the chroma ratio (truncated
/// toward zero) and the macroblock size scaled the same way. Source
/// coordinates clamp at the plane border.
pub fn compensate(
    reference: &PlanarFrame,
    field: &MotionField,
    params: &MotionParams,
) -> Result<PlanarFrame> {
    let (hr, vr) = reference.mode.ratios();
    let y = compensate_plane(&reference.y, field, params.block_size, params.block_size, 1, 1);
    let cb = compensate_plane(
        &reference.cb,
        field,
        params.block_size / hr,
        params.block_size / vr,
        hr,
        vr,
    );
    let cr = compensate_plane(
        &reference.cr,
        field,
        params.block_size / hr,
        params.block_size / vr,
        hr,
        vr,
    );
    Ok(PlanarFrame {
        y,
        cb,
        cr,
        mode: reference.mode,
        display_width: reference.display_width,
        display_height: reference.display_height,
    })
}

fn compensate_plane(
    reference: &Plane,
    field: &MotionField,
    block_w: usize,
    block_h: usize,
    h_ratio: usize,
    v_ratio: usize,
) -> Plane {
    let w = reference.width();
    let h = reference.height();
    let mut out = Plane::filled(w, h, 0);

    for by in 0..field.blocks_y {
        for bx in 0..field.blocks_x {
            let mv = field.get(bx, by).scaled(h_ratio, v_ratio);
            let x0 = bx * block_w;
            let y0 = by * block_h;
            // The last block row/column stretches to the plane edge so the
            // padded region is covered too.
            let x1 = if bx + 1 == field.blocks_x { w } else { (x0 + block_w).min(w) };
            let y1 = if by + 1 == field.blocks_y { h } else { (y0 + block_h).min(h) };
            for y in y0..y1 {
                let sy = (y as i32 + mv.dy).clamp(0, h as i32 - 1) as usize;
                for x in x0..x1 {
                    let sx = (x as i32 + mv.dx).clamp(0, w as i32 - 1) as usize;
                    out.set(x, y, reference.get(sx, sy));
                }
            }
        }
    }
    out
}

/// Rebuilds a frame by adding a (decoded) residual onto the
/// motion-compensated reference, clamping to the 8-bit sample range.
pub fn reconstruct(
    reference: &PlanarFrame,
    field: &MotionField,
    residual: &Residual,
    params: &MotionParams,
) -> Result<PlanarFrame> {
    let predicted = compensate(reference, field, params)?;
    let mut out = predicted.clone();
    for (plane, res) in [
        (&mut out.y, &residual.y),
        (&mut out.cb, &residual.cb),
        (&mut out.cr, &residual.cr),
    ] {
        if plane.width() != res.width() || plane.height() != res.height() {
            return Err(MjvError::Geometry(format!(
                "residual plane {}x{} does not match prediction {}x{}",
                res.width(),
                res.height(),
                plane.width(),
                plane.height()
            )));
        }
        for y in 0..plane.height() {
            for x in 0..plane.width() {
                let v = plane.get(x, y) as i32 + res.get(x, y) as i32;
                plane.set(x, y, v.clamp(0, 255) as u8);
            }
        }
    }
    Ok(out)
}
