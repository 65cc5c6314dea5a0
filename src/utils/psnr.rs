// src/utils/psnr.rs

//! Peak signal-to-noise ratio between two 8-bit sample planes.

/// Computes the PSNR in decibels between two equally sized sample slices.
///
/// Returns `f64::INFINITY` for identical inputs.
pub fn psnr(reference: &[u8], distorted: &[u8]) -> f64 {
    assert_eq!(reference.len(), distorted.len());
    if reference.is_empty() {
        return f64::INFINITY;
    }

    let sse: u64 = reference
        .iter()
        .zip(distorted.iter())
        .map(|(&a, &b)| {
            let d = a as i64 - b as i64;
            (d * d) as u64
        })
        .sum();

    if sse == 0 {
        return f64::INFINITY;
    }

    let mse = sse as f64 / reference.len() as f64;
    10.0 * (255.0f64 * 255.0 / mse).log10()
}
