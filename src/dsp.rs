//! Shared DSP primitives: RMS, DC removal, normalized autocorrelation, and test signal generators.

/// Root mean square of an audio buffer.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Copy of the frame with its mean subtracted, widened to f64 for the
/// correlation sums.
pub fn remove_dc(samples: &[f32]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    samples.iter().map(|&s| s as f64 - mean).collect()
}

/// Normalized correlation of `x` with itself shifted by `lag`, over the
/// overlapping region:
///
/// `Σ x[i]·x[i+lag] / sqrt(Σ x[i]² · Σ x[i+lag]²)`
///
/// Returns None when there is no overlap or either side has no energy.
pub fn normalized_autocorrelation(x: &[f64], lag: usize) -> Option<f64> {
    if lag >= x.len() {
        return None;
    }
    let mut num = 0.0;
    let mut e1 = 0.0;
    let mut e2 = 0.0;
    for (a, b) in x.iter().zip(&x[lag..]) {
        num += a * b;
        e1 += a * a;
        e2 += b * b;
    }
    let den = (e1 * e2).sqrt();
    if den <= 1e-12 {
        return None;
    }
    Some(num / den)
}
