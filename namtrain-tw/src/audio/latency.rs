//! Latency detection via cross-correlation
//!
//! Estimates the time offset between a reference ("input") signal and the
//! captured ("output") signal of a reamp pass. The peak of the full
//! cross-correlation of (output, input) gives the lag; its magnitude,
//! normalized by the signal energies, gives a confidence score.

use namtrain_common::{Error, Result};
use serde::Serialize;

/// Fixed preview window offered to clients for waveform visualization
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentPreview {
    pub segment_start_seconds: f64,
    pub segment_duration_seconds: f64,
}

impl Default for AlignmentPreview {
    fn default() -> Self {
        Self {
            segment_start_seconds: 0.0,
            segment_duration_seconds: 0.25,
        }
    }
}

/// Latency detection result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyReport {
    pub latency_samples: u64,
    pub latency_ms: f64,
    /// Peak correlation normalized to [0, 1]
    pub confidence: f64,
    pub alignment_preview: AlignmentPreview,
}

/// Detect the latency of `output` relative to `input`
///
/// Both signals must be mono and share a sample rate; a rate mismatch is a
/// validation error, never a numeric result. A negative lag (output leading
/// the input) is reported as zero samples.
pub fn detect_latency(
    input: &[f32],
    output: &[f32],
    input_rate: u32,
    output_rate: u32,
) -> Result<LatencyReport> {
    if input_rate != output_rate {
        return Err(Error::InvalidInput(format!(
            "Sample rates differ: input={}, output={}",
            input_rate, output_rate
        )));
    }
    if input_rate == 0 {
        return Err(Error::InvalidInput("Sample rate is zero".to_string()));
    }

    let n = input.len().min(output.len());
    if n == 0 {
        return Err(Error::InvalidInput(
            "Cannot correlate empty signals".to_string(),
        ));
    }

    // Truncate to common length and remove DC offset
    let x = demean(&input[..n]);
    let y = demean(&output[..n]);

    let (peak_index, peak_abs) = correlation_peak(&y, &x);
    let lag = peak_index as i64 - (n as i64 - 1);

    // Output leading the input is clamped to zero; consumers expect a
    // non-negative latency.
    let latency_samples = lag.max(0) as u64;
    let latency_ms = latency_samples as f64 / input_rate as f64 * 1000.0;

    let norm = l2_norm(&x) * l2_norm(&y);
    let norm = if norm > 0.0 { norm } else { 1.0 };
    let confidence = (peak_abs / norm).clamp(0.0, 1.0);

    Ok(LatencyReport {
        latency_samples,
        latency_ms,
        confidence,
        alignment_preview: AlignmentPreview::default(),
    })
}

fn demean(signal: &[f32]) -> Vec<f64> {
    let mean = signal.iter().map(|&s| s as f64).sum::<f64>() / signal.len() as f64;
    signal.iter().map(|&s| s as f64 - mean).collect()
}

fn l2_norm(signal: &[f64]) -> f64 {
    signal.iter().map(|s| s * s).sum::<f64>().sqrt()
}

/// Index and magnitude of the absolute peak of the full cross-correlation
/// of (a, b), both length n, yielding 2n-1 lags
fn correlation_peak(a: &[f64], b: &[f64]) -> (usize, f64) {
    let n = a.len();
    let mut peak_index = 0usize;
    let mut peak_abs = f64::NEG_INFINITY;

    for k in 0..(2 * n - 1) {
        let lag = k as i64 - (n as i64 - 1);
        let (start, end) = if lag >= 0 {
            (lag as usize, n)
        } else {
            (0, (n as i64 + lag) as usize)
        };

        let mut acc = 0.0f64;
        for j in start..end {
            acc += a[j] * b[(j as i64 - lag) as usize];
        }

        if acc.abs() > peak_abs {
            peak_abs = acc.abs();
            peak_index = k;
        }
    }

    (peak_index, peak_abs)
}
