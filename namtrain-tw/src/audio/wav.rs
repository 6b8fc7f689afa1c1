//! WAV decode/encode helpers
//!
//! All decoding normalizes to 32-bit float samples regardless of the stored
//! subtype, which is what the repair and latency paths operate on.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use namtrain_common::{Error, Result};
use std::path::Path;

/// Decoded audio: interleaved f32 samples plus format
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, `channels` values per frame
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Extract one channel as a contiguous signal
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let step = self.channels.max(1) as usize;
        self.samples.iter().skip(index).step_by(step).copied().collect()
    }
}

/// Static format information without decoding the sample data
#[derive(Debug, Clone)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
    pub num_frames: u32,
}

impl WavInfo {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.num_frames as f64 / self.sample_rate as f64
        }
    }
}

/// Read WAV header information
pub fn inspect(path: &Path) -> Result<WavInfo> {
    let reader = WavReader::open(path)
        .map_err(|e| Error::Audio(format!("Open {} failed: {}", path.display(), e)))?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        sample_format: spec.sample_format,
        num_frames: reader.duration(),
    })
}

/// Read an entire WAV file as interleaved f32 samples
///
/// Integer subtypes are scaled into [-1.0, 1.0] by their bit depth.
pub fn read(path: &Path) -> Result<DecodedAudio> {
    let mut reader = WavReader::open(path)
        .map_err(|e| Error::Audio(format!("Open {} failed: {}", path.display(), e)))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("Decode {} failed: {}", path.display(), e)))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("Decode {} failed: {}", path.display(), e)))?
        }
    };

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Write a mono f32 signal as a 32-bit float WAV file
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| Error::Audio(format!("Create {} failed: {}", path.display(), e)))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| Error::Audio(format!("Write {} failed: {}", path.display(), e)))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Audio(format!("Finalize {} failed: {}", path.display(), e)))?;
    Ok(())
}
