//! In-place audio repair before training
//!
//! Normalizes a workspace copy of an uploaded file to what the trainer
//! expects: mono, with a block of true silence at the head. The file is
//! rewritten only when something actually changed. All failures here are
//! logged and swallowed; a file the trainer truly cannot use will produce a
//! clearer error from the trainer itself.

use crate::audio::wav;
use std::path::Path;
use tracing::{info, warn};

/// Sample rate the trainer prefers
pub const DEFAULT_TARGET_RATE: u32 = 48_000;

/// Silence block injected at the head when the file starts hot
pub const DEFAULT_SILENCE_DUR: f64 = 1.0;

/// Portion of the head inspected for existing silence
const HEAD_CHECK_SECONDS: f64 = 0.1;

/// Absolute magnitude below which a sample counts as silent
const SILENCE_TOLERANCE: f32 = 1e-8;

/// Repair an audio file in place with the default parameters
pub fn repair_audio_in_place(path: &Path) {
    repair_audio_with(path, DEFAULT_TARGET_RATE, DEFAULT_SILENCE_DUR)
}

/// Repair an audio file in place
///
/// - Multi-channel input keeps channel 0 only (logged).
/// - A sample rate differing from `target_rate` is warned about but never
///   resampled; resampling would shift timing underneath the latency
///   detector.
/// - When any sample in the first 0.1 s exceeds the silence tolerance, a
///   block of `silence_dur` seconds of exact zeros is prepended.
pub fn repair_audio_with(path: &Path, target_rate: u32, silence_dur: f64) {
    if let Err(e) = try_repair(path, target_rate, silence_dur) {
        warn!(path = %path.display(), error = %e, "Audio repair skipped");
    }
}

fn try_repair(path: &Path, target_rate: u32, silence_dur: f64) -> namtrain_common::Result<()> {
    let audio = wav::read(path)?;
    let rate = audio.sample_rate;
    let mut modified = false;

    let mut data = audio.channel(0);
    if audio.channels > 1 {
        info!(
            path = %path.display(),
            channels = audio.channels,
            "Multi-channel audio, keeping channel 0 only"
        );
        modified = true;
    }

    if rate != target_rate {
        warn!(
            path = %path.display(),
            sample_rate = rate,
            target_rate,
            "Sample rate differs from trainer preference, not resampling"
        );
    }

    let head_samples = ((rate as f64 * HEAD_CHECK_SECONDS) as usize).min(data.len());
    if head_samples > 0 {
        let head_is_silent = data[..head_samples]
            .iter()
            .all(|s| s.abs() <= SILENCE_TOLERANCE);
        if !head_is_silent {
            let silence_samples = (rate as f64 * silence_dur) as usize;
            info!(
                path = %path.display(),
                silence_samples,
                "Head not silent, prepending silence"
            );
            let mut padded = vec![0.0f32; silence_samples];
            padded.extend_from_slice(&data);
            data = padded;
            modified = true;
        }
    } else {
        info!(path = %path.display(), "File too short for head check, skipping");
    }

    if modified {
        wav::write_mono(path, &data, rate)?;
        info!(path = %path.display(), "Repaired and saved");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_stereo(path: &Path, left: &[f32], right: &[f32], rate: u32) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for (l, r) in left.iter().zip(right) {
            writer.write_sample(*l).unwrap();
            writer.write_sample(*r).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_already_silent_head_left_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.wav");
        let rate = 48_000u32;

        // 0.2 s of silence then a tone burst
        let mut samples = vec![0.0f32; (rate / 5) as usize];
        samples.extend((0..rate / 10).map(|i| (i as f32 * 0.01).sin() * 0.5));
        wav::write_mono(&path, &samples, rate).unwrap();

        let before = std::fs::read(&path).unwrap();
        repair_audio_in_place(&path);
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after, "unmodified file must stay byte-identical");
    }

    #[test]
    fn test_hot_head_grows_by_exact_silence_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        let rate = 48_000u32;

        let samples: Vec<f32> = (0..rate).map(|i| ((i as f32) * 0.01).sin() * 0.8).collect();
        wav::write_mono(&path, &samples, rate).unwrap();

        repair_audio_in_place(&path);

        let repaired = wav::read(&path).unwrap();
        let silence_samples = (rate as f64 * DEFAULT_SILENCE_DUR) as usize;
        assert_eq!(repaired.samples.len(), samples.len() + silence_samples);
        assert!(repaired.samples[..silence_samples].iter().all(|&s| s == 0.0));
        assert_eq!(&repaired.samples[silence_samples..], &samples[..]);
    }

    #[test]
    fn test_stereo_reduced_to_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let rate = 48_000u32;

        let frames = (rate / 5) as usize;
        let left = vec![0.0f32; frames];
        let right = vec![0.25f32; frames];
        write_stereo(&path, &left, &right, rate);

        repair_audio_in_place(&path);

        let repaired = wav::read(&path).unwrap();
        assert_eq!(repaired.channels, 1);
        // Left channel was silent, so no padding; content is channel 0
        assert_eq!(repaired.samples.len(), frames);
        assert!(repaired.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_non_target_rate_content_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate44.wav");
        let rate = 44_100u32;

        let mut samples = vec![0.0f32; (rate / 5) as usize];
        samples.push(0.5);
        wav::write_mono(&path, &samples, rate).unwrap();

        repair_audio_in_place(&path);

        // Warned, not resampled: rate and length unchanged
        let repaired = wav::read(&path).unwrap();
        assert_eq!(repaired.sample_rate, rate);
        assert_eq!(repaired.samples.len(), samples.len());
    }

    #[test]
    fn test_unreadable_file_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file").unwrap();

        repair_audio_in_place(&path);

        let after = std::fs::read(&path).unwrap();
        assert_eq!(after, b"not a wav file");
    }

    #[test]
    fn test_missing_file_does_not_panic() {
        repair_audio_in_place(Path::new("/nonexistent/nothing.wav"));
    }
}
