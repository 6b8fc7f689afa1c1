//! Audio processing: WAV I/O, in-place repair, latency detection

pub mod latency;
pub mod repair;
pub mod wav;

pub use latency::{detect_latency, AlignmentPreview, LatencyReport};
pub use repair::repair_audio_in_place;
pub use wav::{DecodedAudio, WavInfo};
