use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::enums::BufferAccess;
use super::format::Format;

/// Result returned when a capture session completes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub metadata_path: PathBuf,
    pub bytes_written: u64,
    pub frames: u64,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata stored alongside a raw PCM recording.
///
/// The PCM file has no header, so this sidecar is the only record of how
/// to interpret its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub sample_rate: u32,
    pub sample_type: String,
    pub sample_size: usize,
    pub channels: usize,
    pub channel_mask: u64,
    /// True when frames are interleaved; otherwise each buffer is stored as
    /// one contiguous block per channel.
    pub interleaved: bool,
    pub access: BufferAccess,
    pub bytes: u64,
    pub frames: u64,
    pub duration_secs: f64,
    pub xruns: u64,
    pub checksum: String,
}

impl RecordingMetadata {
    /// Metadata for a capture of the input side of `format`.
    pub fn for_capture(
        format: &Format,
        interleaved: bool,
        access: BufferAccess,
        file_path: &str,
        bytes: u64,
        xruns: u64,
        checksum: &str,
    ) -> Self {
        let frame_bytes = format.frame_bytes(super::format::Direction::Input) as u64;
        let frames = if frame_bytes == 0 { 0 } else { bytes / frame_bytes };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            sample_rate: format.mix.rate,
            sample_type: format.mix.sample.to_string(),
            sample_size: format.sample_size(),
            channels: format.channels.inputs,
            channel_mask: format.channels.in_mask,
            interleaved,
            access,
            bytes,
            frames,
            duration_secs: frames as f64 / format.mix.rate as f64,
            xruns,
            checksum: checksum.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::{Channels, Mix};
    use crate::models::sample::SampleType;

    #[test]
    fn frames_derive_from_bytes() {
        let format = Format::new(Mix::new(44100, SampleType::Int24), Channels::new(2, 0, 0, 0));
        let meta = RecordingMetadata::for_capture(&format, true, BufferAccess::Raw, "a.pcm", 44100 * 6, 0, "ab");
        assert_eq!(meta.frames, 44100);
        assert_eq!(meta.sample_size, 3);
        assert!((meta.duration_secs - 1.0).abs() < 1e-9);
        assert!(uuid::Uuid::parse_str(&meta.id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.created_at).is_ok());
    }
}
