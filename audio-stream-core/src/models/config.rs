use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::enums::BufferAccess;
use super::error::AudioError;
use super::format::{Channels, Format, Mix};
use super::sample::SampleType;

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Stream format. Only the input side is persisted.
    pub format: Format,

    /// Requested buffer size in milliseconds (None = device default).
    pub buffer_size_ms: Option<f64>,

    /// Ask the device for interleaved buffers (default: true).
    pub interleaved: bool,

    /// Raw driver memory or a registered safe buffer.
    pub access: BufferAccess,

    /// Directory where recording files are written.
    pub output_directory: PathBuf,

    /// File name prefix; the session appends a unique suffix.
    pub file_prefix: String,

    /// Maximum recording duration in seconds (None = unlimited).
    pub max_duration_secs: Option<f64>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), AudioError> {
        self.format.validate()?;
        if self.format.channels.inputs == 0 {
            return Err(AudioError::ConfigurationFailed(
                "capture requires at least one input channel".into(),
            ));
        }
        if let Some(ms) = self.buffer_size_ms {
            if !(ms.is_finite() && ms > 0.0) {
                return Err(AudioError::ConfigurationFailed(format!("invalid buffer size: {ms} ms")));
            }
        }
        if let Some(secs) = self.max_duration_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(AudioError::ConfigurationFailed(format!("invalid maximum duration: {secs} s")));
            }
        }
        if self.file_prefix.is_empty() {
            return Err(AudioError::ConfigurationFailed("file prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn buffer_size(&self) -> Option<Duration> {
        self.buffer_size_ms
            .map(|ms| Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let json = fs::read_to_string(path)
            .map_err(|e| AudioError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| AudioError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            format: Format::new(Mix::new(44100, SampleType::Int24), Channels::new(2, 0, 0, 0)),
            buffer_size_ms: None,
            interleaved: true,
            access: BufferAccess::Raw,
            output_directory: PathBuf::from("."),
            file_prefix: "capture".into(),
            max_duration_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn output_only_format_is_rejected() {
        let config = CaptureConfiguration {
            format: Format::new(Mix::new(48000, SampleType::Float32), Channels::new(0, 0, 2, 0)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AudioError::ConfigurationFailed(_))));
    }

    #[test]
    fn bad_mask_is_a_format_error() {
        let config = CaptureConfiguration {
            format: Format::new(Mix::new(48000, SampleType::Int16), Channels::new(2, 0b1, 0, 0)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AudioError::UnsupportedFormat(_))));
    }

    #[test]
    fn load_fills_missing_fields() {
        let path = std::env::temp_dir().join(format!("capture-config-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{ "buffer_size_ms": 10.0, "access": "safe", "file_prefix": "take" }"#).unwrap();

        let config = CaptureConfiguration::load(&path).unwrap();
        assert_eq!(config.access, BufferAccess::Safe);
        assert_eq!(config.file_prefix, "take");
        assert_eq!(config.buffer_size(), Some(Duration::from_millis(10)));
        assert_eq!(config.format.mix.rate, 44100);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("capture-config-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CaptureConfiguration::load(&path),
            Err(AudioError::ConfigurationFailed(_))
        ));
        let _ = fs::remove_file(&path);
    }
}
