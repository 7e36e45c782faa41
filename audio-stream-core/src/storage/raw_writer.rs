use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::AudioError;

/// Streaming writer for headerless PCM files.
///
/// Bytes are stored exactly as handed over; the metadata sidecar records
/// how to interpret them. Protect with a `Mutex` for cross-thread access.
pub struct RawPcmWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    total_bytes_written: u64,
}

impl RawPcmWriter {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: None,
            total_bytes_written: 0,
        }
    }

    /// Create the output directory and an empty file. Opening twice is a
    /// no-op.
    pub fn open(&mut self) -> Result<(), AudioError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AudioError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&self.file_path)
            .map_err(|e| AudioError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(BufWriter::new(file));
        self.total_bytes_written = 0;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AudioError::StorageError("file is not open for writing".into()))?;
        file.write_all(data)
            .map_err(|e| AudioError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and close the file, returning its SHA-256 checksum as hex.
    pub fn close(&mut self) -> Result<String, AudioError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| AudioError::StorageError("file is not open".into()))?;
        file.flush().map_err(|e| AudioError::StorageError(e.to_string()))?;
        file.get_ref()
            .sync_all()
            .map_err(|e| AudioError::StorageError(e.to_string()))?;
        drop(file);

        sha256_file(&self.file_path)
    }

    /// Total bytes written since the file was opened.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, AudioError> {
    let data =
        fs::read(path).map_err(|e| AudioError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("audio_stream_test_{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn writes_bytes_verbatim() {
        let path = temp_file_path("plain.pcm");
        let mut writer = RawPcmWriter::new(path.clone());
        writer.open().unwrap();

        writer.write(&[1, 2, 3]).unwrap();
        writer.write(&[4, 5]).unwrap();
        assert_eq!(writer.bytes_written(), 5);

        let checksum = writer.close().unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(!writer.is_open());

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn checksum_of_empty_file() {
        let path = temp_file_path("empty.pcm");
        let mut writer = RawPcmWriter::new(path.clone());
        writer.open().unwrap();
        let checksum = writer.close().unwrap();
        assert_eq!(checksum, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn write_requires_open() {
        let mut writer = RawPcmWriter::new(temp_file_path("closed.pcm"));
        assert!(matches!(writer.write(&[0]), Err(AudioError::StorageError(_))));
        assert!(matches!(writer.close(), Err(AudioError::StorageError(_))));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
