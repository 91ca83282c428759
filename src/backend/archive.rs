use std::io::{Cursor, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::error::{Error, Result};
use super::models::EncodedImage;

pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

/// Bundles a chapter's images into one archive blob.
pub trait ArchiveWriter: Send + Sync {
    fn write(&self, images: &[EncodedImage]) -> Result<Vec<u8>>;
}

/// `001.jpg` for the image at index 0.
pub fn entry_name(index: usize) -> String {
    format!("{:03}.jpg", index + 1)
}

pub struct ZipArchiver {
    compression_level: i64,
}

impl ZipArchiver {
    pub fn new(compression_level: i64) -> Self {
        Self { compression_level }
    }
}

impl Default for ZipArchiver {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ArchiveWriter for ZipArchiver {
    fn write(&self, images: &[EncodedImage]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level));

        let mut written = 0;
        for image in images {
            let bytes = match BASE64.decode(&image.data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("skipped image {} with an invalid payload: {e}", image.index);
                    continue;
                }
            };
            zip.start_file(entry_name(image.index), options)?;
            zip.write_all(&bytes)?;
            written += 1;
        }

        let artifact = zip.finish()?.into_inner();
        if written == 0 || artifact.is_empty() {
            return Err(Error::EmptyArchive);
        }
        Ok(artifact)
    }
}
