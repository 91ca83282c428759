use std::future::Future;
use std::path::{Path, PathBuf};

use super::error::Result;

pub const DEFAULT_DOWNLOAD_ROOT: &str = "DC";

const UNSAFE_CHARS: [char; 10] = ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Replaces characters that are not allowed in file names with `-`.
///
/// `.` and `..` become `-` as well so a name can never leave its directory.
pub fn sanitize_file_name(name: &str) -> String {
    match name {
        "." | ".." => "-".to_string(),
        _ => name.replace(UNSAFE_CHARS, "-"),
    }
}

/// `<root>/<mangaTitle>/<chapter>.zip`, relative to the output directory.
pub fn artifact_path(root: &str, manga_title: &str, chapter_name: &str) -> PathBuf {
    Path::new(root)
        .join(sanitize_file_name(manga_title))
        .join(format!("{}.zip", sanitize_file_name(chapter_name)))
}

/// Stores a finished archive somewhere the user can find it.
pub trait DownloadSink: Send + Sync {
    fn save(
        &self,
        relative_path: &Path,
        artifact: Vec<u8>,
    ) -> impl Future<Output = Result<PathBuf>> + Send;
}

/// Saves archives below a base directory, usually the user's downloads folder.
pub struct FileSink {
    base_dir: PathBuf,
}

impl FileSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl DownloadSink for FileSink {
    async fn save(&self, relative_path: &Path, artifact: Vec<u8>) -> Result<PathBuf> {
        let path = self.base_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, artifact).await?;
        Ok(path)
    }
}
