//! In-memory stand-ins for the network, archive writer and download sink.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::archive::ArchiveWriter;
use super::download::DownloadSink;
use super::error::{Error, Result};
use super::models::EncodedImage;
use super::site::PageSource;

pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

/// Shared, ordered record of what the fakes were asked to do.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[derive(Default)]
pub struct FakeSource {
    pages: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
    stalled: HashSet<String>,
    pub journal: Journal,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_image(mut self, url: &str, bytes: &[u8]) -> Self {
        self.images.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Requests for this url never finish.
    pub fn with_stall(mut self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    /// A chapter page listing the given image urls under `.reading-content`.
    pub fn with_chapter(self, url: &str, image_urls: &[&str]) -> Self {
        let images: String = image_urls
            .iter()
            .map(|src| format!("<img src=\"{src}\"/>"))
            .collect();
        let html = format!("<div class=\"reading-content\">{images}</div>");
        self.with_page(url, &html)
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

impl PageSource for FakeSource {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.record(format!("page {url}"));
        if self.stalled.contains(url) {
            std::future::pending::<()>().await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Url(format!("{url}: 404")))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.record(format!("image {url}"));
        if self.stalled.contains(url) {
            std::future::pending::<()>().await;
        }
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Url(format!("{url}: 404")))
    }
}

/// Writes a readable listing of the entries instead of a real archive.
#[derive(Default)]
pub struct FakeArchiver {
    pub journal: Journal,
    pub produce_empty: bool,
}

impl ArchiveWriter for FakeArchiver {
    fn write(&self, images: &[EncodedImage]) -> Result<Vec<u8>> {
        let indices: Vec<String> = images.iter().map(|i| i.index.to_string()).collect();
        self.journal
            .lock()
            .unwrap()
            .push(format!("archive {}", indices.join(",")));
        if self.produce_empty {
            return Ok(Vec::new());
        }
        Ok(indices.join(",").into_bytes())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub journal: Journal,
    pub fail: bool,
}

impl DownloadSink for FakeSink {
    async fn save(&self, relative_path: &Path, _artifact: Vec<u8>) -> Result<PathBuf> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("save {}", relative_path.display()));
        if self.fail {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        Ok(relative_path.to_path_buf())
    }
}
