use std::collections::HashMap;

use tokio::sync::oneshot;

use super::models::{ChapterResult, ChunkPayload, EncodedImage, FetcherEvent, ImageChunk};

struct ChapterBuffer {
    received: Vec<ImageChunk>,
    resolve: oneshot::Sender<ChapterResult>,
}

/// Buffers image chunks per chapter until the fetcher signals the end of it.
///
/// Every buffer is resolved exactly once: the completion handle is a oneshot
/// sender, and the buffer is removed from the map in the same step that
/// consumes it.
#[derive(Default)]
pub struct ChunkCollector {
    buffers: HashMap<String, ChapterBuffer>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, chapter_name: &str) -> oneshot::Receiver<ChapterResult> {
        let (resolve, resolution) = oneshot::channel();
        let buffer = ChapterBuffer {
            received: Vec::new(),
            resolve,
        };

        if self.buffers.insert(chapter_name.to_string(), buffer).is_some() {
            log::warn!("[{chapter_name}] replaced a stale collection buffer");
        }

        resolution
    }

    pub fn on_chunk(&mut self, chapter_name: &str, chunk: ImageChunk) {
        let Some(buffer) = self.buffers.get_mut(chapter_name) else {
            log::debug!(
                "[{chapter_name}] dropped image {} for a chapter that is not being collected",
                chunk.index
            );
            return;
        };

        if let ChunkPayload::Failed(reason) = &chunk.payload {
            log::warn!("[{chapter_name}] image {} failed: {reason}", chunk.index);
        }

        // Last write wins for a repeated index.
        match buffer.received.iter_mut().find(|c| c.index == chunk.index) {
            Some(existing) => {
                log::debug!("[{chapter_name}] image {} received twice", chunk.index);
                *existing = chunk;
            }
            None => buffer.received.push(chunk),
        }
    }

    pub fn on_complete(&mut self, chapter_name: &str, total_expected: usize) {
        let Some(mut buffer) = self.buffers.remove(chapter_name) else {
            log::warn!("[{chapter_name}] completion received but nothing is waiting for it");
            return;
        };

        if buffer.received.len() != total_expected {
            log::warn!(
                "[{chapter_name}] expected {total_expected} images, received {}",
                buffer.received.len()
            );
        }

        buffer.received.sort_by_key(|chunk| chunk.index);
        let images: Vec<EncodedImage> = buffer
            .received
            .into_iter()
            .filter_map(|chunk| match chunk.payload {
                ChunkPayload::Encoded(data) => Some(EncodedImage {
                    index: chunk.index,
                    data,
                }),
                ChunkPayload::Failed(_) => None,
            })
            .collect();

        log::info!(
            "[{chapter_name}] collected {} of {total_expected} images",
            images.len()
        );

        let _ = buffer.resolve.send(ChapterResult::Collected {
            images,
            total_expected,
        });
    }

    pub fn on_error(&mut self, chapter_name: &str, reason: &str) {
        let Some(buffer) = self.buffers.remove(chapter_name) else {
            log::debug!("[{chapter_name}] error received but nothing is waiting for it: {reason}");
            return;
        };

        log::error!("[{chapter_name}] chapter failed: {reason}");
        let _ = buffer.resolve.send(ChapterResult::failed(reason));
    }

    pub fn cancel_all(&mut self, reason: &str) {
        for (chapter_name, buffer) in self.buffers.drain() {
            log::warn!("[{chapter_name}] cancelled: {reason}");
            let _ = buffer.resolve.send(ChapterResult::failed(reason));
        }
    }

    /// Drops the chapter's buffer if it is still open, failing whoever waits on it.
    pub fn release(&mut self, chapter_name: &str) {
        if let Some(buffer) = self.buffers.remove(chapter_name) {
            log::debug!("[{chapter_name}] released an unresolved buffer");
            let _ = buffer.resolve.send(ChapterResult::failed("collection released"));
        }
    }

    pub fn handle(&mut self, event: FetcherEvent) {
        match event {
            FetcherEvent::ImageChunk {
                chapter_name,
                chunk,
            } => self.on_chunk(&chapter_name, chunk),
            FetcherEvent::ChapterComplete {
                chapter_name,
                total_expected,
            } => self.on_complete(&chapter_name, total_expected),
            FetcherEvent::ChapterError {
                chapter_name,
                reason,
            } => self.on_error(&chapter_name, &reason),
        }
    }

    pub fn is_open(&self, chapter_name: &str) -> bool {
        self.buffers.contains_key(chapter_name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
