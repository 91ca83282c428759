/// One chapter link as listed on the series page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDescriptor {
    pub name: String,
    pub url: String,
    pub release_date: Option<String>,
}

/// The chapters the user picked, in page order, plus the manga they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSelection {
    pub manga_title: String,
    pub chapters: Vec<ChapterDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPayload {
    /// Base64 text of the image bytes.
    Encoded(String),
    Failed(String),
}

/// A single image result, tagged with its position in the chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChunk {
    pub index: usize,
    pub payload: ChunkPayload,
}

impl ImageChunk {
    pub fn encoded(index: usize, data: impl Into<String>) -> Self {
        ImageChunk {
            index,
            payload: ChunkPayload::Encoded(data.into()),
        }
    }

    pub fn failed(index: usize, reason: impl Into<String>) -> Self {
        ImageChunk {
            index,
            payload: ChunkPayload::Failed(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.payload, ChunkPayload::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub index: usize,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterResult {
    /// Successfully received images, ascending by index.
    Collected {
        images: Vec<EncodedImage>,
        total_expected: usize,
    },
    Failed {
        reason: String,
    },
}

impl ChapterResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        ChapterResult::Failed {
            reason: reason.into(),
        }
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, ChapterResult::Collected { .. })
    }
}

/// Sent from the orchestrator to the fetcher to start one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub chapter_url: String,
    pub chapter_name: String,
}

/// Everything the fetcher reports back while working on a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherEvent {
    ImageChunk {
        chapter_name: String,
        chunk: ImageChunk,
    },
    ChapterComplete {
        chapter_name: String,
        total_expected: usize,
    },
    ChapterError {
        chapter_name: String,
        reason: String,
    },
}

impl FetcherEvent {
    #[cfg(test)]
    pub fn chapter_name(&self) -> &str {
        match self {
            FetcherEvent::ImageChunk { chapter_name, .. }
            | FetcherEvent::ChapterComplete { chapter_name, .. }
            | FetcherEvent::ChapterError { chapter_name, .. } => chapter_name,
        }
    }
}
