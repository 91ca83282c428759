use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use scraper::{Html, Selector};
use tokio::sync::mpsc;

use super::error::{Error, Result};
use super::models::{FetchRequest, FetcherEvent, ImageChunk};
use super::site::{PageSource, resolve_url};

/// Image urls inside the reader area, in page order.
pub fn extract_image_urls(html: &str, chapter_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(".reading-content img") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|img| {
            let src = img
                .value()
                .attr("src")
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .or_else(|| img.value().attr("data-src").map(str::trim))
                .filter(|src| !src.is_empty())?;
            Some(resolve_url(chapter_url, src).unwrap_or_else(|_| src.to_string()))
        })
        .collect()
}

async fn fetch_encoded<S: PageSource + ?Sized>(source: &S, url: &str) -> Result<String> {
    let bytes = source.fetch_bytes(url).await?;
    image::guess_format(&bytes).map_err(|_| Error::UnrecognizedImage(url.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Fetches one chapter and reports every image, then exactly one
/// completion or error event.
///
/// Per-image failures are reported as failed chunks and do not stop the
/// chapter. Only a failure to load the chapter page itself is fatal, in which
/// case no chunks are sent at all.
pub async fn fetch_chapter<S: PageSource + ?Sized>(
    source: &S,
    request: &FetchRequest,
    events: &mpsc::UnboundedSender<FetcherEvent>,
    image_delay: Duration,
) -> Result<usize> {
    let FetchRequest {
        chapter_url,
        chapter_name,
    } = request;

    log::info!("[{chapter_name}] extracting images from {chapter_url}");

    let html = match source.fetch_text(chapter_url).await {
        Ok(html) => html,
        Err(e) => {
            let _ = events.send(FetcherEvent::ChapterError {
                chapter_name: chapter_name.clone(),
                reason: e.to_string(),
            });
            return Err(e);
        }
    };

    let image_urls = extract_image_urls(&html, chapter_url);
    log::info!("[{chapter_name}] found {} image urls", image_urls.len());

    for (index, url) in image_urls.iter().enumerate() {
        if index > 0 && !image_delay.is_zero() {
            tokio::time::sleep(image_delay).await;
        }

        let chunk = match fetch_encoded(source, url).await {
            Ok(data) => ImageChunk::encoded(index, data),
            Err(e) => {
                log::warn!("[{chapter_name}] image {index} ({url}) failed: {e}");
                ImageChunk::failed(index, e.to_string())
            }
        };

        let _ = events.send(FetcherEvent::ImageChunk {
            chapter_name: chapter_name.clone(),
            chunk,
        });
    }

    let _ = events.send(FetcherEvent::ChapterComplete {
        chapter_name: chapter_name.clone(),
        total_expected: image_urls.len(),
    });

    Ok(image_urls.len())
}

/// Runs fetch requests one after another until the request side hangs up.
pub async fn serve<S: PageSource + 'static>(
    source: Arc<S>,
    mut requests: mpsc::UnboundedReceiver<FetchRequest>,
    events: mpsc::UnboundedSender<FetcherEvent>,
    image_delay: Duration,
) {
    while let Some(request) = requests.recv().await {
        if let Err(e) = fetch_chapter(source.as_ref(), &request, &events, image_delay).await {
            log::error!("[{}] could not load chapter: {e}", request.chapter_name);
        }
    }
    log::debug!("fetcher stopped");
}

/// Starts a fetcher task and hands back the two channel ends the
/// orchestrator talks to it through.
pub fn spawn<S: PageSource + 'static>(
    source: Arc<S>,
    image_delay: Duration,
) -> (
    mpsc::UnboundedSender<FetchRequest>,
    mpsc::UnboundedReceiver<FetcherEvent>,
) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(serve(source, request_rx, event_tx, image_delay));
    (request_tx, event_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::ChunkPayload;
    use crate::backend::testing::{FakeSource, JPEG_BYTES, PNG_BYTES};

    const CHAPTER_URL: &str = "https://manga.detectiveconanar.com/manga/dc/chapter-1/";

    fn request() -> FetchRequest {
        FetchRequest {
            chapter_url: CHAPTER_URL.to_string(),
            chapter_name: "Chapter 1".to_string(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<FetcherEvent>) -> Vec<FetcherEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn image_urls_fall_back_to_data_src() {
        let html = r#"
            <img src="https://x.com/outside.jpg"/>
            <div class="reading-content">
              <img src=" https://x.com/1.jpg "/>
              <img data-src="https://x.com/2.jpg"/>
              <img src="" data-src="/3.jpg"/>
              <img alt="nothing"/>
            </div>
        "#;
        let urls = extract_image_urls(html, CHAPTER_URL);
        assert_eq!(
            urls,
            vec![
                "https://x.com/1.jpg",
                "https://x.com/2.jpg",
                "https://manga.detectiveconanar.com/3.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn sends_every_image_then_completion() {
        let source = FakeSource::new()
            .with_chapter(CHAPTER_URL, &["https://x.com/1.jpg", "https://x.com/2.png"])
            .with_image("https://x.com/1.jpg", JPEG_BYTES)
            .with_image("https://x.com/2.png", PNG_BYTES);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let total = fetch_chapter(&source, &request(), &tx, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(total, 2);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        match &events[0] {
            FetcherEvent::ImageChunk { chunk, .. } => {
                assert_eq!(chunk.index, 0);
                assert_eq!(chunk.payload, ChunkPayload::Encoded(BASE64.encode(JPEG_BYTES)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            events[2],
            FetcherEvent::ChapterComplete {
                chapter_name: "Chapter 1".into(),
                total_expected: 2,
            }
        );
    }

    #[tokio::test]
    async fn failed_images_keep_their_index() {
        let source = FakeSource::new()
            .with_chapter(
                CHAPTER_URL,
                &["https://x.com/1.jpg", "https://x.com/missing.jpg", "https://x.com/3.jpg"],
            )
            .with_image("https://x.com/1.jpg", JPEG_BYTES)
            .with_image("https://x.com/3.jpg", b"<html>not an image</html>");
        let (tx, mut rx) = mpsc::unbounded_channel();

        fetch_chapter(&source, &request(), &tx, Duration::ZERO)
            .await
            .unwrap();

        let chunks: Vec<(usize, bool)> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                FetcherEvent::ImageChunk { chunk, .. } => Some((chunk.index, chunk.is_failure())),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec![(0, false), (1, true), (2, true)]);
    }

    #[tokio::test]
    async fn unreachable_chapter_sends_a_single_error() {
        let source = FakeSource::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(fetch_chapter(&source, &request(), &tx, Duration::ZERO).await.is_err());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FetcherEvent::ChapterError { .. }));
    }

    #[tokio::test]
    async fn serve_handles_requests_in_order() {
        let second_url = "https://manga.detectiveconanar.com/manga/dc/chapter-2/";
        let source = Arc::new(
            FakeSource::new()
                .with_chapter(CHAPTER_URL, &[])
                .with_chapter(second_url, &[]),
        );
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        req_tx.send(request()).unwrap();
        req_tx
            .send(FetchRequest {
                chapter_url: second_url.to_string(),
                chapter_name: "Chapter 2".to_string(),
            })
            .unwrap();
        drop(req_tx);

        serve(source, req_rx, tx, Duration::ZERO).await;

        let names: Vec<String> = drain(&mut rx)
            .iter()
            .map(|event| event.chapter_name().to_string())
            .collect();
        assert_eq!(names, vec!["Chapter 1", "Chapter 2"]);
    }
}
