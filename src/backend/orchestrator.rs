use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::archive::ArchiveWriter;
use super::collector::ChunkCollector;
use super::download::{DownloadSink, artifact_path};
use super::error::{Error, Result};
use super::models::{
    ChapterDescriptor, ChapterResult, ChapterSelection, FetchRequest, FetcherEvent,
};
use super::site::{Site, TargetContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Idle,
    Requested,
    AwaitingChunks,
    Archiving,
    Downloading,
    Done,
    Skipped,
    Failed,
}

impl ChapterState {
    pub fn label(self) -> &'static str {
        match self {
            ChapterState::Idle => "queued",
            ChapterState::Requested => "requested",
            ChapterState::AwaitingChunks => "collecting",
            ChapterState::Archiving => "archiving",
            ChapterState::Downloading => "saving",
            ChapterState::Done => "done",
            ChapterState::Skipped => "skipped",
            ChapterState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChapterState::Done | ChapterState::Skipped | ChapterState::Failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub saved: Vec<PathBuf>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub cancelled: bool,
    /// Chapters never started because the sequence was cancelled.
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub enum Progress {
    Chapter {
        name: String,
        state: ChapterState,
        detail: Option<String>,
    },
    Image {
        name: String,
        index: usize,
        ok: bool,
    },
    Finished(Summary),
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub download_root: String,
    pub chapter_delay: Duration,
    pub chapter_timeout: Duration,
}

enum ChapterOutcome {
    Saved(PathBuf),
    Skipped,
}

/// Downloads selected chapters one at a time.
///
/// The orchestrator owns the chunk collector. Fetcher events are only ever
/// applied from inside [`Orchestrator::run`], so the collector needs no lock.
pub struct Orchestrator<A, D> {
    collector: ChunkCollector,
    requests: mpsc::UnboundedSender<FetchRequest>,
    events: mpsc::UnboundedReceiver<FetcherEvent>,
    archiver: Arc<A>,
    sink: D,
    site: Site,
    target: watch::Receiver<TargetContext>,
    target_live: bool,
    cancelled: bool,
    progress: Option<mpsc::UnboundedSender<Progress>>,
    options: OrchestratorOptions,
}

impl<A, D> Orchestrator<A, D>
where
    A: ArchiveWriter + 'static,
    D: DownloadSink,
{
    pub fn new(
        requests: mpsc::UnboundedSender<FetchRequest>,
        events: mpsc::UnboundedReceiver<FetcherEvent>,
        archiver: A,
        sink: D,
        site: Site,
        target: watch::Receiver<TargetContext>,
        options: OrchestratorOptions,
    ) -> Self {
        Orchestrator {
            collector: ChunkCollector::new(),
            requests,
            events,
            archiver: Arc::new(archiver),
            sink,
            site,
            target,
            target_live: true,
            cancelled: false,
            progress: None,
            options,
        }
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, progress: Progress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(progress);
        }
    }

    fn set_state(&self, name: &str, state: ChapterState, detail: Option<String>) {
        self.report(Progress::Chapter {
            name: name.to_string(),
            state,
            detail,
        });
    }

    fn target_is_valid(&self) -> bool {
        self.target.borrow().is_valid_for(&self.site)
    }

    fn cancel(&mut self, reason: &str) {
        if !self.cancelled {
            log::warn!("download sequence cancelled: {reason}");
            self.cancelled = true;
        }
        self.collector.cancel_all(reason);
    }

    fn on_target_changed(&mut self, changed: std::result::Result<(), watch::error::RecvError>) {
        if changed.is_err() {
            self.target_live = false;
        } else if !self.target_is_valid() {
            self.cancel("the target page was closed or left the manga site");
        }
    }

    fn on_event(&mut self, event: FetcherEvent) {
        if let FetcherEvent::ImageChunk {
            chapter_name,
            chunk,
        } = &event
        {
            if self.collector.is_open(chapter_name) {
                self.report(Progress::Image {
                    name: chapter_name.clone(),
                    index: chunk.index,
                    ok: !chunk.is_failure(),
                });
            }
        }
        self.collector.handle(event);
    }

    /// Processes every chapter in order and reports what happened to each.
    pub async fn run(mut self, selection: ChapterSelection) -> Summary {
        let ChapterSelection {
            manga_title,
            chapters,
        } = selection;

        log::info!(
            "starting download of {} chapter(s) of {manga_title}",
            chapters.len()
        );
        for chapter in &chapters {
            self.set_state(&chapter.name, ChapterState::Idle, None);
        }

        let mut summary = Summary::default();

        for (position, chapter) in chapters.iter().enumerate() {
            if !self.cancelled && !self.target_is_valid() {
                self.cancel("the target page was closed or left the manga site");
            }
            if self.cancelled {
                summary.remaining = chapters.len() - position;
                break;
            }

            let outcome = self.process_chapter(&manga_title, chapter).await;
            self.collector.release(&chapter.name);

            match outcome {
                Ok(ChapterOutcome::Saved(path)) => {
                    log::info!("[{}] saved to {}", chapter.name, path.display());
                    self.set_state(
                        &chapter.name,
                        ChapterState::Done,
                        Some(path.display().to_string()),
                    );
                    summary.saved.push(path);
                }
                Ok(ChapterOutcome::Skipped) => {
                    self.set_state(
                        &chapter.name,
                        ChapterState::Skipped,
                        Some("no images".to_string()),
                    );
                    summary.skipped.push(chapter.name.clone());
                }
                Err(e) => {
                    log::error!("[{}] {e}", chapter.name);
                    self.set_state(&chapter.name, ChapterState::Failed, Some(e.to_string()));
                    summary.failed.push((chapter.name.clone(), e.to_string()));
                }
            }

            if position + 1 < chapters.len() {
                self.pause(self.options.chapter_delay).await;
            }
        }

        summary.cancelled = self.cancelled;
        log::info!(
            "finished: {} saved, {} skipped, {} failed{}",
            summary.saved.len(),
            summary.skipped.len(),
            summary.failed.len(),
            if summary.cancelled { ", cancelled" } else { "" }
        );
        self.report(Progress::Finished(summary.clone()));
        summary
    }

    async fn process_chapter(
        &mut self,
        manga_title: &str,
        chapter: &ChapterDescriptor,
    ) -> Result<ChapterOutcome> {
        let name = chapter.name.as_str();

        self.set_state(name, ChapterState::Requested, None);
        let resolution = self.collector.open(name);
        let request = FetchRequest {
            chapter_url: chapter.url.clone(),
            chapter_name: name.to_string(),
        };
        if self.requests.send(request).is_err() {
            self.collector.on_error(name, "the image fetcher is not running");
        }

        self.set_state(name, ChapterState::AwaitingChunks, None);
        let images = match self.await_resolution(name, resolution).await {
            ChapterResult::Failed { reason } => return Err(Error::Chapter(reason)),
            ChapterResult::Collected {
                images,
                total_expected,
            } => {
                log::info!(
                    "[{name}] received {} of {total_expected} images",
                    images.len()
                );
                images
            }
        };

        if images.is_empty() {
            log::warn!("[{name}] no images were downloaded, nothing to archive");
            return Ok(ChapterOutcome::Skipped);
        }

        self.set_state(
            name,
            ChapterState::Archiving,
            Some(format!("{} images", images.len())),
        );
        let archiver = Arc::clone(&self.archiver);
        let artifact = tokio::task::spawn_blocking(move || archiver.write(&images)).await??;
        if artifact.is_empty() {
            return Err(Error::EmptyArchive);
        }

        self.set_state(name, ChapterState::Downloading, None);
        let relative = artifact_path(&self.options.download_root, manga_title, name);
        let saved = self.sink.save(&relative, artifact).await?;
        Ok(ChapterOutcome::Saved(saved))
    }

    /// Feeds fetcher events into the collector until this chapter resolves.
    ///
    /// The timeout is measured from the last fetcher event, not from the
    /// request, so a long chapter that keeps delivering is never cut off.
    async fn await_resolution(
        &mut self,
        name: &str,
        mut resolution: oneshot::Receiver<ChapterResult>,
    ) -> ChapterResult {
        let timeout = self.options.chapter_timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                result = &mut resolution => {
                    return result.unwrap_or_else(|_| ChapterResult::failed("collection was abandoned"));
                }
                event = self.events.recv() => match event {
                    Some(event) => {
                        // Requests are served in order, so any event counts as progress.
                        deadline
                            .as_mut()
                            .reset(tokio::time::Instant::now() + timeout);
                        self.on_event(event);
                    }
                    None => self.collector.on_error(name, "the image fetcher stopped"),
                },
                changed = self.target.changed(), if self.target_live => {
                    self.on_target_changed(changed);
                }
                _ = &mut deadline => {
                    self.collector
                        .on_error(name, &format!("no response within {}s", timeout.as_secs_f32()));
                }
            }
        }
    }

    /// Waits between chapters, cut short if the target goes away.
    async fn pause(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return,
                changed = self.target.changed(), if self.target_live => {
                    self.on_target_changed(changed);
                    if self.cancelled {
                        return;
                    }
                }
            }
        }
    }
}
