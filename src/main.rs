mod backend;
mod cli;
mod logging;
mod ui;

use backend::archive::ZipArchiver;
use backend::config::{self, Settings};
use backend::download::FileSink;
use backend::error::Result as BackendResult;
use backend::extractor::{self, SeriesPage};
use backend::fetcher;
use backend::models::ChapterSelection;
use backend::orchestrator::{Orchestrator, OrchestratorOptions, Progress, Summary};
use backend::selection::ChapterList;
use backend::site::{HttpSource, Site, TargetContext};
use cli::Cli;
use ui::ui::{App, AppState, InputMode, View, ui};

use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{error::Error, io, sync::Arc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

enum BackgroundTask {
    SeriesLoaded(BackendResult<SeriesPage>),
    Progress(Progress),
}

/// What a key press asks the event loop to do.
#[derive(Debug, PartialEq)]
enum Action {
    None,
    Quit,
    Cancel,
    Download(ChapterSelection),
    Open(String),
}

struct ActiveDownload {
    target: watch::Sender<TargetContext>,
    handle: JoinHandle<Summary>,
}

impl ActiveDownload {
    fn cancel(&self) {
        let _ = self.target.send(TargetContext::Closed);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_file = if cli.headless {
        None
    } else {
        Some(cli.log_file.clone().unwrap_or_else(config::default_log_path))
    };
    logging::init(log_file.as_deref())?;

    let mut settings = Settings::load()?;
    cli.apply(&mut settings);

    let source = Arc::new(HttpSource::new(
        &settings.user_agent,
        settings.request_timeout(),
    )?);

    if cli.headless {
        return run_headless(&cli, &settings, source).await;
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackgroundTask>();

    app.set_loading(&format!("Reading chapters from {}", cli.url));
    terminal.draw(|f| ui(f, &mut app))?;

    spawn_series_loader(cli.url.clone(), settings.site(), source.clone(), task_tx.clone());

    let res = run_app(
        &mut terminal,
        &mut app,
        &mut task_rx,
        task_tx,
        &settings,
        source,
        cli.descending,
    )
    .await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match res {
        Err(err) => eprintln!("{err}"),
        Ok(Some(download)) => {
            eprintln!("Stopping after the current chapter...");
            if let Ok(summary) = download.handle.await {
                print_summary(&summary);
            }
        }
        Ok(None) => {}
    }
    Ok(())
}

async fn run_headless(
    cli: &Cli,
    settings: &Settings,
    source: Arc<HttpSource>,
) -> Result<(), Box<dyn Error>> {
    let page = extractor::load_series(source.as_ref(), &settings.site(), &cli.url).await?;

    let mut list = ChapterList::new(page.manga_title.clone(), page.chapters);
    if let Some(filter) = &cli.filter {
        list.set_filter(filter.as_str());
    }
    list.apply_range(cli.from, cli.to)?;
    if cli.descending {
        list.toggle_sort();
    }

    if cli.list {
        println!("{}", list.manga_title());
        for entry in list.visible() {
            println!(
                "{:>4}  {}  {}",
                entry.id,
                entry.chapter.name,
                entry.chapter.release_date.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    if cli.all || cli.narrows_selection() {
        list.select_visible();
    }
    let Some(selection) = list.to_selection() else {
        return Err("no chapters selected; pass --all, --filter or --from/--to".into());
    };

    let (target_tx, target_rx) = watch::channel(TargetContext::Open {
        url: page.url.clone(),
    });
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping after the current chapter");
            let _ = target_tx.send(TargetContext::Closed);
            // keep the sender alive until the download notices
            std::future::pending::<()>().await;
        }
    });

    let summary = spawn_download(settings, source, selection, target_rx, None).await?;
    print_summary(&summary);

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} chapter(s) failed", summary.failed.len()).into())
    }
}

fn print_summary(summary: &Summary) {
    for path in &summary.saved {
        println!("saved    {}", path.display());
    }
    for name in &summary.skipped {
        println!("skipped  {name} (no images)");
    }
    for (name, reason) in &summary.failed {
        println!("failed   {name}: {reason}");
    }
    if summary.cancelled {
        println!("cancelled, {} chapter(s) not started", summary.remaining);
    }
}

fn spawn_series_loader(
    url: String,
    site: Site,
    source: Arc<HttpSource>,
    tx: mpsc::UnboundedSender<BackgroundTask>,
) {
    tokio::spawn(async move {
        let result = extractor::load_series(source.as_ref(), &site, &url).await;
        if let Err(e) = &result {
            log::error!("could not load {url}: {e}");
        }
        let _ = tx.send(BackgroundTask::SeriesLoaded(result));
    });
}

/// Wires a fresh fetcher to an orchestrator and starts the sequence.
fn spawn_download(
    settings: &Settings,
    source: Arc<HttpSource>,
    selection: ChapterSelection,
    target: watch::Receiver<TargetContext>,
    progress: Option<mpsc::UnboundedSender<Progress>>,
) -> JoinHandle<Summary> {
    let (requests, events) = fetcher::spawn(source, settings.image_delay());
    let options = OrchestratorOptions {
        download_root: settings.download_root.clone(),
        chapter_delay: settings.chapter_delay(),
        chapter_timeout: settings.chapter_timeout(),
    };

    let mut orchestrator = Orchestrator::new(
        requests,
        events,
        ZipArchiver::new(settings.compression_level),
        FileSink::new(settings.output_dir()),
        settings.site(),
        target,
        options,
    );
    if let Some(progress) = progress {
        orchestrator = orchestrator.with_progress(progress);
    }

    tokio::spawn(orchestrator.run(selection))
}

fn spawn_progress_forwarder(
    tx: mpsc::UnboundedSender<BackgroundTask>,
) -> mpsc::UnboundedSender<Progress> {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            if tx.send(BackgroundTask::Progress(progress)).is_err() {
                break;
            }
        }
    });
    progress_tx
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    task_rx: &mut mpsc::UnboundedReceiver<BackgroundTask>,
    task_tx: mpsc::UnboundedSender<BackgroundTask>,
    settings: &Settings,
    source: Arc<HttpSource>,
    descending: bool,
) -> io::Result<Option<ActiveDownload>> {
    let mut event_stream = EventStream::new();
    let mut download: Option<ActiveDownload> = None;

    loop {
        app.expire_status();
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            // Redraw tick for the spinner and status timeout
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(50)) => {}

            Some(Ok(event)) = event_stream.next() => {
                let Event::Key(key) = event else { continue };
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                let action = match (app.state, app.view) {
                    (AppState::Ready, View::Select) => handle_select_input(app, key.code),
                    (AppState::Ready, View::Download) => handle_download_input(app, key.code),
                    _ if key.code == KeyCode::Char('q') => Action::Quit,
                    _ => Action::None,
                };

                match action {
                    Action::None => {}
                    Action::Quit => {
                        if let Some(active) = &download {
                            active.cancel();
                        }
                        return Ok(download);
                    }
                    Action::Cancel => {
                        if let Some(active) = &download {
                            active.cancel();
                            app.show_info("Cancelling after the current chapter...");
                        }
                    }
                    Action::Download(selection) => {
                        app.begin_download(&selection);
                        let (target, target_rx) = watch::channel(TargetContext::Open {
                            url: app.series_url.clone(),
                        });
                        let handle = spawn_download(
                            settings,
                            source.clone(),
                            selection,
                            target_rx,
                            Some(spawn_progress_forwarder(task_tx.clone())),
                        );
                        download = Some(ActiveDownload { target, handle });
                    }
                    Action::Open(url) => {
                        if let Err(e) = webbrowser::open(&url) {
                            app.show_error(format!("Could not open {url}: {e}"));
                        }
                    }
                }
            }

            Some(task) = task_rx.recv() => {
                match task {
                    BackgroundTask::SeriesLoaded(Ok(page)) => {
                        let count = page.chapters.len();
                        app.set_ready(page);
                        if descending {
                            if let Some(list) = app.chapters.as_mut() {
                                list.toggle_sort();
                            }
                        }
                        app.show_success(format!("Found {count} chapters"));
                    }
                    BackgroundTask::SeriesLoaded(Err(e)) => {
                        app.set_failed(&e.to_string());
                    }
                    BackgroundTask::Progress(progress) => {
                        if matches!(progress, Progress::Finished(_)) {
                            download = None;
                        }
                        app.apply_progress(progress);
                    }
                }
            }
        }
    }
}

fn handle_select_input(app: &mut App, key: KeyCode) -> Action {
    match app.input {
        InputMode::Search => {
            handle_search_input(app, key);
            return Action::None;
        }
        InputMode::RangeStart | InputMode::RangeEnd => {
            handle_range_input(app, key);
            return Action::None;
        }
        InputMode::Normal => {}
    }

    let Some(list) = app.chapters.as_mut() else {
        return Action::None;
    };

    match key {
        KeyCode::Up => app.move_up(),
        KeyCode::Down => app.move_down(),
        KeyCode::Char(' ') => app.toggle_current(),
        KeyCode::Char('a') => list.select_visible(),
        KeyCode::Char('d') => list.deselect_all(),
        KeyCode::Char('s') => list.toggle_sort(),
        KeyCode::Char('/') => app.input = InputMode::Search,
        KeyCode::Char('r') => app.input = InputMode::RangeStart,
        KeyCode::Char('o') => {
            if let Some(url) = app.current_url() {
                return Action::Open(url);
            }
        }
        KeyCode::Enter => match list.to_selection() {
            Some(selection) => return Action::Download(selection),
            None => app.show_error("Select at least one chapter first."),
        },
        KeyCode::Char('q') => return Action::Quit,
        _ => {}
    }
    Action::None
}

fn handle_search_input(app: &mut App, key: KeyCode) {
    let Some(list) = app.chapters.as_mut() else {
        return;
    };

    let mut filter = list.filter().to_string();
    match key {
        KeyCode::Char(c) => filter.push(c),
        KeyCode::Backspace => {
            filter.pop();
        }
        KeyCode::Enter | KeyCode::Esc => app.input = InputMode::Normal,
        _ => {}
    }
    list.set_filter(filter);
    app.clamp_cursor();
}

fn handle_range_input(app: &mut App, key: KeyCode) {
    let field = if app.input == InputMode::RangeStart {
        &mut app.range_start
    } else {
        &mut app.range_end
    };

    match key {
        KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => field.push(c),
        KeyCode::Backspace => {
            field.pop();
        }
        KeyCode::Tab => {
            app.input = match app.input {
                InputMode::RangeStart => InputMode::RangeEnd,
                _ => InputMode::RangeStart,
            };
        }
        KeyCode::Esc => app.input = InputMode::Normal,
        KeyCode::Enter => apply_range_input(app),
        _ => {}
    }
}

fn parse_bound(text: &str) -> Result<Option<f64>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| format!("'{text}' is not a chapter number."))
}

fn apply_range_input(app: &mut App) {
    let bounds = parse_bound(&app.range_start).and_then(|start| {
        parse_bound(&app.range_end).map(|end| (start, end))
    });
    let (start, end) = match bounds {
        Ok(bounds) => bounds,
        Err(e) => {
            app.show_error(e);
            return;
        }
    };

    let Some(list) = app.chapters.as_mut() else {
        return;
    };
    match list.apply_range(start, end) {
        Ok(()) => {
            app.input = InputMode::Normal;
            app.clamp_cursor();
            if start.is_some() {
                app.show_success("Range filter applied.");
            } else {
                app.show_success("Range filter cleared.");
            }
        }
        Err(e) => app.show_error(e.to_string()),
    }
}

fn handle_download_input(app: &mut App, key: KeyCode) -> Action {
    match key {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('c') | KeyCode::Esc if app.is_downloading() => Action::Cancel,
        KeyCode::Char('b') if !app.is_downloading() => {
            app.back_to_selection();
            Action::None
        }
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::ChapterDescriptor;

    fn ready_app() -> App {
        let mut app = App::new();
        app.set_ready(SeriesPage {
            url: "https://manga.detectiveconanar.com/manga/dc/".into(),
            manga_title: "Detective Conan".into(),
            chapters: ["Chapter 12", "Chapter 11", "Chapter 10"]
                .iter()
                .map(|name| ChapterDescriptor {
                    name: name.to_string(),
                    url: format!("https://manga.detectiveconanar.com/manga/dc/{name}/"),
                    release_date: None,
                })
                .collect(),
        });
        app
    }

    fn type_keys(app: &mut App, keys: &str) {
        for c in keys.chars() {
            handle_select_input(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn enter_without_selection_reports_an_error() {
        let mut app = ready_app();
        assert_eq!(handle_select_input(&mut app, KeyCode::Enter), Action::None);
        assert!(app.status.is_some());
    }

    #[test]
    fn search_then_select_visible() {
        let mut app = ready_app();
        type_keys(&mut app, "/11");
        handle_select_input(&mut app, KeyCode::Enter);
        assert_eq!(app.input, InputMode::Normal);

        handle_select_input(&mut app, KeyCode::Char('a'));
        match handle_select_input(&mut app, KeyCode::Enter) {
            Action::Download(selection) => {
                assert_eq!(selection.chapters.len(), 1);
                assert_eq!(selection.chapters[0].name, "Chapter 11");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn range_input_validates_and_applies() {
        let mut app = ready_app();
        type_keys(&mut app, "r12");
        handle_select_input(&mut app, KeyCode::Tab);
        type_keys(&mut app, "10");
        handle_select_input(&mut app, KeyCode::Enter);
        assert_eq!(app.input, InputMode::RangeEnd);
        assert_eq!(
            app.status.as_ref().map(|s| s.text.as_str()),
            Some("Start of range cannot be greater than end of range.")
        );

        app.range_start = "10".into();
        app.range_end = "11".into();
        handle_select_input(&mut app, KeyCode::Enter);
        assert_eq!(app.input, InputMode::Normal);
        assert_eq!(app.visible_ids(), vec![2, 1]);
    }

    #[test]
    fn download_view_keys() {
        let mut app = ready_app();
        let selection = ChapterSelection {
            manga_title: "Detective Conan".into(),
            chapters: Vec::new(),
        };
        app.begin_download(&selection);
        assert_eq!(handle_download_input(&mut app, KeyCode::Esc), Action::Cancel);
        assert_eq!(handle_download_input(&mut app, KeyCode::Char('b')), Action::None);
        assert_eq!(app.view, View::Download);

        app.apply_progress(Progress::Finished(Summary::default()));
        assert_eq!(handle_download_input(&mut app, KeyCode::Char('c')), Action::None);
        handle_download_input(&mut app, KeyCode::Char('b'));
        assert_eq!(app.view, View::Select);
    }
}
