use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
};
use std::time::{Duration, Instant};

use crate::backend::extractor::SeriesPage;
use crate::backend::models::ChapterSelection;
use crate::backend::orchestrator::{ChapterState, Progress, Summary};
use crate::backend::selection::{ChapterList, SortOrder};

const SUCCESS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Select,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    RangeStart,
    RangeEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

pub struct Status {
    pub text: String,
    pub kind: StatusKind,
    since: Instant,
}

pub struct ChapterProgress {
    pub name: String,
    pub state: ChapterState,
    pub received: usize,
    pub failed_images: usize,
    pub detail: Option<String>,
}

pub struct App {
    pub state: AppState,
    pub loading_message: String,
    pub view: View,
    pub input: InputMode,
    pub series_url: String,
    pub chapters: Option<ChapterList>,
    pub list_state: ListState,
    pub range_start: String,
    pub range_end: String,
    pub status: Option<Status>,
    pub progress: Vec<ChapterProgress>,
    pub summary: Option<Summary>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            state: AppState::Loading,
            loading_message: "Initializing...".to_string(),
            view: View::Select,
            input: InputMode::Normal,
            series_url: String::new(),
            chapters: None,
            list_state: ListState::default(),
            range_start: String::new(),
            range_end: String::new(),
            status: None,
            progress: Vec::new(),
            summary: None,
        }
    }

    pub fn set_loading(&mut self, message: &str) {
        self.state = AppState::Loading;
        self.loading_message = message.to_string();
    }

    pub fn set_ready(&mut self, page: SeriesPage) {
        self.state = AppState::Ready;
        self.series_url = page.url;
        self.chapters = Some(ChapterList::new(page.manga_title, page.chapters));
        self.list_state.select(Some(0));
    }

    pub fn set_failed(&mut self, message: &str) {
        self.state = AppState::Failed;
        self.loading_message = message.to_string();
    }

    pub fn is_downloading(&self) -> bool {
        self.view == View::Download && self.summary.is_none()
    }

    fn set_status(&mut self, text: impl Into<String>, kind: StatusKind) {
        self.status = Some(Status {
            text: text.into(),
            kind,
            since: Instant::now(),
        });
    }

    pub fn show_info(&mut self, text: impl Into<String>) {
        self.set_status(text, StatusKind::Info);
    }

    pub fn show_success(&mut self, text: impl Into<String>) {
        self.set_status(text, StatusKind::Success);
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.set_status(text, StatusKind::Error);
    }

    /// Success messages fade out; errors stay until replaced.
    pub fn expire_status(&mut self) {
        let expired = self
            .status
            .as_ref()
            .is_some_and(|s| s.kind == StatusKind::Success && s.since.elapsed() >= SUCCESS_TTL);
        if expired {
            self.status = None;
        }
    }

    pub fn visible_ids(&self) -> Vec<usize> {
        self.chapters
            .as_ref()
            .map(|list| list.visible().iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }

    /// Keeps the cursor inside the visible list after filtering.
    pub fn clamp_cursor(&mut self) {
        let len = self.visible_ids().len();
        let selected = match (len, self.list_state.selected()) {
            (0, _) => None,
            (_, Some(i)) => Some(i.min(len - 1)),
            (_, None) => Some(0),
        };
        self.list_state.select(selected);
    }

    pub fn current_id(&self) -> Option<usize> {
        let ids = self.visible_ids();
        self.list_state.selected().and_then(|i| ids.get(i).copied())
    }

    pub fn current_url(&self) -> Option<String> {
        let id = self.current_id()?;
        self.chapters
            .as_ref()?
            .visible()
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| e.chapter.url.clone())
    }

    pub fn move_up(&mut self) {
        let selected = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(selected.saturating_sub(1)));
    }

    pub fn move_down(&mut self) {
        let len = self.visible_ids().len();
        let selected = self.list_state.selected().unwrap_or(0);
        if selected + 1 < len {
            self.list_state.select(Some(selected + 1));
        }
    }

    pub fn toggle_current(&mut self) {
        if let (Some(id), Some(list)) = (self.current_id(), self.chapters.as_mut()) {
            list.toggle(id);
        }
    }

    /// Switches to the progress view. The picked chapters are cleared so the
    /// next download starts from an empty selection.
    pub fn begin_download(&mut self, selection: &ChapterSelection) {
        if let Some(list) = self.chapters.as_mut() {
            list.deselect_all();
        }
        self.view = View::Download;
        self.summary = None;
        self.progress = selection
            .chapters
            .iter()
            .map(|c| ChapterProgress {
                name: c.name.clone(),
                state: ChapterState::Idle,
                received: 0,
                failed_images: 0,
                detail: None,
            })
            .collect();
    }

    pub fn back_to_selection(&mut self) {
        self.view = View::Select;
        self.progress.clear();
        self.summary = None;
    }

    pub fn apply_progress(&mut self, progress: Progress) {
        match progress {
            Progress::Chapter {
                name,
                state,
                detail,
            } => {
                if let Some(row) = self.progress.iter_mut().find(|r| r.name == name) {
                    row.state = state;
                    if detail.is_some() {
                        row.detail = detail;
                    }
                }
            }
            Progress::Image { name, index, ok } => {
                if let Some(row) = self.progress.iter_mut().find(|r| r.name == name) {
                    if ok {
                        row.received += 1;
                    } else {
                        row.failed_images += 1;
                        row.detail = Some(format!("page {} missing", index + 1));
                    }
                }
            }
            Progress::Finished(summary) => {
                let message = format!(
                    "{} saved, {} skipped, {} failed{}",
                    summary.saved.len(),
                    summary.skipped.len(),
                    summary.failed.len(),
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
                if summary.failed.is_empty() && !summary.cancelled {
                    self.show_success(message);
                } else {
                    self.show_error(message);
                }
                self.summary = Some(summary);
            }
        }
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    match (app.state, app.view) {
        (AppState::Loading, _) | (AppState::Failed, _) => draw_loading_screen(f, app),
        (AppState::Ready, View::Select) => draw_selection(f, app),
        (AppState::Ready, View::Download) => draw_download(f, app),
    }
}

fn draw_loading_screen(f: &mut Frame, app: &App) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .title("DC Downloader")
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let center_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Percentage(40),
        ])
        .split(inner);

    let headline = if app.state == AppState::Failed {
        Line::from(Span::styled(
            "Could not load the manga page (press q to quit)",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))
    } else {
        let spinner_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let frame_idx = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            / 100) as usize
            % spinner_frames.len();

        Line::from(vec![
            Span::styled(
                format!(" {} ", spinner_frames[frame_idx]),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "Loading...",
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ])
    };

    f.render_widget(
        Paragraph::new(headline).alignment(Alignment::Center),
        center_layout[1],
    );

    let message = Paragraph::new(&*app.loading_message)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(message, center_layout[2]);
}

fn draw_selection(f: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(3), // search + range
            Constraint::Min(5),    // chapters
            Constraint::Length(1), // status
            Constraint::Length(3), // footer
        ])
        .split(f.area());

    let Some(list) = app.chapters.as_ref() else {
        return;
    };

    let sort = match list.order() {
        SortOrder::Ascending => "↑ ascending",
        SortOrder::Descending => "↓ descending",
    };
    let header = Line::from(vec![
        Span::styled(
            list.manga_title().to_string(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  {} chapters  ", list.len())),
        Span::styled(
            format!("{} selected", list.selected_count()),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(format!("  {sort}"), Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(
        Paragraph::new(header).block(
            Block::default()
                .borders(Borders::ALL)
                .title("DC Downloader")
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        root[0],
    );

    draw_filters(f, root[1], app, list);

    let items: Vec<ListItem> = list
        .visible()
        .iter()
        .map(|entry| {
            let checkbox = if list.is_selected(entry.id) { "[x] " } else { "[ ] " };
            let mut spans = vec![
                Span::styled(checkbox, Style::default().fg(Color::Yellow)),
                Span::raw(entry.chapter.name.clone()),
            ];
            if let Some(date) = &entry.chapter.release_date {
                spans.push(Span::styled(
                    format!("  {date}"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let chapters = if items.is_empty() {
        List::new(vec![ListItem::new(Span::styled(
            "No chapters found matching your criteria.",
            Style::default().fg(Color::DarkGray),
        ))])
    } else {
        List::new(items)
    }
    .block(Block::default().borders(Borders::ALL).title("Chapters"))
    .highlight_style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    f.render_stateful_widget(chapters, root[2], &mut app.list_state);

    draw_status(f, root[3], app);
    draw_footer(
        f,
        root[4],
        &[
            ("space", "toggle"),
            ("a/d", "select/clear"),
            ("/", "search"),
            ("r", "range"),
            ("s", "sort"),
            ("o", "open"),
            ("enter", "download"),
            ("q", "quit"),
        ],
    );
}

fn draw_filters(f: &mut Frame, area: Rect, app: &App, list: &ChapterList) {
    let active = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let idle = Style::default().fg(Color::White);
    let style_for = |mode: InputMode| if app.input == mode { active } else { idle };

    let range = match list.range() {
        Some((start, end)) => format!("applied {start}-{end}"),
        None => "none".to_string(),
    };

    let line = Line::from(vec![
        Span::raw("Search: "),
        Span::styled(format!("{:<20}", list.filter()), style_for(InputMode::Search)),
        Span::raw("  Range: "),
        Span::styled(
            format!("{:>6}", app.range_start),
            style_for(InputMode::RangeStart),
        ),
        Span::raw(" - "),
        Span::styled(
            format!("{:<6}", app.range_end),
            style_for(InputMode::RangeEnd),
        ),
        Span::styled(format!("  ({range})"), Style::default().fg(Color::DarkGray)),
    ]);

    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn state_style(state: ChapterState) -> Style {
    match state {
        ChapterState::Done => Style::default().fg(Color::Green),
        ChapterState::Skipped => Style::default().fg(Color::Yellow),
        ChapterState::Failed => Style::default().fg(Color::Red),
        ChapterState::Idle => Style::default().fg(Color::DarkGray),
        _ => Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    }
}

fn draw_download(f: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // overall gauge
            Constraint::Min(5),    // chapters
            Constraint::Length(1), // status
            Constraint::Length(3), // footer
        ])
        .split(f.area());

    let total = app.progress.len().max(1);
    let finished = app
        .progress
        .iter()
        .filter(|row| row.state.is_terminal())
        .count();
    let title = app
        .chapters
        .as_ref()
        .map(|list| list.manga_title().to_string())
        .unwrap_or_default();

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Downloading {title}"))
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(finished as f64 / total as f64)
        .label(format!("{finished}/{}", app.progress.len()));
    f.render_widget(gauge, root[0]);

    let items: Vec<ListItem> = app
        .progress
        .iter()
        .map(|row| {
            let mut spans = vec![
                Span::styled(format!("{:<11}", row.state.label()), state_style(row.state)),
                Span::raw(row.name.clone()),
            ];
            if row.received > 0 || row.failed_images > 0 {
                spans.push(Span::styled(
                    format!("  {} images", row.received),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            if row.failed_images > 0 {
                spans.push(Span::styled(
                    format!(", {} missing", row.failed_images),
                    Style::default().fg(Color::Red),
                ));
            }
            if let Some(detail) = &row.detail {
                spans.push(Span::styled(
                    format!("  {detail}"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Chapters")),
        root[1],
    );

    draw_status(f, root[2], app);

    let keys: &[(&str, &str)] = if app.is_downloading() {
        &[("c/esc", "cancel"), ("q", "cancel and quit")]
    } else {
        &[("b", "back to chapters"), ("q", "quit")]
    };
    draw_footer(f, root[3], keys);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let Some(status) = &app.status else {
        return;
    };
    let color = match status.kind {
        StatusKind::Info => Color::White,
        StatusKind::Success => Color::Green,
        StatusKind::Error => Color::Red,
    };
    f.render_widget(
        Paragraph::new(status.text.as_str()).style(Style::default().fg(color)),
        area,
    );
}

fn draw_footer(f: &mut Frame, area: Rect, keys: &[(&str, &str)]) {
    let spans: Vec<Span> = keys
        .iter()
        .flat_map(|(key, action)| {
            [
                Span::styled(*key, Style::default().fg(Color::Yellow)),
                Span::raw(format!(": {action}  ")),
            ]
        })
        .collect();

    let p = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::ChapterDescriptor;

    fn page() -> SeriesPage {
        SeriesPage {
            url: "https://manga.detectiveconanar.com/manga/dc/".into(),
            manga_title: "Detective Conan".into(),
            chapters: ["Chapter 2", "Chapter 1", "Chapter 3"]
                .iter()
                .map(|name| ChapterDescriptor {
                    name: name.to_string(),
                    url: format!("https://manga.detectiveconanar.com/manga/dc/{name}/"),
                    release_date: None,
                })
                .collect(),
        }
    }

    #[test]
    fn cursor_follows_the_sorted_list() {
        let mut app = App::new();
        app.set_ready(page());

        app.move_down();
        app.toggle_current();
        let selection = app.chapters.as_ref().unwrap().to_selection().unwrap();
        assert_eq!(selection.chapters[0].name, "Chapter 2");

        app.move_down();
        app.move_down();
        assert_eq!(app.list_state.selected(), Some(2));

        app.chapters.as_mut().unwrap().set_filter("3");
        app.clamp_cursor();
        assert_eq!(app.list_state.selected(), Some(0));
        assert!(app.current_url().unwrap().ends_with("Chapter 3/"));
    }

    #[test]
    fn progress_updates_rows_and_summary() {
        let mut app = App::new();
        let page = page();
        let selection = ChapterSelection {
            manga_title: page.manga_title.clone(),
            chapters: page.chapters.clone(),
        };
        app.set_ready(page);
        app.begin_download(&selection);
        assert!(app.is_downloading());

        app.apply_progress(Progress::Image {
            name: "Chapter 1".into(),
            index: 0,
            ok: true,
        });
        app.apply_progress(Progress::Image {
            name: "Chapter 1".into(),
            index: 1,
            ok: false,
        });
        app.apply_progress(Progress::Chapter {
            name: "Chapter 1".into(),
            state: ChapterState::Failed,
            detail: Some("timed out".into()),
        });

        let row = app.progress.iter().find(|r| r.name == "Chapter 1").unwrap();
        assert_eq!((row.received, row.failed_images), (1, 1));
        assert_eq!(row.state, ChapterState::Failed);
        assert_eq!(row.detail.as_deref(), Some("timed out"));

        app.apply_progress(Progress::Finished(Summary {
            failed: vec![("Chapter 1".into(), "timed out".into())],
            ..Summary::default()
        }));
        assert!(!app.is_downloading());
        assert!(app.status.as_ref().is_some_and(|s| s.kind == StatusKind::Error));
    }

    #[test]
    fn starting_a_download_clears_the_selection() {
        let mut app = App::new();
        app.set_ready(page());
        app.chapters.as_mut().unwrap().select_visible();
        let selection = app.chapters.as_ref().unwrap().to_selection().unwrap();

        app.begin_download(&selection);
        assert_eq!(app.progress.len(), 3);
        assert_eq!(app.chapters.as_ref().unwrap().selected_count(), 0);

        app.apply_progress(Progress::Finished(Summary::default()));
        app.back_to_selection();
        assert!(app.chapters.as_ref().unwrap().to_selection().is_none());
    }

    #[test]
    fn only_success_messages_expire() {
        let mut app = App::new();
        app.show_error("broken");
        app.status.as_mut().unwrap().since = Instant::now() - SUCCESS_TTL;
        app.expire_status();
        assert!(app.status.is_some());

        app.show_success("done");
        app.status.as_mut().unwrap().since = Instant::now() - SUCCESS_TTL;
        app.expire_status();
        assert!(app.status.is_none());
    }
}
