use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::models::{ChapterDescriptor, ChapterSelection};

static CHAPTER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid chapter number pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Enter both start and end values for the range filter, or neither.")]
    Incomplete,
    #[error("Start of range cannot be greater than end of range.")]
    Inverted,
}

/// First integer or decimal in a chapter name.
pub fn chapter_number(name: &str) -> Option<f64> {
    CHAPTER_NUMBER
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct ChapterEntry {
    /// Position on the series page.
    pub id: usize,
    pub number: Option<f64>,
    pub chapter: ChapterDescriptor,
}

/// The chapter picker: filtering, sorting and the set of checked chapters.
#[derive(Debug, Clone)]
pub struct ChapterList {
    manga_title: String,
    entries: Vec<ChapterEntry>,
    selected: BTreeSet<usize>,
    filter: String,
    range: Option<(f64, f64)>,
    order: SortOrder,
}

impl ChapterList {
    pub fn new(manga_title: impl Into<String>, chapters: Vec<ChapterDescriptor>) -> Self {
        let entries = chapters
            .into_iter()
            .enumerate()
            .map(|(id, chapter)| ChapterEntry {
                id,
                number: chapter_number(&chapter.name),
                chapter,
            })
            .collect();

        ChapterList {
            manga_title: manga_title.into(),
            entries,
            selected: BTreeSet::new(),
            filter: String::new(),
            range: None,
            order: SortOrder::default(),
        }
    }

    pub fn manga_title(&self) -> &str {
        &self.manga_title
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn apply_range(&mut self, start: Option<f64>, end: Option<f64>) -> Result<(), RangeError> {
        self.range = match (start, end) {
            (None, None) => None,
            (Some(start), Some(end)) if start > end => return Err(RangeError::Inverted),
            (Some(start), Some(end)) => Some((start, end)),
            _ => return Err(RangeError::Incomplete),
        };
        Ok(())
    }

    pub fn toggle_sort(&mut self) {
        self.order = match self.order {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        };
    }

    fn matches(&self, entry: &ChapterEntry) -> bool {
        let filter = self.filter.to_lowercase();
        if !filter.is_empty() && !entry.chapter.name.to_lowercase().contains(&filter) {
            return false;
        }

        match (self.range, entry.number) {
            (None, _) => true,
            (Some((start, end)), Some(number)) => number >= start && number <= end,
            (Some(_), None) => false,
        }
    }

    fn compare(&self, a: &ChapterEntry, b: &ChapterEntry) -> Ordering {
        match (a.number, b.number) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => match self.order {
                SortOrder::Ascending => x.total_cmp(&y),
                SortOrder::Descending => y.total_cmp(&x),
            },
        }
    }

    /// Chapters passing the search and range filters, in display order.
    pub fn visible(&self) -> Vec<&ChapterEntry> {
        let mut visible: Vec<&ChapterEntry> =
            self.entries.iter().filter(|e| self.matches(e)).collect();
        visible.sort_by(|a, b| self.compare(a, b));
        visible
    }

    pub fn toggle(&mut self, id: usize) {
        if !self.selected.remove(&id) && id < self.entries.len() {
            self.selected.insert(id);
        }
    }

    pub fn is_selected(&self, id: usize) -> bool {
        self.selected.contains(&id)
    }

    pub fn select_visible(&mut self) {
        let ids: Vec<usize> = self.visible().iter().map(|e| e.id).collect();
        self.selected.extend(ids);
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// The checked chapters in page order, or `None` when nothing is checked.
    pub fn to_selection(&self) -> Option<ChapterSelection> {
        if self.selected.is_empty() {
            return None;
        }

        let chapters = self
            .entries
            .iter()
            .filter(|e| self.selected.contains(&e.id))
            .map(|e| e.chapter.clone())
            .collect();

        Some(ChapterSelection {
            manga_title: self.manga_title.clone(),
            chapters,
        })
    }
}
