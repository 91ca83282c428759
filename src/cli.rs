use clap::Parser;
use std::path::PathBuf;

use crate::backend::config::Settings;

/// Download Detective Conan chapters as zip archives
#[derive(Parser, Debug)]
#[command(name = "dc-downloader", version, about)]
pub struct Cli {
    /// Series page, e.g. https://manga.detectiveconanar.com/manga/detective-conan/
    pub url: String,

    /// Skip the terminal UI and pick chapters from the flags below
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Select every chapter that passes the filters
    #[arg(long, default_value_t = false, requires = "headless")]
    pub all: bool,

    /// Only chapters whose name contains this text (case-insensitive)
    #[arg(long, requires = "headless")]
    pub filter: Option<String>,

    /// First chapter number of the range
    #[arg(long, requires_all = ["headless", "to"])]
    pub from: Option<f64>,

    /// Last chapter number of the range
    #[arg(long, requires_all = ["headless", "from"])]
    pub to: Option<f64>,

    /// Print the matching chapters and exit
    #[arg(long, default_value_t = false, requires = "headless")]
    pub list: bool,

    /// List highest chapter numbers first
    #[arg(long, default_value_t = false)]
    pub descending: bool,

    /// Directory the archives are saved under. Defaults to the download directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub chapter_delay_ms: Option<u64>,

    #[arg(long)]
    pub image_delay_ms: Option<u64>,

    /// Give up on a chapter after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Where the TUI writes its log
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the settings file.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(output) = &self.output {
            settings.output_dir = Some(output.clone());
        }
        if let Some(ms) = self.chapter_delay_ms {
            settings.chapter_delay_ms = ms;
        }
        if let Some(ms) = self.image_delay_ms {
            settings.image_delay_ms = ms;
        }
        if let Some(secs) = self.timeout_secs {
            settings.chapter_timeout_secs = secs;
        }
    }

    /// Whether the flags pick anything without an explicit `--all`.
    pub fn narrows_selection(&self) -> bool {
        self.filter.is_some() || self.from.is_some()
    }
}
