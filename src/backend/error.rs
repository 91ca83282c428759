use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad settings file: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid image payload: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("bad url {0}")]
    Url(String),

    #[error("not a manga page: {0}")]
    NotSeriesPage(String),

    #[error("no chapters found at {0}")]
    NoChapters(String),

    #[error("unrecognized image data from {0}")]
    UnrecognizedImage(String),

    #[error("generated archive is empty")]
    EmptyArchive,

    #[error("{0}")]
    Chapter(String),
}
