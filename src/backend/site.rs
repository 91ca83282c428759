use std::future::Future;
use std::time::Duration;

use reqwest::Url;

use super::error::{Error, Result};

pub const DEFAULT_HOST: &str = "manga.detectiveconanar.com";
pub const DEFAULT_SERIES_PATH: &str = "/manga/";

/// Where chapter pages and images are read from.
pub trait PageSource: Send + Sync {
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// The host and path prefix a series page must live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub host: String,
    pub series_path: String,
}

impl Default for Site {
    fn default() -> Self {
        Site {
            host: DEFAULT_HOST.to_string(),
            series_path: DEFAULT_SERIES_PATH.to_string(),
        }
    }
}

impl Site {
    pub fn is_series_url(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|url| {
                url.host_str() == Some(self.host.as_str())
                    && url.path().starts_with(&self.series_path)
            })
            .unwrap_or(false)
    }
}

/// The page a download sequence is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetContext {
    Open { url: String },
    Closed,
}

impl TargetContext {
    pub fn is_valid_for(&self, site: &Site) -> bool {
        match self {
            TargetContext::Open { url } => site.is_series_url(url),
            TargetContext::Closed => false,
        }
    }
}

pub fn resolve_url(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| Error::Url(format!("{base}: {e}")))?;
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|e| Error::Url(format!("{href}: {e}")))
}
