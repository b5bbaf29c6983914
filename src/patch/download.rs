use std::{fs::File, path::Path, time::Duration};

use log::debug;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error fetching {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("Could not set up the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[cfg_attr(test, automock)]
pub trait Downloader {
    /// Writes the body of `url` to `destination`, failing on any non-2xx status.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError>;
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DownloadError::Client)?;
        Ok(HttpDownloader { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        debug!("GET {}", url);
        let http = |source| DownloadError::Http {
            url: url.to_owned(),
            source,
        };
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http)?;
        let mut file = File::create(destination)?;
        let written = response.copy_to(&mut file).map_err(http)?;
        file.sync_all()?;
        debug!("Received {} bytes from {}", written, url);
        Ok(written)
    }
}
