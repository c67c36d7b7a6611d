//! HTTP client construction, isolated from the installer's retry/atomic-write
//! logic so tests can swap in a fake without touching the network.

use std::time::Duration;

/// Fetches resource content by URL. Implemented by [`HttpDownloader`] for
/// real use and by fakes in tests.
pub trait Downloader: Send + Sync {
    /// Fetch `url`'s body, bounded by `timeout`. Any non-2xx status or
    /// transport failure is a retryable error.
    fn download(&self, url: &str, timeout: Duration) -> impl std::future::Future<Output = Result<Vec<u8>, String>> + Send;
}

/// A [`Downloader`] backed by a single shared `reqwest` client.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// A downloader using rustls and no further customization; build once
    /// and reuse across installs so connections are pooled.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to initialize http client");
        HttpDownloader { client }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        HttpDownloader::new()
    }
}

impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("unexpected HTTP status {}", response.status()));
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| e.to_string())
    }
}
