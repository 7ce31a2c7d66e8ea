// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox HTTP Fetcher
//!
//! Streams a pack payload straight to a reserved sandbox file with bounded
//! connect/total timeouts and a redirect limit. This is deliberately not a
//! general-purpose client: one GET, one file, no retries.

use reqwest::header::USER_AGENT;
use reqwest::{redirect, Client};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::domain::config::DownloadConfig;

const FETCH_USER_AGENT: &str = concat!("packguard/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid pack URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

/// Parse a pack URL and accept only http(s).
pub fn parse_pack_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// GET `url` into `target`, truncating it. Returns the number of bytes written.
    ///
    /// Non-2xx statuses are errors; the caller owns cleanup of `target`.
    pub async fn fetch_to_file(&self, url: &Url, target: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, FETCH_USER_AGENT)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(FetchError::from_reqwest)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url = %url, bytes = written, target = %target.display(), "Pack body streamed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&DownloadConfig {
            connect_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
            ..DownloadConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_pack_url() {
        assert!(parse_pack_url("https://example.com/p.zip").is_ok());
        assert!(matches!(parse_pack_url("file:///etc/passwd"), Err(FetchError::UnsupportedScheme(_))));
        assert!(matches!(parse_pack_url("::nonsense"), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_streams_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pack.zip")
            .with_status(200)
            .with_body(vec![7u8; 4096])
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pack.zip");
        let url = Url::parse(&format!("{}/pack.zip", server.url())).unwrap();

        let written = fetcher().fetch_to_file(&url, &target).await.unwrap();
        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&target).unwrap().len(), 4096);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("GET", "/old.zip")
            .with_status(302)
            .with_header("location", "/new.zip")
            .create_async()
            .await;
        let _target = server
            .mock("GET", "/new.zip")
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("p.zip");
        let url = Url::parse(&format!("{}/old.zip", server.url())).unwrap();
        assert_eq!(fetcher().fetch_to_file(&url, &target).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let url = Url::parse(&format!("{}/missing.zip", server.url())).unwrap();
        let result = fetcher().fetch_to_file(&url, &dir.path().join("m.zip")).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }
}
