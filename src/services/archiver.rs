// src/services/archiver.rs

//! Web archive capture client.
//!
//! Talks to the Wayback Machine's Save Page Now endpoint. The archived
//! snapshot URL comes back in `Content-Location`, or as the final URL after
//! redirects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_LOCATION, USER_AGENT};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::http;

/// External archive-capture collaborator.
#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Status code of a HEAD request to the page itself.
    async fn check_status(&self, url: &str, user_agent: &str) -> Result<u16>;

    /// Ask the archive to capture `url`; returns the snapshot URL.
    async fn capture(&self, url: &str, user_agent: &str) -> Result<String>;
}

/// Save Page Now client.
#[derive(Clone)]
pub struct WaybackClient {
    client: Client,
    save_endpoint: Url,
    status_timeout: Duration,
    capture_timeout: Duration,
}

impl WaybackClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(&config.crawler)?,
            save_endpoint: Url::parse(&config.archive.save_endpoint)?,
            status_timeout: Duration::from_secs(config.archive.status_timeout_secs),
            capture_timeout: Duration::from_secs(config.archive.capture_timeout_secs),
        })
    }

    fn save_url(&self, url: &str) -> String {
        format!("{}{}", self.save_endpoint, url)
    }
}

#[async_trait]
impl ArchiveService for WaybackClient {
    async fn check_status(&self, url: &str, user_agent: &str) -> Result<u16> {
        let response = self
            .client
            .head(url)
            .header(USER_AGENT, user_agent)
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| AppError::archive(url, None, format!("status check failed: {e}")))?;
        Ok(response.status().as_u16())
    }

    async fn capture(&self, url: &str, user_agent: &str) -> Result<String> {
        let response = self
            .client
            .get(self.save_url(url))
            .header(USER_AGENT, user_agent)
            .timeout(self.capture_timeout)
            .send()
            .await
            .map_err(|e| AppError::archive(url, None, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::archive(
                url,
                Some(status.as_u16()),
                "capture request rejected",
            ));
        }

        let content_location = response
            .headers()
            .get(CONTENT_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        snapshot_url(&self.save_endpoint, content_location.as_deref(), response.url())
            .ok_or_else(|| AppError::archive(url, Some(status.as_u16()), "no snapshot URL in response"))
    }
}

/// Work out the snapshot URL from a capture response.
fn snapshot_url(endpoint: &Url, content_location: Option<&str>, final_url: &Url) -> Option<String> {
    if let Some(location) = content_location.map(str::trim).filter(|l| !l.is_empty()) {
        return endpoint.join(location).ok().map(|u| u.to_string());
    }
    if final_url.path().starts_with("/web/") {
        return Some(final_url.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://web.archive.org/save/").unwrap()
    }

    #[test]
    fn test_snapshot_from_content_location() {
        let final_url = Url::parse("https://web.archive.org/save/https://example.com").unwrap();
        assert_eq!(
            snapshot_url(
                &endpoint(),
                Some("/web/20260101000000/https://example.com/"),
                &final_url
            ),
            Some("https://web.archive.org/web/20260101000000/https://example.com/".to_string())
        );
    }

    #[test]
    fn test_snapshot_from_redirect() {
        let final_url =
            Url::parse("https://web.archive.org/web/20260101000000/https://example.com/").unwrap();
        assert_eq!(
            snapshot_url(&endpoint(), None, &final_url),
            Some(final_url.to_string())
        );
    }

    #[test]
    fn test_no_snapshot() {
        let final_url = Url::parse("https://web.archive.org/save/https://example.com").unwrap();
        assert_eq!(snapshot_url(&endpoint(), Some("  "), &final_url), None);
    }

    #[test]
    fn test_capture_outlives_fetch_timeout() {
        let mut config = Config::default();
        config.crawler.timeout_secs = 30;
        config.archive.capture_timeout_secs = 300;

        let client = WaybackClient::new(&config).unwrap();
        assert_eq!(client.capture_timeout, Duration::from_secs(300));
        assert_eq!(client.status_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_save_url() {
        let client = WaybackClient::new(&Config::default()).unwrap();
        assert_eq!(
            client.save_url("https://example.com/page?x=1"),
            "https://web.archive.org/save/https://example.com/page?x=1"
        );
    }
}
