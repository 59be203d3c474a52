// src/services/fetcher.rs

//! Page fetching and content extraction.
//!
//! Last-modified targets only need a HEAD request. Content-hash targets are
//! downloaded and reduced to the text of the elements their selector matches.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{LAST_MODIFIED, USER_AGENT};
use scraper::node::Element;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Config, DetectionMode, ElementFilter, FetchedContent, Target};
use crate::utils::http;

/// External fetch-and-extract collaborator.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_and_extract(
        &self,
        target: &Target,
        user_agent: &str,
    ) -> Result<FetchedContent>;
}

/// Service fetching targets over HTTP.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(&config.crawler)?,
        })
    }

    async fn last_modified(&self, target: &Target, user_agent: &str) -> Result<FetchedContent> {
        let response = self
            .client
            .head(&target.url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&target.url, e))?;

        response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| FetchedContent::LastModified(v.trim().to_string()))
            .ok_or_else(|| AppError::extraction(&target.url, "Last-Modified header"))
    }

    async fn page_text(&self, target: &Target, user_agent: &str) -> Result<FetchedContent> {
        let bytes = self
            .client
            .get(&target.url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&target.url, e))?
            .bytes()
            .await
            .map_err(|e| AppError::fetch(&target.url, e))?;

        let html = String::from_utf8_lossy(&bytes);
        let filter = target.element_filter();
        match extract_text(&html, &filter)? {
            Some(text) => Ok(FetchedContent::Text(text)),
            None => {
                log::debug!("No element matched '{}' at {}", filter, target.url);
                Err(AppError::extraction(&target.url, filter.to_string()))
            }
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_and_extract(
        &self,
        target: &Target,
        user_agent: &str,
    ) -> Result<FetchedContent> {
        match target.mode {
            DetectionMode::ByLastModified => self.last_modified(target, user_agent).await,
            DetectionMode::ByContentHash => self.page_text(target, user_agent).await,
        }
    }
}

/// Text of every element matching `filter`, one element per line.
///
/// Only the tag goes through the CSS parser; ids and classes are compared
/// literally. Returns `None` when nothing matches.
pub fn extract_text(html: &str, filter: &ElementFilter<'_>) -> Result<Option<String>> {
    let selector = parse_selector(filter.tag)?;
    let document = Html::parse_document(html);

    let parts: Vec<String> = document
        .select(&selector)
        .filter(|el| matches_filter(el.value(), filter))
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.join("\n")))
}

fn matches_filter(element: &Element, filter: &ElementFilter<'_>) -> bool {
    if let Some(id) = filter.id
        && element.id() != Some(id)
    {
        return false;
    }
    filter
        .classes
        .iter()
        .all(|class| element.classes().any(|c| c == *class))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="news" class="box latest">
            <p>  2026.04.01 Office hours changed  </p>
          </div>
          <div class="box">Weather</div>
          <div class="box latest">Second</div>
          <div class="2col main">Two columns</div>
          <div class="md:flex w-1/2">Utility classes</div>
          <span id='a"b'>Quoted id</span>
        </body></html>
    "#;

    fn filter<'a>(tag: &'a str, id: Option<&'a str>, classes: &[&'a str]) -> ElementFilter<'a> {
        ElementFilter {
            tag,
            id,
            classes: classes.to_vec(),
        }
    }

    #[test]
    fn test_extract_by_id() {
        let text = extract_text(PAGE, &filter("div", Some("news"), &[]))
            .unwrap()
            .unwrap();
        assert_eq!(text, "2026.04.01 Office hours changed");
    }

    #[test]
    fn test_extract_by_classes_joins_lines() {
        let text = extract_text(PAGE, &filter("div", None, &["box", "latest"]))
            .unwrap()
            .unwrap();
        assert_eq!(text, "2026.04.01 Office hours changed\nSecond");
    }

    #[test]
    fn test_class_with_leading_digit() {
        let text = extract_text(PAGE, &filter("div", None, &["2col", "main"]))
            .unwrap()
            .unwrap();
        assert_eq!(text, "Two columns");
    }

    #[test]
    fn test_utility_classes_and_quoted_id() {
        let text = extract_text(PAGE, &filter("div", None, &["md:flex", "w-1/2"]))
            .unwrap()
            .unwrap();
        assert_eq!(text, "Utility classes");

        let text = extract_text(PAGE, &filter("span", Some("a\"b"), &[]))
            .unwrap()
            .unwrap();
        assert_eq!(text, "Quoted id");
    }

    #[test]
    fn test_target_fields_drive_extraction() {
        let target = Target {
            id: 1,
            url: "https://example.com".into(),
            mode: DetectionMode::ByContentHash,
            tag: "div".into(),
            tag_id: None,
            tag_class: Some("2col main".into()),
            group_key: "city".into(),
            title: None,
        };
        let text = extract_text(PAGE, &target.element_filter()).unwrap();
        assert_eq!(text.as_deref(), Some("Two columns"));
    }

    #[test]
    fn test_extract_nothing_matched() {
        assert_eq!(extract_text(PAGE, &filter("table", None, &[])).unwrap(), None);
        assert_eq!(
            extract_text(PAGE, &filter("div", None, &["missing"])).unwrap(),
            None
        );
    }

    #[test]
    fn test_invalid_tag() {
        assert!(matches!(
            extract_text(PAGE, &filter("[[invalid", None, &[])),
            Err(AppError::Selector { .. })
        ));
    }
}
