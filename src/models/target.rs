//! Monitored target definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How a target decides whether it changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    /// Compare the `Last-Modified` response header.
    ByLastModified,
    /// Compare a SHA3-512 digest of the extracted text.
    ByContentHash,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::ByLastModified => write!(f, "by-last-modified"),
            DetectionMode::ByContentHash => write!(f, "by-content-hash"),
        }
    }
}

impl FromStr for DetectionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "by-last-modified" | "last-modified" | "lastmodified" => Ok(Self::ByLastModified),
            "by-content-hash" | "content-hash" | "hash" => Ok(Self::ByContentHash),
            other => Err(AppError::validation(format!("unknown detection mode '{other}'"))),
        }
    }
}

/// A monitored web resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    /// Stable key
    pub id: i64,

    /// Page to watch
    pub url: String,

    /// Change detection mode
    pub mode: DetectionMode,

    /// Element name used for extraction (e.g. `div`)
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Optional `id` attribute filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,

    /// Optional whitespace-separated class filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_class: Option<String>,

    /// Logical grouping for downstream consumers
    #[serde(default)]
    pub group_key: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn default_tag() -> String {
    "body".into()
}

/// Element matching rule derived from a target's tag fields.
///
/// Ids and class names are compared as plain strings, so values that are not
/// valid CSS identifiers (`2col`, `md:flex`, `w-1/2`) still match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFilter<'a> {
    /// Element name, `*` for any
    pub tag: &'a str,
    pub id: Option<&'a str>,
    /// Every class must be present on the element
    pub classes: Vec<&'a str>,
}

impl fmt::Display for ElementFilter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(id) = self.id {
            write!(f, "[id={id:?}]")?;
        }
        for class in &self.classes {
            write!(f, "[class~={class:?}]")?;
        }
        Ok(())
    }
}

impl Target {
    /// Matching rule built from the tag/id/class fields.
    ///
    /// An id filter wins over a class filter.
    pub fn element_filter(&self) -> ElementFilter<'_> {
        let tag = match self.tag.trim() {
            "" => "*",
            tag => tag,
        };

        if let Some(id) = self.tag_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return ElementFilter {
                tag,
                id: Some(id),
                classes: Vec::new(),
            };
        }

        ElementFilter {
            tag,
            id: None,
            classes: self
                .tag_class
                .as_deref()
                .map(|c| c.split_whitespace().collect())
                .unwrap_or_default(),
        }
    }

    /// Label for log lines.
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("#{} {} ({})", self.id, title, self.url),
            None => format!("#{} {}", self.id, self.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(tag: &str, tag_id: Option<&str>, tag_class: Option<&str>) -> Target {
        Target {
            id: 1,
            url: "https://example.com".into(),
            mode: DetectionMode::ByContentHash,
            tag: tag.into(),
            tag_id: tag_id.map(Into::into),
            tag_class: tag_class.map(Into::into),
            group_key: "city".into(),
            title: None,
        }
    }

    #[test]
    fn test_element_filter_variants() {
        let plain = target("div", None, None);
        assert_eq!(plain.element_filter().tag, "div");
        assert!(plain.element_filter().classes.is_empty());

        let by_id = target("div", Some("main"), Some("ignored"));
        let filter = by_id.element_filter();
        assert_eq!(filter.id, Some("main"));
        assert!(filter.classes.is_empty());

        let by_class = target("section", None, Some("news  latest"));
        assert_eq!(by_class.element_filter().classes, vec!["news", "latest"]);

        let any = target("", None, Some("x"));
        assert_eq!(any.element_filter().tag, "*");
    }

    #[test]
    fn test_element_filter_display() {
        let t = target("div", None, Some("2col main"));
        assert_eq!(
            t.element_filter().to_string(),
            "div[class~=\"2col\"][class~=\"main\"]"
        );
        let t = target("p", Some("a\"b"), None);
        assert_eq!(t.element_filter().to_string(), "p[id=\"a\\\"b\"]");
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!(
            "by-last-modified".parse::<DetectionMode>().unwrap(),
            DetectionMode::ByLastModified
        );
        assert_eq!("HASH".parse::<DetectionMode>().unwrap(), DetectionMode::ByContentHash);
        assert!("sometimes".parse::<DetectionMode>().is_err());
        assert_eq!(DetectionMode::ByContentHash.to_string(), "by-content-hash");
    }

    #[test]
    fn test_mode_serde_is_kebab_case() {
        let json = serde_json::to_string(&DetectionMode::ByLastModified).unwrap();
        assert_eq!(json, "\"by-last-modified\"");
    }
}
