//! Loading processed transcript files.
//!
//! A file may start with a small header:
//!
//! ```text
//! Video Title: Gradient Descent Explained
//! Video URL: https://www.youtube.com/watch?v=abc123
//!
//! transcript text...
//! ```

use crate::error::{Result, SvarError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const TITLE_PREFIX: &str = "Video Title:";
const URL_PREFIX: &str = "Video URL:";

/// Cleaned transcript text for one video, with its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSource {
    /// Stable source id (the file stem when loaded from disk).
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: String,
}

impl TranscriptSource {
    /// Parse file content, splitting off the optional metadata header.
    pub fn parse(id: &str, content: &str) -> Self {
        let mut lines = content.lines();
        let first = lines.next().unwrap_or_default();

        let Some(title) = first.strip_prefix(TITLE_PREFIX) else {
            return Self {
                id: id.to_string(),
                title: None,
                url: None,
                text: content.trim().to_string(),
            };
        };

        let mut rest: Vec<&str> = lines.collect();
        let url = match rest.first().and_then(|l| l.strip_prefix(URL_PREFIX)) {
            Some(url) => {
                let url = url.trim().to_string();
                rest.remove(0);
                Some(url)
            }
            None => None,
        };

        Self {
            id: id.to_string(),
            title: non_empty(title),
            url: url.filter(|u| url::Url::parse(u).is_ok()),
            text: rest.join("\n").trim().to_string(),
        }
    }

    /// Load a transcript file; the file stem becomes the source id.
    pub fn from_file(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SvarError::MalformedInput(format!("No usable file name in {}", path.display()))
            })?;
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(id, &content))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header() {
        let content = "Video Title: Gradient Descent\nVideo URL: https://www.youtube.com/watch?v=abc\n\nWe minimise a loss.\nStep by step.";
        let source = TranscriptSource::parse("gd", content);

        assert_eq!(source.title.as_deref(), Some("Gradient Descent"));
        assert_eq!(source.url.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        assert_eq!(source.text, "We minimise a loss.\nStep by step.");
    }

    #[test]
    fn test_parse_without_header() {
        let source = TranscriptSource::parse("plain", "  just words here \n");
        assert_eq!(source.title, None);
        assert_eq!(source.url, None);
        assert_eq!(source.text, "just words here");
    }

    #[test]
    fn test_invalid_url_is_dropped() {
        let source = TranscriptSource::parse("x", "Video Title: X\nVideo URL: not a url\n\nbody");
        assert_eq!(source.title.as_deref(), Some("X"));
        assert_eq!(source.url, None);
        assert_eq!(source.text, "body");
    }

    #[test]
    fn test_from_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lecture_01.txt");
        std::fs::write(&path, "Video Title: Lecture 1\n\nHello class.").unwrap();

        let source = TranscriptSource::from_file(&path).unwrap();
        assert_eq!(source.id, "lecture_01");
        assert_eq!(source.text, "Hello class.");
    }
}
