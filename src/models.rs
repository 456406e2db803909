//! Data models shared across the pipeline.
//!
//! - [`ArticleLink`] and [`LinksPost`]: what link discovery produces
//! - [`AudioSegment`] and [`NarratedArticle`]: synthesized audio per article
//! - [`Chapter`] and [`EpisodeRecord`]: the persisted result of a run
//! - [`Skipped`]: an article dropped from the episode, with its reason
//!
//! Only [`EpisodeRecord`] and [`Chapter`] are serialized; everything else
//! lives for a single run.

use crate::error::SkipReason;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// An outbound article link found in the Links post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLink {
    /// Absolute URL of the linked article.
    pub url: String,
    /// Link text, or the URL when the anchor has no text.
    pub title: String,
    /// Text of the paragraph or list item the link sits in.
    pub blurb: String,
}

impl ArticleLink {
    /// Host of the article URL without a leading `www.`.
    ///
    /// For example: `"https://www.reuters.com/world/x"` -> `"reuters.com"`
    pub fn source_host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }
}

/// The day's Links post and its candidate articles, in document order.
#[derive(Debug, Clone)]
pub struct LinksPost {
    pub date: NaiveDate,
    pub title: String,
    pub url: String,
    pub links: Vec<ArticleLink>,
}

/// A synthesized audio file and its playing time.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub path: PathBuf,
    pub duration: Duration,
}

/// An article that made it through fetching and synthesis.
#[derive(Debug, Clone)]
pub struct NarratedArticle {
    pub link: ArticleLink,
    pub intro: AudioSegment,
    pub body: AudioSegment,
}

/// An article that was dropped from the episode.
#[derive(Debug, Clone)]
pub struct Skipped {
    pub url: String,
    pub reason: SkipReason,
}

/// A chapter marker inside an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Article title as it appeared in the Links post.
    pub title: String,
    /// Offset of the chapter's intro from the start of the episode.
    pub start_ms: u64,
    /// The article the chapter narrates.
    pub source_url: String,
}

/// A published episode as persisted in the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub date: NaiveDate,
    pub guid: String,
    pub title: String,
    pub description: String,
    /// File name inside the served audio directory.
    pub audio_file: String,
    pub audio_url: String,
    /// Size in bytes at publish time.
    pub file_size: u64,
    pub duration_ms: u64,
    pub chapters: Vec<Chapter>,
    pub published_at: DateTime<Utc>,
}

impl EpisodeRecord {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str) -> ArticleLink {
        ArticleLink {
            url: url.to_string(),
            title: "t".to_string(),
            blurb: String::new(),
        }
    }

    #[test]
    fn test_source_host_strips_www() {
        assert_eq!(
            link("https://www.reuters.com/world/story").source_host(),
            Some("reuters.com".to_string())
        );
        assert_eq!(
            link("https://apnews.com/article/x").source_host(),
            Some("apnews.com".to_string())
        );
    }

    #[test]
    fn test_source_host_invalid_url() {
        assert_eq!(link("not a url").source_host(), None);
    }

    #[test]
    fn test_episode_record_json_shape() {
        let record = EpisodeRecord {
            date: NaiveDate::from_ymd_opt(2025, 2, 21).unwrap(),
            guid: "nc-links-2025-02-21".to_string(),
            title: "Links 2/21/2025".to_string(),
            description: "d".to_string(),
            audio_file: "nc-links-2025-02-21.mp3".to_string(),
            audio_url: "https://example.org/audio/nc-links-2025-02-21.mp3".to_string(),
            file_size: 1024,
            duration_ms: 61_500,
            chapters: vec![Chapter {
                title: "A".to_string(),
                start_ms: 0,
                source_url: "https://a.example/".to_string(),
            }],
            published_at: DateTime::parse_from_rfc3339("2025-02-21T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2025-02-21");
        assert_eq!(json["chapters"][0]["start_ms"], 0);
        assert_eq!(record.duration(), Duration::from_millis(61_500));

        let back: EpisodeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
