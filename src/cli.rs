//! Run configuration.
//!
//! The job is meant to be launched by a scheduler with no arguments: every
//! setting has a built-in default and can be overridden through its
//! environment variable. Flags exist for ad-hoc runs only.

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for a single pipeline run.
///
/// # Examples
///
/// ```sh
/// # Scheduled run
/// links_podcast
///
/// # Faster voice, public URL from the environment
/// TTS_RATE=+10% PODCAST_PUBLIC_URL=https://me.github.io/podcast links_podcast
///
/// # Back-fill a missed day
/// LINKS_DATE=2025-02-21 links_podcast
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Front page of the site that publishes the daily Links post
    #[arg(long, env = "LINKS_SOURCE_URL", default_value = "https://www.nakedcapitalism.com/")]
    pub source_url: String,

    /// Public base address the docs directory is served from (no trailing slash needed)
    #[arg(long, env = "PODCAST_PUBLIC_URL", default_value = "https://connie817954.github.io/nakedcap-podcast")]
    pub public_url: String,

    #[arg(long, env = "PODCAST_TITLE", default_value = "Naked Capitalism Daily Links")]
    pub podcast_title: String,

    #[arg(long, env = "PODCAST_DESCRIPTION", default_value = "Daily Links from nakedcapitalism.com, converted to audio.")]
    pub podcast_description: String,

    #[arg(long, env = "PODCAST_AUTHOR", default_value = "Naked Capitalism (TTS)")]
    pub podcast_author: String,

    #[arg(long, env = "PODCAST_EMAIL", default_value = "you@example.com")]
    pub podcast_email: String,

    #[arg(long, env = "PODCAST_LANGUAGE", default_value = "en-us")]
    pub podcast_language: String,

    /// edge-tts voice name
    #[arg(long, env = "TTS_VOICE", default_value = "en-US-AriaNeural")]
    pub tts_voice: String,

    /// edge-tts speaking rate, e.g. "+10%" to speed up
    #[arg(long, env = "TTS_RATE", default_value = "+0%", allow_hyphen_values = true)]
    pub tts_rate: String,

    /// Retries per synthesis call after the first attempt
    #[arg(long, env = "TTS_RETRIES", default_value_t = 2)]
    pub tts_retries: usize,

    /// Maximum number of articles per episode
    #[arg(long, env = "MAX_ARTICLES", default_value_t = 20)]
    pub max_articles: usize,

    /// Articles with less extracted text than this (characters) are skipped
    #[arg(long, env = "MIN_TEXT_LENGTH", default_value_t = 200)]
    pub min_text_length: usize,

    /// Article bodies are cut to this many characters before narration
    #[arg(long, env = "MAX_NARRATION_CHARS", default_value_t = 8000)]
    pub max_narration_chars: usize,

    /// Silence between audio pieces, in milliseconds
    #[arg(long, env = "SILENCE_GAP_MS", default_value_t = 2000)]
    pub silence_gap_ms: u64,

    /// Timeout for each HTTP request, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    /// Timeout for each edge-tts / ffmpeg invocation, in seconds
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 600)]
    pub tool_timeout_secs: u64,

    /// Articles fetched and narrated concurrently
    #[arg(long, env = "PARALLELISM", default_value_t = 4)]
    pub parallelism: usize,

    /// Domains never treated as articles, besides the source site itself
    #[arg(long, env = "EXCLUDED_DOMAINS", value_delimiter = ',', default_value = "twitter.com,x.com,facebook.com")]
    pub excluded_domains: Vec<String>,

    /// Directory served as the podcast site (feed.xml and audio/)
    #[arg(long, env = "DOCS_DIR", default_value = "docs")]
    pub docs_dir: PathBuf,

    /// JSON file recording published episodes
    #[arg(long, env = "STATE_FILE", default_value = "state.json")]
    pub state_file: PathBuf,

    /// Where each run creates (and afterwards removes) its own scratch directory
    #[arg(long, env = "WORK_DIR", default_value = "tmp_chapters")]
    pub work_dir: PathBuf,

    #[arg(long, env = "EDGE_TTS_BIN", default_value = "edge-tts")]
    pub edge_tts_bin: String,

    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg_bin: String,

    #[arg(long, env = "FFPROBE_BIN", default_value = "ffprobe")]
    pub ffprobe_bin: String,

    /// Episode date (YYYY-MM-DD); defaults to today in local time
    #[arg(long, env = "LINKS_DATE")]
    pub date: Option<NaiveDate>,
}

impl Cli {
    pub fn run_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.docs_dir.join("audio")
    }

    pub fn feed_path(&self) -> PathBuf {
        self.docs_dir.join("feed.xml")
    }

    pub fn silence_gap(&self) -> Duration {
        Duration::from_millis(self.silence_gap_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_uses_defaults() {
        let cli = Cli::parse_from(["links_podcast"]);

        assert_eq!(cli.max_articles, 20);
        assert_eq!(cli.min_text_length, 200);
        assert_eq!(cli.silence_gap(), Duration::from_secs(2));
        assert_eq!(cli.tts_rate, "+0%");
        assert_eq!(cli.feed_path(), PathBuf::from("docs/feed.xml"));
        assert_eq!(cli.audio_dir(), PathBuf::from("docs/audio"));
        assert_eq!(cli.excluded_domains, vec!["twitter.com", "x.com", "facebook.com"]);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "links_podcast",
            "--tts-rate",
            "-10%",
            "--date",
            "2025-02-21",
            "--excluded-domains",
            "bsky.app,youtube.com",
        ]);

        assert_eq!(cli.tts_rate, "-10%");
        assert_eq!(cli.run_date(), NaiveDate::from_ymd_opt(2025, 2, 21).unwrap());
        assert_eq!(cli.excluded_domains, vec!["bsky.app", "youtube.com"]);
    }
}
