//! Podcast feed generation and episode publishing.
//!
//! The feed is RSS 2.0 with the iTunes namespace, regenerated in full from
//! the episode history on every publish. Items are ordered newest first by
//! episode date.

use crate::error::{PipelineError, Result};
use crate::models::{Chapter, EpisodeRecord};
use crate::utils::{format_hms, write_atomic};
use chrono::{NaiveDate, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, instrument};

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const EPISODE_PREFIX: &str = "nc-links";

/// Channel-level feed metadata.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub title: String,
    pub description: String,
    pub author: String,
    pub email: String,
    pub language: String,
    /// Web page the podcast is about (the source site).
    pub site_link: String,
    /// Public base address the `docs` directory is served from.
    pub public_url: String,
}

impl ChannelInfo {
    fn public_base(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

/// What the pipeline knows about a new episode before it is published.
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub date: NaiveDate,
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub duration: Duration,
}

/// Writes audio into the served directory and regenerates the feed.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    audio_dir: PathBuf,
    feed_path: PathBuf,
    channel: ChannelInfo,
}

impl FeedPublisher {
    pub fn new(audio_dir: PathBuf, feed_path: PathBuf, channel: ChannelInfo) -> Self {
        Self {
            audio_dir,
            feed_path,
            channel,
        }
    }

    /// Deterministic audio file name for a date.
    pub fn episode_filename(date: NaiveDate) -> String {
        format!("{EPISODE_PREFIX}-{date}.mp3")
    }

    pub fn episode_guid(date: NaiveDate) -> String {
        format!("{EPISODE_PREFIX}-{date}")
    }

    /// Hidden path inside the audio directory where the encoder writes, so
    /// the final move is a same-filesystem rename.
    pub fn staging_path(&self, date: NaiveDate) -> PathBuf {
        self.audio_dir
            .join(format!(".{}.partial", Self::episode_filename(date)))
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn audio_url(&self, file: &str) -> String {
        format!("{}/audio/{}", self.channel.public_base(), file)
    }

    /// Move the staged audio into place and regenerate the feed from
    /// `history` plus the new episode.
    ///
    /// If the feed cannot be written, the just-published audio file is
    /// removed again so nothing half-published stays behind.
    #[instrument(level = "info", skip_all, fields(date = %draft.date))]
    pub async fn publish<'a>(
        &self,
        history: impl IntoIterator<Item = &'a EpisodeRecord>,
        staged: &Path,
        draft: EpisodeDraft,
    ) -> Result<EpisodeRecord> {
        let audio_file = Self::episode_filename(draft.date);
        let final_path = self.audio_dir.join(&audio_file);
        fs::create_dir_all(&self.audio_dir).await?;
        fs::rename(staged, &final_path).await.map_err(|e| {
            PipelineError::Publish(format!("cannot move audio to {}: {e}", final_path.display()))
        })?;
        let file_size = fs::metadata(&final_path).await?.len();
        info!(path = %final_path.display(), bytes = file_size, "Placed episode audio");

        let record = EpisodeRecord {
            date: draft.date,
            guid: Self::episode_guid(draft.date),
            description: episode_description(&draft.chapters),
            title: draft.title,
            audio_url: self.audio_url(&audio_file),
            audio_file,
            file_size,
            duration_ms: draft.duration.as_millis() as u64,
            chapters: draft.chapters,
            published_at: Utc::now(),
        };

        let mut episodes: Vec<EpisodeRecord> = history
            .into_iter()
            .filter(|e| e.date != record.date)
            .cloned()
            .collect();
        episodes.push(record.clone());

        if let Err(e) = self.write_feed(&episodes).await {
            error!(error = %e, "Feed write failed; withdrawing episode audio");
            let _ = fs::remove_file(&final_path).await;
            return Err(e);
        }
        Ok(record)
    }

    /// Render and atomically write the feed for `episodes`.
    pub async fn write_feed(&self, episodes: &[EpisodeRecord]) -> Result<()> {
        let mut sorted: Vec<&EpisodeRecord> = episodes.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));

        let mut items = Vec::with_capacity(sorted.len());
        for record in sorted {
            items.push((record, self.enclosure_length(record).await));
        }

        let xml = render_feed(&self.channel, &items)
            .map_err(|e| PipelineError::Publish(format!("cannot render feed: {e}")))?;
        write_atomic(&self.feed_path, xml.as_bytes())
            .await
            .map_err(|e| {
                PipelineError::Publish(format!("cannot write {}: {e}", self.feed_path.display()))
            })?;
        info!(path = %self.feed_path.display(), items = items.len(), "Wrote feed");
        Ok(())
    }

    /// Byte size of the episode's file as it is on disk now, falling back to
    /// the size recorded at publish time.
    async fn enclosure_length(&self, record: &EpisodeRecord) -> u64 {
        fs::metadata(self.audio_dir.join(&record.audio_file))
            .await
            .map(|m| m.len())
            .unwrap_or(record.file_size)
    }
}

/// Human-readable chapter list used as the item description.
pub fn episode_description(chapters: &[Chapter]) -> String {
    let mut out = format!(
        "Daily Links, {} article{}.",
        chapters.len(),
        if chapters.len() == 1 { "" } else { "s" }
    );
    for chapter in chapters {
        let _ = write!(
            out,
            "\n{} {} ({})",
            format_hms(Duration::from_millis(chapter.start_ms)),
            chapter.title,
            chapter.source_url
        );
    }
    out
}

fn write_text_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> std::result::Result<(), Box<dyn Error>> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render the feed document. `items` must already be in feed order, each
/// paired with its enclosure length in bytes.
pub fn render_feed(
    channel: &ChannelInfo,
    items: &[(&EpisodeRecord, u64)],
) -> std::result::Result<String, Box<dyn Error>> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    w.write_event(Event::Start(rss))?;
    w.write_event(Event::Start(BytesStart::new("channel")))?;

    write_text_element(&mut w, "title", &channel.title)?;
    write_text_element(&mut w, "link", &channel.site_link)?;
    write_text_element(&mut w, "description", &channel.description)?;
    write_text_element(&mut w, "language", &channel.language)?;
    write_text_element(&mut w, "itunes:author", &channel.author)?;

    w.write_event(Event::Start(BytesStart::new("itunes:owner")))?;
    write_text_element(&mut w, "itunes:name", &channel.author)?;
    write_text_element(&mut w, "itunes:email", &channel.email)?;
    w.write_event(Event::End(BytesEnd::new("itunes:owner")))?;

    let mut category = BytesStart::new("itunes:category");
    category.push_attribute(("text", "News"));
    w.write_event(Event::Empty(category))?;
    write_text_element(&mut w, "itunes:explicit", "false")?;

    let cover = format!("{}/cover.jpg", channel.public_base());
    let mut itunes_image = BytesStart::new("itunes:image");
    itunes_image.push_attribute(("href", cover.as_str()));
    w.write_event(Event::Empty(itunes_image))?;
    w.write_event(Event::Start(BytesStart::new("image")))?;
    write_text_element(&mut w, "url", &cover)?;
    write_text_element(&mut w, "title", &channel.title)?;
    write_text_element(&mut w, "link", &channel.site_link)?;
    w.write_event(Event::End(BytesEnd::new("image")))?;

    for (record, length) in items {
        w.write_event(Event::Start(BytesStart::new("item")))?;
        write_text_element(&mut w, "title", &record.title)?;
        write_text_element(&mut w, "description", &record.description)?;

        let length = length.to_string();
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", record.audio_url.as_str()));
        enclosure.push_attribute(("length", length.as_str()));
        enclosure.push_attribute(("type", "audio/mpeg"));
        w.write_event(Event::Empty(enclosure))?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        w.write_event(Event::Start(guid))?;
        w.write_event(Event::Text(BytesText::new(&record.guid)))?;
        w.write_event(Event::End(BytesEnd::new("guid")))?;

        write_text_element(&mut w, "pubDate", &record.published_at.to_rfc2822())?;
        write_text_element(&mut w, "itunes:duration", &format_hms(record.duration()))?;
        write_text_element(&mut w, "itunes:explicit", "false")?;
        w.write_event(Event::End(BytesEnd::new("item")))?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))?;
    w.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut xml = String::from_utf8(w.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn channel() -> ChannelInfo {
        ChannelInfo {
            title: "Naked Capitalism Daily Links".to_string(),
            description: "Daily Links, read aloud.".to_string(),
            author: "Naked Capitalism (TTS)".to_string(),
            email: "you@example.com".to_string(),
            language: "en-us".to_string(),
            site_link: "https://www.nakedcapitalism.com/".to_string(),
            public_url: "https://example.github.io/podcast/".to_string(),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter {
                title: "Ports & Tariffs".to_string(),
                start_ms: 0,
                source_url: "https://a.example/1".to_string(),
            },
            Chapter {
                title: "Second".to_string(),
                start_ms: 65_000,
                source_url: "https://b.example/2".to_string(),
            },
        ]
    }

    fn record(d: u32, file_size: u64) -> EpisodeRecord {
        let day = date(d);
        EpisodeRecord {
            date: day,
            guid: FeedPublisher::episode_guid(day),
            title: format!("Links 2/{d}/2025"),
            description: episode_description(&chapters()),
            audio_file: FeedPublisher::episode_filename(day),
            audio_url: format!("https://example.github.io/podcast/audio/nc-links-{day}.mp3"),
            file_size,
            duration_ms: 3_723_000,
            chapters: chapters(),
            published_at: Utc.with_ymd_and_hms(2025, 2, d, 11, 30, 0).unwrap(),
        }
    }

    fn publisher(root: &Path) -> FeedPublisher {
        FeedPublisher::new(root.join("audio"), root.join("feed.xml"), channel())
    }

    #[test]
    fn test_names_are_date_derived() {
        assert_eq!(FeedPublisher::episode_filename(date(21)), "nc-links-2025-02-21.mp3");
        assert_eq!(FeedPublisher::episode_guid(date(21)), "nc-links-2025-02-21");
        let p = publisher(Path::new("/srv/docs"));
        assert_eq!(
            p.staging_path(date(21)),
            PathBuf::from("/srv/docs/audio/.nc-links-2025-02-21.mp3.partial")
        );
        assert_eq!(
            p.audio_url("x.mp3"),
            "https://example.github.io/podcast/audio/x.mp3"
        );
    }

    #[test]
    fn test_episode_description() {
        let d = episode_description(&chapters());
        assert_eq!(
            d,
            "Daily Links, 2 articles.\n00:00:00 Ports & Tariffs (https://a.example/1)\n00:01:05 Second (https://b.example/2)"
        );
        assert_eq!(episode_description(&chapters()[..1]).lines().next(), Some("Daily Links, 1 article."));
    }

    #[test]
    fn test_render_feed_item_fields() {
        let r = record(21, 4242);
        let xml = render_feed(&channel(), &[(&r, 4242)]).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(&format!("xmlns:itunes=\"{ITUNES_NS}\"")));
        assert!(xml.contains("<title>Naked Capitalism Daily Links</title>"));
        assert!(xml.contains("<itunes:category text=\"News\"/>"));
        assert!(xml.contains("<itunes:image href=\"https://example.github.io/podcast/cover.jpg\"/>"));
        assert!(xml.contains(
            "<enclosure url=\"https://example.github.io/podcast/audio/nc-links-2025-02-21.mp3\" length=\"4242\" type=\"audio/mpeg\"/>"
        ));
        assert!(xml.contains("<guid isPermaLink=\"false\">nc-links-2025-02-21</guid>"));
        assert!(xml.contains("<pubDate>Fri, 21 Feb 2025 11:30:00 +0000</pubDate>"));
        assert!(xml.contains("<itunes:duration>01:02:03</itunes:duration>"));
        assert!(xml.contains("Ports &amp; Tariffs"));
    }

    #[tokio::test]
    async fn test_publish_moves_audio_and_lists_history_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let p = publisher(dir.path());
        std::fs::create_dir_all(p.audio_dir()).unwrap();

        // Two earlier episodes already on disk.
        let history = vec![record(19, 1), record(20, 1)];
        for r in &history {
            std::fs::write(p.audio_dir().join(&r.audio_file), vec![0u8; 300]).unwrap();
        }

        let staged = p.staging_path(date(21));
        std::fs::write(&staged, vec![7u8; 1234]).unwrap();
        let draft = EpisodeDraft {
            date: date(21),
            title: "Links 2/21/2025".to_string(),
            chapters: chapters(),
            duration: Duration::from_secs(125),
        };

        let published = p.publish(&history, &staged, draft).await.unwrap();
        assert!(!staged.exists());
        let final_path = p.audio_dir().join("nc-links-2025-02-21.mp3");
        assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 1234);
        assert_eq!(published.file_size, 1234);
        assert_eq!(published.duration_ms, 125_000);
        assert_eq!(published.guid, "nc-links-2025-02-21");
        assert_eq!(
            published.audio_url,
            "https://example.github.io/podcast/audio/nc-links-2025-02-21.mp3"
        );

        let xml = std::fs::read_to_string(dir.path().join("feed.xml")).unwrap();
        assert_eq!(xml.matches("<item>").count(), 3);
        for d in [19, 20, 21] {
            assert_eq!(xml.matches(&format!("<guid isPermaLink=\"false\">nc-links-2025-02-{d}</guid>")).count(), 1);
        }
        let i21 = xml.find("nc-links-2025-02-21</guid>").unwrap();
        let i20 = xml.find("nc-links-2025-02-20</guid>").unwrap();
        let i19 = xml.find("nc-links-2025-02-19</guid>").unwrap();
        assert!(i21 < i20 && i20 < i19);

        // Enclosure lengths come from the files on disk, not the records.
        assert!(xml.contains("nc-links-2025-02-21.mp3\" length=\"1234\""));
        assert!(xml.contains("nc-links-2025-02-20.mp3\" length=\"300\""));
    }

    #[tokio::test]
    async fn test_enclosure_length_falls_back_to_record() {
        let dir = tempfile::tempdir().unwrap();
        let p = publisher(dir.path());
        p.write_feed(&[record(20, 999)]).await.unwrap();
        let xml = std::fs::read_to_string(dir.path().join("feed.xml")).unwrap();
        assert!(xml.contains("length=\"999\""));
    }

    #[tokio::test]
    async fn test_feed_failure_withdraws_audio() {
        let dir = tempfile::tempdir().unwrap();
        let p = publisher(dir.path());
        std::fs::create_dir_all(p.audio_dir()).unwrap();
        // A non-empty directory in place of the feed file cannot be replaced.
        std::fs::create_dir_all(dir.path().join("feed.xml").join("blocker")).unwrap();

        let staged = p.staging_path(date(21));
        std::fs::write(&staged, b"mp3").unwrap();
        let draft = EpisodeDraft {
            date: date(21),
            title: "Links 2/21/2025".to_string(),
            chapters: chapters(),
            duration: Duration::from_secs(1),
        };

        let history: Vec<EpisodeRecord> = Vec::new();
        let err = p.publish(&history, &staged, draft).await.unwrap_err();
        assert!(matches!(err, PipelineError::Publish(_)));
        assert!(!p.audio_dir().join("nc-links-2025-02-21.mp3").exists());
    }
}
