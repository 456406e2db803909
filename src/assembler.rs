//! Episode assembly: laying out segments and gaps, then encoding one MP3.
//!
//! The layout is computed by [`plan_episode`] independently of any audio
//! tool, so chapter offsets follow directly from the segment durations:
//!
//! ```text
//! intro₁ ─gap─ body₁ ─gap─ intro₂ ─gap─ body₂ ─gap─ … ─gap─ bodyₙ
//! ```
//!
//! With N articles there are 2N pieces and 2N−1 gaps. A chapter starts at its
//! intro, i.e. after everything before it, including the gap preceding it.

use crate::models::{Chapter, NarratedArticle};
use crate::tools::{self, ToolError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{info, instrument};

/// One entry in the concatenation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Segment(PathBuf),
    Silence,
}

/// The full episode layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePlan {
    pub pieces: Vec<Piece>,
    pub chapters: Vec<Chapter>,
    pub gap: Duration,
    pub total: Duration,
}

impl EpisodePlan {
    pub fn gap_count(&self) -> usize {
        self.pieces.iter().filter(|p| **p == Piece::Silence).count()
    }
}

/// Lay out narrated articles in order with a `gap` between adjacent pieces.
pub fn plan_episode(articles: &[NarratedArticle], gap: Duration) -> EpisodePlan {
    let mut pieces = Vec::with_capacity(articles.len() * 4);
    let mut chapters = Vec::with_capacity(articles.len());
    let mut cursor = Duration::ZERO;

    for article in articles {
        for (i, segment) in [&article.intro, &article.body].into_iter().enumerate() {
            if !pieces.is_empty() {
                pieces.push(Piece::Silence);
                cursor += gap;
            }
            if i == 0 {
                chapters.push(Chapter {
                    title: article.link.title.clone(),
                    start_ms: cursor.as_millis() as u64,
                    source_url: article.link.url.clone(),
                });
            }
            pieces.push(Piece::Segment(segment.path.clone()));
            cursor += segment.duration;
        }
    }

    EpisodePlan {
        pieces,
        chapters,
        gap,
        total: cursor,
    }
}

/// Something that can render an [`EpisodePlan`] to a single audio file.
///
/// The plan already fixes the order of pieces and every chapter offset; an
/// encoder only has to realize it.
pub trait AudioEncoder {
    /// Encode `plan` into one MP3 with embedded chapters.
    ///
    /// # Arguments
    ///
    /// * `plan` - Pieces in playback order plus the chapter list
    /// * `work_dir` - Scratch directory for intermediate files (silence, lists)
    /// * `title` - Episode title written into the file's metadata
    /// * `output` - Destination file, overwritten if present
    ///
    /// # Returns
    ///
    /// The playing time of the produced file.
    async fn encode(
        &self,
        plan: &EpisodePlan,
        work_dir: &Path,
        title: &str,
        output: &Path,
    ) -> Result<Duration, ToolError>;
}

/// `ffmpeg`/`ffprobe` based encoder.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    timeout: Duration,
    bitrate: String,
}

impl Ffmpeg {
    pub fn new(ffmpeg_bin: String, ffprobe_bin: String, timeout: Duration) -> Self {
        Self {
            ffmpeg_bin,
            ffprobe_bin,
            timeout,
            bitrate: "64k".to_string(),
        }
    }

    /// Playing time of an audio file as reported by `ffprobe`.
    pub async fn probe_duration(&self, path: &Path) -> Result<Duration, Box<dyn std::error::Error>> {
        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);
        let output = tools::run(cmd, self.timeout).await?;
        let secs: f64 = String::from_utf8_lossy(&output.stdout).trim().parse()?;
        Ok(Duration::try_from_secs_f64(secs)?)
    }

    async fn render_silence(&self, gap: Duration, path: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-y", "-f", "lavfi", "-i", "anullsrc=r=24000:cl=mono", "-t"])
            .arg(format!("{:.3}", gap.as_secs_f64()))
            .args(["-c:a", "libmp3lame", "-b:a", self.bitrate.as_str()])
            .arg(path);
        tools::run(cmd, self.timeout).await.map(|_| ())
    }
}

impl AudioEncoder for Ffmpeg {
    #[instrument(level = "info", skip_all, fields(output = %output.display(), pieces = plan.pieces.len()))]
    async fn encode(
        &self,
        plan: &EpisodePlan,
        work_dir: &Path,
        title: &str,
        output: &Path,
    ) -> Result<Duration, ToolError> {
        let io_err = |source: std::io::Error| ToolError::Spawn {
            program: self.ffmpeg_bin.clone(),
            source,
        };

        let silence = work_dir.join("silence.mp3");
        if plan.gap_count() > 0 {
            self.render_silence(plan.gap, &silence).await?;
        }

        let list_path = work_dir.join("concat.txt");
        fs::write(&list_path, concat_list(plan, &silence))
            .await
            .map_err(io_err)?;
        let meta_path = work_dir.join("chapters.txt");
        fs::write(&meta_path, ffmetadata(plan, title))
            .await
            .map_err(io_err)?;

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .arg("-i")
            .arg(&meta_path)
            .args(["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"])
            .args(["-c:a", "libmp3lame", "-b:a", self.bitrate.as_str()])
            .args(["-id3v2_version", "3", "-f", "mp3"])
            .arg(output);
        tools::run(cmd, self.timeout).await?;

        let duration = match self.probe_duration(output).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Could not probe episode; using planned duration");
                plan.total
            }
        };
        info!(
            planned_ms = plan.total.as_millis() as u64,
            actual_ms = duration.as_millis() as u64,
            "Encoded episode"
        );
        Ok(duration)
    }
}

/// The concat demuxer script listing every piece in order.
pub fn concat_list(plan: &EpisodePlan, silence: &Path) -> String {
    let mut out = String::new();
    for piece in &plan.pieces {
        let path = match piece {
            Piece::Segment(p) => p.as_path(),
            Piece::Silence => silence,
        };
        let quoted = path.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(out, "file '{quoted}'");
    }
    out
}

/// An FFMETADATA1 document carrying the episode title and chapters.
pub fn ffmetadata(plan: &EpisodePlan, title: &str) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    let _ = writeln!(out, "title={}", escape_meta(title));
    let total_ms = plan.total.as_millis() as u64;
    for (i, chapter) in plan.chapters.iter().enumerate() {
        let end = plan
            .chapters
            .get(i + 1)
            .map(|next| next.start_ms)
            .unwrap_or(total_ms);
        let _ = write!(
            out,
            "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
            chapter.start_ms,
            end,
            escape_meta(&chapter.title)
        );
    }
    out
}

fn escape_meta(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleLink, AudioSegment};

    fn article(n: usize, intro_ms: u64, body_ms: u64) -> NarratedArticle {
        NarratedArticle {
            link: ArticleLink {
                url: format!("https://example.org/{n}"),
                title: format!("Article {n}"),
                blurb: String::new(),
            },
            intro: AudioSegment {
                path: PathBuf::from(format!("intro_{n:02}.mp3")),
                duration: Duration::from_millis(intro_ms),
            },
            body: AudioSegment {
                path: PathBuf::from(format!("body_{n:02}.mp3")),
                duration: Duration::from_millis(body_ms),
            },
        }
    }

    #[test]
    fn test_plan_single_article() {
        let plan = plan_episode(&[article(1, 3_000, 60_000)], Duration::from_secs(2));
        assert_eq!(plan.gap_count(), 1);
        assert_eq!(plan.chapters.len(), 1);
        assert_eq!(plan.chapters[0].start_ms, 0);
        assert_eq!(plan.total, Duration::from_millis(65_000));
        assert_eq!(
            plan.pieces,
            vec![
                Piece::Segment(PathBuf::from("intro_01.mp3")),
                Piece::Silence,
                Piece::Segment(PathBuf::from("body_01.mp3")),
            ]
        );
    }

    #[test]
    fn test_plan_gap_invariant_and_offsets() {
        let gap = Duration::from_millis(2_000);
        let articles = vec![
            article(1, 3_000, 60_000),
            article(2, 4_000, 30_500),
            article(3, 2_500, 10_000),
        ];
        let plan = plan_episode(&articles, gap);

        assert_eq!(plan.pieces.len(), 2 * 3 + (2 * 3 - 1));
        assert_eq!(plan.gap_count(), 5);

        // Each chapter starts after every preceding segment and gap.
        let starts: Vec<u64> = plan.chapters.iter().map(|c| c.start_ms).collect();
        assert_eq!(starts, vec![0, 3_000 + 2_000 + 60_000 + 2_000, 67_000 + 4_000 + 2_000 + 30_500 + 2_000]);

        let segments: u64 = articles
            .iter()
            .map(|a| (a.intro.duration + a.body.duration).as_millis() as u64)
            .sum();
        assert_eq!(plan.total.as_millis() as u64, segments + 5 * 2_000);
    }

    #[test]
    fn test_plan_preserves_order() {
        let articles: Vec<_> = (1..=4).map(|n| article(n, 1_000, 1_000)).collect();
        let plan = plan_episode(&articles, Duration::from_secs(1));
        let urls: Vec<_> = plan.chapters.iter().map(|c| c.source_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/1",
                "https://example.org/2",
                "https://example.org/3",
                "https://example.org/4",
            ]
        );
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let mut a = article(1, 1_000, 1_000);
        a.body.path = PathBuf::from("/tmp/it's here.mp3");
        let plan = plan_episode(&[a], Duration::from_secs(1));
        let list = concat_list(&plan, Path::new("/tmp/silence.mp3"));
        assert_eq!(
            list,
            "file 'intro_01.mp3'\nfile '/tmp/silence.mp3'\nfile '/tmp/it'\\''s here.mp3'\n"
        );
    }

    #[test]
    fn test_ffmetadata_chapters() {
        let plan = plan_episode(
            &[article(1, 1_000, 2_000), article(2, 1_000, 2_000)],
            Duration::from_secs(1),
        );
        let meta = ffmetadata(&plan, "Links 2/21/2025; a=b");
        assert!(meta.starts_with(";FFMETADATA1\ntitle=Links 2/21/2025\\; a\\=b\n"));
        assert!(meta.contains("[CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=5000\ntitle=Article 1\n"));
        assert!(meta.contains("START=5000\nEND=9000\ntitle=Article 2\n"));
    }
}
