//! Text-to-speech narration with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`Narrator`]: core trait turning text into an audio segment
//! - [`EdgeTts`]: runs the `edge-tts` CLI and probes the result's duration
//! - [`RetryNarrator`]: decorator that adds retries to any [`Narrator`]
//!
//! # Retry Strategy
//!
//! - Exponential backoff from a base delay, doubling per attempt
//! - Delay capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay

use crate::assembler::Ffmpeg;
use crate::models::{ArticleLink, AudioSegment};
use crate::tools::{self, ToolError};
use crate::utils::shorten;
use rand::{Rng, rng};
use std::fmt;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Longest blurb read out in a chapter intro.
const INTRO_BLURB_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("nothing to narrate")]
    EmptyText,

    #[error("cannot stage narration files: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("could not determine duration: {0}")]
    Probe(String),
}

/// Trait for turning text into speech.
///
/// Implementors write the audio to `output` and report its duration. This
/// seam lets decorators such as [`RetryNarrator`] wrap any synthesizer, and
/// lets the pipeline run against an in-memory fake.
pub trait Narrator {
    /// Synthesize `text` into an audio file.
    ///
    /// # Arguments
    ///
    /// * `text` - The words to speak; blank text is [`SynthesisError::EmptyText`]
    /// * `output` - Where the MP3 is written; an existing file is replaced
    ///
    /// # Returns
    ///
    /// The written segment with its measured duration, or the reason synthesis
    /// failed.
    async fn narrate(&self, text: &str, output: &Path) -> Result<AudioSegment, SynthesisError>;
}

/// Build the spoken intro for an article: title, source and, when it adds
/// something, the site's commentary on the link.
pub fn chapter_intro(link: &ArticleLink) -> String {
    let mut intro = format!("{}.", link.title.trim_end_matches('.'));
    if let Some(host) = link.source_host() {
        intro.push_str(&format!(" From {host}."));
    }
    let blurb = link.blurb.trim();
    if !blurb.is_empty() && blurb != link.title {
        intro.push(' ');
        intro.push_str(&shorten(blurb, INTRO_BLURB_CHARS, "…"));
    }
    intro
}

/// Cap the article body so a single chapter stays listenable.
pub fn narration_body(text: &str, max_chars: usize) -> String {
    shorten(text, max_chars, " … end of excerpt.")
}

/// The `edge-tts` command-line synthesizer.
#[derive(Debug, Clone)]
pub struct EdgeTts {
    bin: String,
    voice: String,
    rate: String,
    timeout: StdDuration,
    probe: Ffmpeg,
}

impl EdgeTts {
    pub fn new(bin: String, voice: String, rate: String, timeout: StdDuration, probe: Ffmpeg) -> Self {
        Self {
            bin,
            voice,
            rate,
            timeout,
            probe,
        }
    }
}

impl Narrator for EdgeTts {
    #[instrument(level = "info", skip_all, fields(output = %output.display(), chars = text.len()))]
    async fn narrate(&self, text: &str, output: &Path) -> Result<AudioSegment, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let t0 = Instant::now();

        let text_file = output.with_extension("txt");
        fs::write(&text_file, text).await?;

        let mut cmd = Command::new(&self.bin);
        // The rate starts with a sign, so it must be glued to its flag.
        cmd.arg("--voice")
            .arg(&self.voice)
            .arg(format!("--rate={}", self.rate))
            .arg("--file")
            .arg(&text_file)
            .arg("--write-media")
            .arg(output);
        let result = tools::run(cmd, self.timeout).await;
        let _ = fs::remove_file(&text_file).await;
        result?;

        let duration = self
            .probe
            .probe_duration(output)
            .await
            .map_err(|e| SynthesisError::Probe(e.to_string()))?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            audio_ms = duration.as_millis() as u64,
            "Synthesized segment"
        );
        Ok(AudioSegment {
            path: output.to_path_buf(),
            duration,
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Narrator`].
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryNarrator<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryNarrator<T>
where
    T: Narrator,
{
    /// Wrap `inner`, retrying up to `max_retries` times after the first
    /// attempt.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryNarrator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryNarrator")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Narrator for RetryNarrator<T>
where
    T: Narrator,
{
    #[instrument(level = "info", skip_all)]
    async fn narrate(&self, text: &str, output: &Path) -> Result<AudioSegment, SynthesisError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.narrate(text, output).await {
                Ok(segment) => return Ok(segment),
                // Retrying cannot fix empty input.
                Err(e @ SynthesisError::EmptyText) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "narrate() exhausted retries"
                        );
                        return Err(e);
                    }

                    let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(16);
                    let mut delay = self.base_delay.saturating_mul(1 << shift);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "narrate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
