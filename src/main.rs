//! # Links Podcast
//!
//! Turns the daily "Links" post of a news blog into a narrated podcast
//! episode: every linked article is fetched, read aloud by a neural voice,
//! and stitched into one MP3 with chapter markers. The RSS feed is then
//! regenerated from every episode produced so far.
//!
//! ## Usage
//!
//! ```sh
//! links_podcast          # all settings from the environment
//! ```
//!
//! ## Architecture
//!
//! The application is a single-run pipeline:
//! 1. **State check**: stop immediately if today's episode already exists
//! 2. **Discovery**: find today's Links post and its outbound article URLs
//! 3. **Fetching and narration**: per article, with bounded parallelism;
//!    failures skip the article, not the run
//! 4. **Assembly**: concatenate intros and bodies with silence gaps
//! 5. **Publishing**: place the MP3, rewrite the feed, then record the state
//!
//! External tools: `edge-tts` for speech, `ffmpeg`/`ffprobe` for audio.

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod assembler;
mod cli;
mod error;
mod models;
mod narration;
mod outputs;
mod pipeline;
mod scrapers;
mod state;
mod tools;
mod utils;

use assembler::Ffmpeg;
use cli::Cli;
use narration::{EdgeTts, RetryNarrator};
use outputs::feed::{ChannelInfo, FeedPublisher};
use pipeline::{Pipeline, PipelineSettings, RunOutcome};
use scrapers::article::ArticleFetcher;
use scrapers::links::LinksSite;
use state::StateStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("links_podcast starting up");

    let args = Cli::parse();
    debug!(?args, "Loaded configuration");
    let date = args.run_date();

    // Early check: the served directory must be writable before any work.
    let audio_dir = args.audio_dir();
    if let Err(e) = ensure_writable_dir(&audio_dir).await {
        error!(
            path = %audio_dir.display(),
            error = %e,
            "Audio output directory is not writable (fix perms or choose a different DOCS_DIR)"
        );
        return Err(e);
    }

    let mut state = StateStore::load(&args.state_file).await?;

    // ffmpeg resolves concat entries relative to the list file.
    let work_dir = std::path::absolute(&args.work_dir)?;

    let client = scrapers::http_client(args.fetch_timeout())?;
    let front_page = Url::parse(&args.source_url)?;
    let links = LinksSite::new(
        client.clone(),
        front_page,
        &args.excluded_domains,
        args.max_articles,
    );
    let articles = ArticleFetcher::new(client);

    let ffmpeg = Ffmpeg::new(
        args.ffmpeg_bin.clone(),
        args.ffprobe_bin.clone(),
        args.tool_timeout(),
    );
    let narrator = RetryNarrator::new(
        EdgeTts::new(
            args.edge_tts_bin.clone(),
            args.tts_voice.clone(),
            args.tts_rate.clone(),
            args.tool_timeout(),
            ffmpeg.clone(),
        ),
        args.tts_retries,
        Duration::from_secs(1),
    );

    let publisher = FeedPublisher::new(
        audio_dir,
        args.feed_path(),
        ChannelInfo {
            title: args.podcast_title.clone(),
            description: args.podcast_description.clone(),
            author: args.podcast_author.clone(),
            email: args.podcast_email.clone(),
            language: args.podcast_language.clone(),
            site_link: args.source_url.clone(),
            public_url: args.public_url.clone(),
        },
    );

    let pipeline = Pipeline::new(
        links,
        articles,
        narrator,
        ffmpeg,
        publisher,
        PipelineSettings {
            min_text_length: args.min_text_length,
            max_narration_chars: args.max_narration_chars,
            gap: args.silence_gap(),
            parallelism: args.parallelism,
            work_dir,
        },
    );

    let outcome = pipeline.run(&mut state, date).await;
    let elapsed = start_time.elapsed();
    match outcome {
        Ok(RunOutcome::AlreadyPublished(date)) => {
            info!(%date, secs = elapsed.as_secs(), "Episode already exists; nothing to do");
            Ok(())
        }
        Ok(RunOutcome::Published { record, skipped }) => {
            info!(
                %date,
                chapters = record.chapters.len(),
                skipped = skipped.len(),
                bytes = record.file_size,
                duration_secs = record.duration().as_secs(),
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                "Execution complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(%date, error = %e, secs = elapsed.as_secs(), "Run aborted; nothing recorded");
            Err(e.into())
        }
    }
}
