//! The episode pipeline.
//!
//! ```text
//! state check → discover links → fetch + narrate (per article, bounded
//! parallelism, input order kept) → plan + encode → publish audio + feed
//! → record state
//! ```
//!
//! Per-article failures become [`Skipped`] entries and never abort the run.
//! The state record is written last, so a run that fails anywhere before it
//! is simply repeated on the next scheduled tick.

use crate::assembler::{AudioEncoder, plan_episode};
use crate::error::{PipelineError, Result, SkipReason};
use crate::models::{ArticleLink, EpisodeRecord, LinksPost, NarratedArticle, Skipped};
use crate::narration::{Narrator, chapter_intro, narration_body};
use crate::outputs::feed::{EpisodeDraft, FeedPublisher};
use crate::scrapers::article::classify_text;
use crate::scrapers::{ArticleSource, LinkSource};
use crate::state::StateStore;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Articles with fewer extracted characters are skipped.
    pub min_text_length: usize,
    /// Article bodies are cut to this many characters before narration.
    pub max_narration_chars: usize,
    /// Silence between adjacent audio pieces.
    pub gap: Duration,
    /// Articles fetched and narrated at once.
    pub parallelism: usize,
    /// Parent of the per-run scratch directory. Only the scratch directory
    /// a run creates inside it is ever removed.
    pub work_dir: PathBuf,
}

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum RunOutcome {
    /// The date was already recorded; nothing was done.
    AlreadyPublished(NaiveDate),
    /// A new episode was published and recorded.
    Published {
        record: EpisodeRecord,
        skipped: Vec<Skipped>,
    },
}

pub struct Pipeline<L, A, N, E> {
    links: L,
    articles: A,
    narrator: N,
    encoder: E,
    publisher: FeedPublisher,
    settings: PipelineSettings,
}

impl<L, A, N, E> Pipeline<L, A, N, E>
where
    L: LinkSource,
    A: ArticleSource,
    N: Narrator,
    E: AudioEncoder,
{
    pub fn new(
        links: L,
        articles: A,
        narrator: N,
        encoder: E,
        publisher: FeedPublisher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            links,
            articles,
            narrator,
            encoder,
            publisher,
            settings,
        }
    }

    /// Produce and publish the episode for `date`, unless it already exists.
    #[instrument(level = "info", skip_all, fields(%date))]
    pub async fn run(&self, state: &mut StateStore, date: NaiveDate) -> Result<RunOutcome> {
        if state.has_episode(date) {
            info!("Episode already published; nothing to do");
            return Ok(RunOutcome::AlreadyPublished(date));
        }

        let post = self.links.links_post(date).await?;
        if post.links.is_empty() {
            warn!(post = %post.url, "Links post has no article links");
            return Err(PipelineError::NoContent(date));
        }

        let scratch = self.scratch_dir(date);
        fs::create_dir_all(&scratch).await?;
        let result = self.produce(state, &post, &scratch).await;
        if let Err(e) = fs::remove_dir_all(&scratch).await {
            warn!(error = %e, path = %scratch.display(), "Could not clean scratch directory");
        }
        result
    }

    /// Per-run scratch directory inside the configured work directory.
    fn scratch_dir(&self, date: NaiveDate) -> PathBuf {
        self.settings.work_dir.join(format!(".nc-links-{date}"))
    }

    async fn produce(
        &self,
        state: &mut StateStore,
        post: &LinksPost,
        scratch: &Path,
    ) -> Result<RunOutcome> {
        let total = post.links.len();
        info!(total, parallelism = self.settings.parallelism, "Processing articles");

        let results: Vec<std::result::Result<NarratedArticle, Skipped>> =
            stream::iter(post.links.iter().enumerate())
                .map(|(i, link)| self.prepare_article(i + 1, total, link, scratch))
                .buffered(self.settings.parallelism.max(1))
                .collect()
                .await;
        let (narrated, skipped): (Vec<_>, Vec<_>) = results.into_iter().partition_result();

        for s in &skipped {
            warn!(url = %s.url, reason = s.reason.code(), detail = %s.reason, "Skipped article");
        }
        info!(
            total,
            narrated = narrated.len(),
            skipped = skipped.len(),
            "Completed article processing"
        );
        if narrated.is_empty() {
            error!("Every article was skipped; not publishing an empty episode");
            return Err(PipelineError::NoContent(post.date));
        }

        let plan = plan_episode(&narrated, self.settings.gap);
        info!(
            chapters = plan.chapters.len(),
            gaps = plan.gap_count(),
            planned_secs = plan.total.as_secs(),
            "Planned episode"
        );

        fs::create_dir_all(self.publisher.audio_dir()).await?;
        let staged = self.publisher.staging_path(post.date);
        let duration = match self
            .encoder
            .encode(&plan, scratch, &post.title, &staged)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                return Err(PipelineError::Assembly(e.to_string()));
            }
        };

        let draft = EpisodeDraft {
            date: post.date,
            title: post.title.clone(),
            chapters: plan.chapters,
            duration,
        };
        let record = match self.publisher.publish(state.episodes(), &staged, draft).await {
            Ok(record) => record,
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                return Err(e);
            }
        };

        state.record_episode(record.clone()).await?;
        info!(guid = %record.guid, url = %record.audio_url, "Episode published");
        Ok(RunOutcome::Published { record, skipped })
    }

    /// Fetch, check and narrate one article. `index` is 1-based discovery
    /// order and names the scratch files.
    async fn prepare_article(
        &self,
        index: usize,
        total: usize,
        link: &ArticleLink,
        scratch: &Path,
    ) -> std::result::Result<NarratedArticle, Skipped> {
        let skip = |reason: SkipReason| Skipped {
            url: link.url.clone(),
            reason,
        };
        info!(index, total, title = %truncate_for_log(&link.title, 60), "Processing article");

        let text = self.articles.fetch_text(&link.url).await.map_err(skip)?;
        let text = classify_text(text, self.settings.min_text_length).map_err(skip)?;

        let intro = self
            .narrator
            .narrate(&chapter_intro(link), &scratch.join(format!("intro_{index:02}.mp3")))
            .await
            .map_err(|e| skip(SkipReason::SynthesisError(e.to_string())))?;
        let body = self
            .narrator
            .narrate(
                &narration_body(&text, self.settings.max_narration_chars),
                &scratch.join(format!("body_{index:02}.mp3")),
            )
            .await
            .map_err(|e| skip(SkipReason::SynthesisError(e.to_string())))?;

        info!(index, intro_ms = intro.duration.as_millis() as u64, body_ms = body.duration.as_millis() as u64, "Narrated article");
        Ok(NarratedArticle {
            link: link.clone(),
            intro,
            body,
        })
    }
}
