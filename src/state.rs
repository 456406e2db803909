//! Persistent record of produced episodes.
//!
//! The state file is a single JSON document keyed by date:
//!
//! ```text
//! { "episodes": { "2025-02-21": { ...EpisodeRecord... }, ... } }
//! ```
//!
//! It is read whole at the start of a run and rewritten whole, atomically,
//! when a run completes. It is the only source of truth for whether a date
//! has been processed.

use crate::error::{PipelineError, Result};
use crate::models::EpisodeRecord;
use crate::utils::write_atomic;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    episodes: BTreeMap<NaiveDate, EpisodeRecord>,
}

/// The set of episodes already published, backed by a JSON file.
///
/// The in-memory copy and the file only diverge while a write is in flight;
/// a failed write rolls the in-memory copy back.
///
/// # Example
///
/// ```ignore
/// let mut state = StateStore::load("state.json").await?;
/// if !state.has_episode(date) {
///     state.record_episode(record).await?;
/// }
/// ```
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    doc: StateDocument,
}

impl StateStore {
    /// Load the store from `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - The state file; later writes go to the same place
    ///
    /// # Returns
    ///
    /// The store, empty if the file does not exist yet. An unreadable file or
    /// one that is not a valid state document is a
    /// [`PipelineError::Persistence`] error, never silently reset.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StateDocument>(&bytes).map_err(|e| {
                PipelineError::Persistence(format!("{} is not valid state: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file yet; starting empty");
                StateDocument::default()
            }
            Err(e) => {
                return Err(PipelineError::Persistence(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        info!(episodes = doc.episodes.len(), "Loaded state");
        Ok(Self { path, doc })
    }

    /// Whether an episode for `date` has been recorded.
    pub fn has_episode(&self, date: NaiveDate) -> bool {
        self.doc.episodes.contains_key(&date)
    }

    /// All recorded episodes, oldest first.
    pub fn episodes(&self) -> impl Iterator<Item = &EpisodeRecord> {
        self.doc.episodes.values()
    }

    pub fn len(&self) -> usize {
        self.doc.episodes.len()
    }

    /// Add `record` and rewrite the state file.
    ///
    /// # Arguments
    ///
    /// * `record` - The published episode; its `date` is the key
    ///
    /// # Returns
    ///
    /// `Ok(())` once the file holds the new record. Fails with
    /// [`PipelineError::Persistence`] if the date is already recorded or the
    /// file cannot be written; in both cases the store is left as it was.
    #[instrument(level = "info", skip_all, fields(date = %record.date))]
    pub async fn record_episode(&mut self, record: EpisodeRecord) -> Result<()> {
        let date = record.date;
        if self.has_episode(date) {
            return Err(PipelineError::Persistence(format!(
                "an episode for {date} is already recorded"
            )));
        }

        self.doc.episodes.insert(date, record);
        let written = match serde_json::to_vec_pretty(&self.doc) {
            Ok(json) => write_atomic(&self.path, &json)
                .await
                .map_err(|e| format!("cannot write {}: {e}", self.path.display())),
            Err(e) => Err(format!("cannot serialize state: {e}")),
        };

        if let Err(msg) = written {
            self.doc.episodes.remove(&date);
            return Err(PipelineError::Persistence(msg));
        }
        info!(path = %self.path.display(), episodes = self.len(), "Recorded episode");
        Ok(())
    }
}
