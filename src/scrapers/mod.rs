//! Scrapers for the Links post and the articles it points to.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Discovery** ([`links`]): find the day's Links post on the source site
//!    and collect its outbound article URLs in document order
//! 2. **Fetching** ([`article`]): download each article and extract its
//!    readable text
//!
//! Both phases sit behind traits ([`LinkSource`], [`ArticleSource`]) so the
//! pipeline can be driven without network access.

use crate::error::{Result, SkipReason};
use crate::models::LinksPost;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;

pub mod article;
pub mod links;

/// Browser-like user agent; some sources refuse obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Something that can locate the Links post for a given date.
pub trait LinkSource {
    /// Return the Links post for `date`, or [`PipelineError::NotFound`]
    /// when the site has none.
    ///
    /// [`PipelineError::NotFound`]: crate::error::PipelineError::NotFound
    async fn links_post(&self, date: NaiveDate) -> Result<LinksPost>;
}

/// Something that can turn an article URL into raw readable text.
pub trait ArticleSource {
    /// Fetch `url` and return its extracted text. Failures are skip reasons,
    /// never run-level errors.
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, SkipReason>;
}

/// Build the shared HTTP client. Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
}
