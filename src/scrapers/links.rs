//! Discovery of the daily Links post.
//!
//! The source site's front page lists recent posts under `.entry-title`
//! headings. The daily roundup is titled like `Links 2/21/2025`; its body
//! (`div.entry-content`) is a list of commented outbound links. Those links,
//! in document order, become the episode's chapters.

use super::LinkSource;
use crate::error::{PipelineError, Result};
use crate::models::{ArticleLink, LinksPost};
use crate::utils::normalize_whitespace;
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static POST_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.entry-title a[href], h1.entry-title a[href]").unwrap());
static ENTRY_CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.entry-content").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

static LINKS_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blinks\b").unwrap());
static TITLE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

/// A post heading found on the front page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub title: String,
    pub url: String,
}

/// Decides which hrefs in the post body are article links.
///
/// Rejected: relative or non-http(s) URLs, fragment-only anchors, the source
/// site itself (navigation and internal links), and any excluded domain.
/// A domain matches itself and all of its subdomains.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    site_host: String,
    excluded: Vec<String>,
}

impl LinkFilter {
    pub fn new(site: &Url, excluded: &[String]) -> Self {
        Self {
            site_host: bare_host(site.host_str().unwrap_or_default()),
            excluded: excluded
                .iter()
                .map(|d| bare_host(d.trim()))
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn accept(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.starts_with('#') {
            return None;
        }
        let url = Url::parse(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        if host_matches(&host, &self.site_host)
            || self.excluded.iter().any(|d| host_matches(&host, d))
        {
            return None;
        }
        Some(url)
    }
}

fn bare_host(host: &str) -> String {
    host.trim_start_matches("www.").to_ascii_lowercase()
}

fn host_matches(host: &str, domain: &str) -> bool {
    !domain.is_empty()
        && (host == domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.')))
}

/// Parse the `M/D/YYYY` date embedded in a post title.
pub fn title_date(title: &str) -> Option<NaiveDate> {
    let caps = TITLE_DATE.captures(title)?;
    NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
    )
}

/// Find the Links post for `date` among the front page's post headings.
///
/// A heading qualifies when it contains the word "Links" and its embedded
/// date equals `date`. The first qualifying heading wins.
pub fn find_links_post(html: &str, base: &Url, date: NaiveDate) -> Option<PostRef> {
    let document = Html::parse_document(html);
    document.select(&POST_TITLE).find_map(|a| {
        let title = normalize_whitespace(&a.text().collect::<String>());
        if !LINKS_WORD.is_match(&title) || title_date(&title) != Some(date) {
            return None;
        }
        let url = base.join(a.value().attr("href")?).ok()?;
        Some(PostRef {
            title,
            url: url.to_string(),
        })
    })
}

/// Extract outbound article links from a Links post body.
///
/// Links keep document order, duplicates keep their first occurrence and the
/// list is capped at `max`.
pub fn extract_article_links(
    html: &str,
    filter: &LinkFilter,
    max: usize,
) -> Result<Vec<ArticleLink>> {
    let document = Html::parse_document(html);
    let content = document
        .select(&ENTRY_CONTENT)
        .next()
        .ok_or_else(|| PipelineError::Discovery("Links post has no entry-content".to_string()))?;

    let links = content
        .select(&ANCHOR)
        .filter_map(|a| {
            let url = filter.accept(a.value().attr("href")?)?.to_string();
            let text = normalize_whitespace(&a.text().collect::<String>());
            let title = if text.is_empty() { url.clone() } else { text };
            Some(ArticleLink {
                blurb: enclosing_text(&a),
                title,
                url,
            })
        })
        .unique_by(|link| link.url.clone())
        .take(max)
        .collect();
    Ok(links)
}

/// Text of the nearest enclosing `<p>` or `<li>`, which carries the site's
/// commentary on the link.
fn enclosing_text(a: &ElementRef) -> String {
    a.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| matches!(e.value().name(), "p" | "li"))
        .map(|e| normalize_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
}

/// The live source site.
#[derive(Debug, Clone)]
pub struct LinksSite {
    client: Client,
    front_page: Url,
    filter: LinkFilter,
    max_articles: usize,
}

impl LinksSite {
    pub fn new(client: Client, front_page: Url, excluded: &[String], max_articles: usize) -> Self {
        let filter = LinkFilter::new(&front_page, excluded);
        Self {
            client,
            front_page,
            filter,
            max_articles,
        }
    }

    async fn get_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Discovery(format!("GET {url}: {e}")))?;
        resp.text()
            .await
            .map_err(|e| PipelineError::Discovery(format!("reading {url}: {e}")))
    }
}

impl LinkSource for LinksSite {
    #[instrument(level = "info", skip_all, fields(%date, front_page = %self.front_page))]
    async fn links_post(&self, date: NaiveDate) -> Result<LinksPost> {
        info!("Fetching front page");
        let html = self.get_html(self.front_page.as_str()).await?;

        let Some(post) = find_links_post(&html, &self.front_page, date) else {
            warn!("No Links post for this date on the front page");
            return Err(PipelineError::NotFound(date));
        };
        info!(title = %post.title, url = %post.url, "Found Links post");

        let html = self.get_html(&post.url).await?;
        let links = extract_article_links(&html, &self.filter, self.max_articles)?;
        info!(count = links.len(), "Extracted article links");
        debug!(urls = ?links.iter().map(|l| l.url.as_str()).collect::<Vec<_>>(), "Article URLs");

        Ok(LinksPost {
            date,
            title: post.title,
            url: post.url,
            links,
        })
    }
}
