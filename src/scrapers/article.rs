//! Article download and readable-text extraction.
//!
//! Linked articles are arbitrary pages: news sites, blogs, paywalled or
//! script-rendered pages that return nothing useful. Extraction is a
//! paragraph heuristic; anything that yields too little text is skipped
//! rather than treated as an error.

use super::ArticleSource;
use crate::error::SkipReason;
use crate::utils::normalize_whitespace;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

/// Paragraph selectors tried in order; the first that yields text wins.
static PARAGRAPH_SCOPES: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article p", "main p", ".entry-content p", "p"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// Extract readable text from an HTML page.
///
/// Paragraphs are whitespace-normalized and joined with blank lines.
/// Returns an empty string when the page has no paragraph text.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    for selector in PARAGRAPH_SCOPES.iter() {
        let paragraphs: Vec<String> = document
            .select(selector)
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join("\n\n");
        }
    }
    String::new()
}

/// Decide whether extracted text is worth narrating.
pub fn classify_text(text: String, min_chars: usize) -> Result<String, SkipReason> {
    let text = text.trim().to_string();
    let chars = text.chars().count();
    if chars == 0 {
        Err(SkipReason::NoTextExtracted)
    } else if chars < min_chars {
        Err(SkipReason::TooShort {
            chars,
            min: min_chars,
        })
    } else {
        Ok(text)
    }
}

/// Fetches articles over HTTP.
#[derive(Debug, Clone)]
pub struct ArticleFetcher {
    client: Client,
}

impl ArticleFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArticleSource for ArticleFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_text(&self, url: &str) -> Result<String, SkipReason> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SkipReason::FetchError(e.to_string()))?;
        let body = resp
            .text()
            .await
            .map_err(|e| SkipReason::FetchError(e.to_string()))?;

        let text = extract_text(&body);
        debug!(html_bytes = body.len(), text_chars = text.chars().count(), "Extracted article text");
        Ok(text)
    }
}
