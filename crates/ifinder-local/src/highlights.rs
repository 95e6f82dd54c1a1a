//! Latest headlines from the news index.

use crate::normalize::{anchor_text, navigable_href};
use crate::StaticFetcher;
use html_scraper::{Html, Selector};
use ifinder_core::{Config, Error, FetchBackend, Highlight, Result, HIGHLIGHTS_LAYOUT_MESSAGE};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Headline marker on the news index.
pub const HEADLINE_MARKER: &str = ".tileHeadline";
pub const MAX_HIGHLIGHTS: usize = 5;

/// Up to five headlines in page order; empty when the marker is absent.
pub fn parse_highlights(html: &str, page_url: &str) -> Vec<Highlight> {
    let doc = Html::parse_document(html);
    let base = url::Url::parse(page_url).ok();
    let (Ok(marker), Ok(anchor)) = (Selector::parse(HEADLINE_MARKER), Selector::parse("a[href]"))
    else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for el in doc.select(&marker) {
        // The marker is either the anchor itself or wraps it.
        let a = if el.value().name() == "a" {
            Some(el)
        } else {
            el.select(&anchor).next()
        };
        let Some(a) = a else { continue };
        let (Some(title), Some(url)) = (
            anchor_text(&a),
            a.value()
                .attr("href")
                .and_then(|h| navigable_href(base.as_ref(), h)),
        ) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        out.push(Highlight { title, url });
        if out.len() >= MAX_HIGHLIGHTS {
            break;
        }
    }
    out
}

/// Numbered headline list.
pub fn highlights_to_text(items: &[Highlight]) -> String {
    let mut out = String::from("Últimas notícias:\n");
    for (i, h) in items.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n   URL: {}", i + 1, h.title, h.url));
    }
    out
}

#[derive(Clone)]
pub struct HighlightsExtractor {
    config: Arc<Config>,
    pages: StaticFetcher,
}

impl HighlightsExtractor {
    pub fn new(config: Arc<Config>, backend: Arc<dyn FetchBackend>) -> Self {
        let pages = StaticFetcher::new(config.clone(), backend);
        Self { config, pages }
    }

    pub async fn get(&self, cancel: &CancellationToken) -> Result<Vec<Highlight>> {
        let reference = self.config.news_path.clone();
        let (final_url, html) = self.pages.get_html(&reference, cancel).await?;
        let items = parse_highlights(&html, &final_url);
        if items.is_empty() {
            return Err(Error::layout_mismatch(
                reference,
                HEADLINE_MARKER,
                HIGHLIGHTS_LAYOUT_MESSAGE,
            ));
        }
        Ok(items)
    }
}
