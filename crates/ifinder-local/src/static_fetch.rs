//! Plain HTTP page retrieval with HTML normalization.

use crate::document;
use crate::normalize::normalize_html;
use html_scraper::Html;
use ifinder_core::{
    resolve, truncate_chars, Config, ContentSource, Error, FetchBackend, FetchOutcome,
    FetchRequest, FetchResponse, MarkupPage, RenderMode, Result, TextPage,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct StaticFetcher {
    config: Arc<Config>,
    backend: Arc<dyn FetchBackend>,
}

impl StaticFetcher {
    pub fn new(config: Arc<Config>, backend: Arc<dyn FetchBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Page request for `reference` resolved against the portal origin.
    pub fn request(&self, reference: &str) -> FetchRequest {
        FetchRequest {
            reference: reference.to_string(),
            url: resolve(&self.config.base_url, reference),
            timeout_ms: Some(self.config.http_timeout_ms),
            max_bytes: Some(self.config.max_body_bytes),
            user_agent: None,
        }
    }

    pub async fn get(
        &self,
        req: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse> {
        self.backend.fetch(req, cancel).await
    }

    /// Final URL and undecorated HTML of a page, for the structural extractors.
    pub async fn get_html(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        let resp = self.get(&self.request(reference), cancel).await?;
        Ok((resp.final_url.clone(), resp.text_lossy()))
    }

    /// Fetch one page in the requested mode.
    ///
    /// PDF responses are handed to the document extractor and always come back as text.
    pub async fn fetch(
        &self,
        reference: &str,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let resp = self.get(&self.request(reference), cancel).await?;

        if resp.is_pdf() {
            let doc =
                document::extract_from_bytes(reference, resp.final_url.clone(), resp.bytes).await?;
            let (text, truncated) = truncate_chars(&doc.markdown, self.config.max_text_chars);
            return Ok(FetchOutcome::Text(TextPage {
                reference: reference.to_string(),
                url: resp.final_url,
                text,
                links: Vec::new(),
                truncated,
                source: ContentSource::Pdf,
            }));
        }

        let body = resp.text_lossy();
        match mode {
            RenderMode::TextOnly => {
                let page = normalize_html(&body, &resp.final_url);
                if page.text.trim().is_empty() {
                    return Err(Error::EmptyContent {
                        reference: reference.to_string(),
                    });
                }
                let (text, truncated) = truncate_chars(&page.text, self.config.max_text_chars);
                Ok(FetchOutcome::Text(TextPage {
                    reference: reference.to_string(),
                    url: resp.final_url,
                    text,
                    links: page.links,
                    truncated,
                    source: ContentSource::Html,
                }))
            }
            RenderMode::RawMarkup => {
                let html = Html::parse_document(&body).html();
                let (html, truncated) = truncate_chars(&html, self.config.max_html_chars);
                Ok(FetchOutcome::Markup(MarkupPage {
                    reference: reference.to_string(),
                    url: resp.final_url,
                    html,
                    truncated,
                }))
            }
        }
    }
}
