//! One entry point per capability, sharing a single injected configuration.

use crate::{
    DocumentExtractor, HighlightsExtractor, HttpFetcher, NavigationExtractor, PlaywrightRenderer,
    SiteSearch, StaticFetcher,
};
use ifinder_core::{
    resolve, Config, DocumentLink, DocumentText, FetchBackend, FetchOutcome, Highlight, LinkEntry,
    OperationState, RenderBackend, RenderMode, RenderRequest, RenderedPage, Result, SearchFilter,
    SearchListing,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Run one capability call and log its state transitions.
///
/// Calls are independent; nothing here retries.
async fn observed<T, F>(op: &'static str, subject: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let t0 = Instant::now();
    tracing::debug!(op, subject, state = ?OperationState::InFlight, "call started");
    let r = fut.await;
    let elapsed_ms = t0.elapsed().as_millis() as u64;
    match &r {
        Ok(_) => tracing::info!(
            op,
            subject,
            elapsed_ms,
            state = ?OperationState::Succeeded,
            "call finished"
        ),
        Err(e) => tracing::warn!(
            op,
            subject,
            elapsed_ms,
            state = ?OperationState::Failed,
            kind = e.kind().as_str(),
            error = %e,
            "call failed"
        ),
    }
    r
}

#[derive(Clone)]
pub struct Retrieval {
    config: Arc<Config>,
    pages: StaticFetcher,
    renderer: Arc<dyn RenderBackend>,
    documents: DocumentExtractor,
    search: SiteSearch,
    navigation: NavigationExtractor,
    highlights: HighlightsExtractor,
}

impl Retrieval {
    /// Production wiring: reqwest for HTTP, Node + Playwright for rendering.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn FetchBackend> = Arc::new(HttpFetcher::new(&config)?);
        let config = Arc::new(config);
        let renderer: Arc<dyn RenderBackend> = Arc::new(PlaywrightRenderer::new(config.clone()));
        Ok(Self::with_backends(config, fetcher, renderer))
    }

    pub fn with_backends(
        config: Arc<Config>,
        fetcher: Arc<dyn FetchBackend>,
        renderer: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            pages: StaticFetcher::new(config.clone(), fetcher.clone()),
            documents: DocumentExtractor::new(config.clone(), fetcher.clone()),
            search: SiteSearch::new(config.clone(), fetcher.clone()),
            navigation: NavigationExtractor::new(config.clone(), fetcher.clone()),
            highlights: HighlightsExtractor::new(config.clone(), fetcher),
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn fetch(
        &self,
        reference: &str,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        observed("fetch", reference, self.pages.fetch(reference, mode, cancel)).await
    }

    pub async fn fetch_rendered(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<RenderedPage> {
        let req = RenderRequest {
            reference: reference.to_string(),
            url: resolve(&self.config.base_url, reference),
            timeout_ms: self.config.render_timeout_ms,
        };
        observed("fetch_rendered", reference, self.renderer.render(&req, cancel)).await
    }

    pub async fn extract_document(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentText> {
        observed("extract_document", reference, self.documents.extract(reference, cancel)).await
    }

    pub async fn find_document_links(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentLink>> {
        observed(
            "find_document_links",
            reference,
            self.documents.find_links(reference, cancel),
        )
        .await
    }

    pub async fn search_simple(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchListing> {
        observed("search_simple", term, self.search.search_simple(term, cancel)).await
    }

    pub async fn search_filtered(
        &self,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<SearchListing> {
        observed(
            "search_filtered",
            &filter.term,
            self.search.search_filtered(filter, cancel),
        )
        .await
    }

    pub async fn extract_navigation(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<LinkEntry>> {
        observed(
            "extract_navigation",
            reference,
            self.navigation.extract(reference, cancel),
        )
        .await
    }

    pub async fn get_highlights(&self, cancel: &CancellationToken) -> Result<Vec<Highlight>> {
        observed(
            "get_highlights",
            &self.config.news_path,
            self.highlights.get(cancel),
        )
        .await
    }
}
