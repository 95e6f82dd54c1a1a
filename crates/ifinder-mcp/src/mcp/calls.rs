//! Capability calls shared by the MCP tools and the CLI one-shots.
//!
//! Each call gets its own cancellation token: a child of the process-wide shutdown token, also
//! cancelled when the per-call deadline elapses. Calls never share mutable state.

use super::envelope::{self, Outcome};
use ifinder_core::escalation::{Strategy, Trigger, ESCALATIONS};
use ifinder_core::{ContentSource, Error, FetchOutcome, RenderMode, Result, SearchFilter};
use ifinder_local::highlights::highlights_to_text;
use ifinder_local::navigation::links_to_markdown;
use ifinder_local::search::filter_from_words;
use ifinder_local::{shellout, Retrieval};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub(crate) struct Capabilities {
    retrieval: Retrieval,
    deadline: Duration,
    shutdown: CancellationToken,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl Capabilities {
    pub(crate) fn new(retrieval: Retrieval) -> Self {
        let deadline = retrieval.config().call_deadline();
        Self {
            retrieval,
            deadline,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn config(&self) -> &ifinder_core::Config {
        self.retrieval.config()
    }

    /// Cancel every in-flight call (client gone, or Ctrl-C).
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run `f` under a fresh per-call token bounded by the call deadline.
    ///
    /// A cancellation caused by the deadline (rather than by shutdown) is reported as a timeout.
    async fn bounded<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.shutdown.child_token();
        let timer = {
            let token = token.clone();
            let deadline = self.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            })
        };
        let r = f(token).await;
        timer.abort();
        match r {
            Err(Error::Cancelled { reference }) if !self.shutdown.is_cancelled() => {
                Err(Error::Timeout {
                    reference,
                    after_ms: self.deadline.as_millis() as u64,
                })
            }
            other => other,
        }
    }

    pub(crate) async fn fetch(&self, reference: Option<&str>, mode: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "reference": reference, "mode": mode });
        let Some(reference) = non_empty(reference) else {
            return envelope::invalid(Strategy::Fetch, request, "reference must be non-empty");
        };
        // Unknown modes fall back to text.
        let mode = mode.and_then(RenderMode::parse).unwrap_or_default();
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.fetch(reference, mode, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(FetchOutcome::Text(page)) => {
                let trigger = if page.source == ContentSource::Pdf {
                    Some(Trigger::PdfContent)
                } else if page.truncated {
                    Some(Trigger::Truncated)
                } else {
                    None
                };
                let text = page.text.clone();
                let result = serde_json::to_value(FetchOutcome::Text(page)).unwrap_or_default();
                envelope::success(Strategy::Fetch, request, result, text, trigger, elapsed)
            }
            Ok(FetchOutcome::Markup(page)) => {
                let trigger = page.truncated.then_some(Trigger::Truncated);
                let text = page.html.clone();
                let result = serde_json::to_value(FetchOutcome::Markup(page)).unwrap_or_default();
                envelope::success(Strategy::Fetch, request, result, text, trigger, elapsed)
            }
            Err(e) => envelope::failure(Strategy::Fetch, request, &e, elapsed),
        }
    }

    pub(crate) async fn fetch_rendered(&self, reference: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "reference": reference });
        let Some(reference) = non_empty(reference) else {
            return envelope::invalid(
                Strategy::FetchRendered,
                request,
                "reference must be non-empty",
            );
        };
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.fetch_rendered(reference, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(page) => {
                let text = page.html.clone();
                let result = serde_json::to_value(&page).unwrap_or_default();
                envelope::success(Strategy::FetchRendered, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::FetchRendered, request, &e, elapsed),
        }
    }

    pub(crate) async fn extract_document(&self, reference: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "reference": reference });
        let Some(reference) = non_empty(reference) else {
            return envelope::invalid(
                Strategy::ExtractDocument,
                request,
                "reference must be non-empty",
            );
        };
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.extract_document(reference, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(doc) => {
                let text = doc.markdown.clone();
                let result = serde_json::to_value(&doc).unwrap_or_default();
                envelope::success(Strategy::ExtractDocument, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::ExtractDocument, request, &e, elapsed),
        }
    }

    pub(crate) async fn find_document_links(&self, reference: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "reference": reference });
        let Some(reference) = non_empty(reference) else {
            return envelope::invalid(
                Strategy::FindDocumentLinks,
                request,
                "reference must be non-empty",
            );
        };
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.find_document_links(reference, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(links) => {
                let text = links
                    .iter()
                    .map(|l| format!("[{}]({})", l.name, l.url))
                    .collect::<Vec<_>>()
                    .join("\n");
                let result = serde_json::json!({ "count": links.len(), "links": links });
                envelope::success(Strategy::FindDocumentLinks, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::FindDocumentLinks, request, &e, elapsed),
        }
    }

    pub(crate) async fn search_simple(&self, term: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "term": term });
        let Some(term) = non_empty(term) else {
            return envelope::invalid(Strategy::SearchSimple, request, "term must be non-empty");
        };
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.search_simple(term, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(listing) => {
                let text = listing.to_text();
                let result = serde_json::to_value(&listing).unwrap_or_default();
                envelope::success(Strategy::SearchSimple, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::SearchSimple, request, &e, elapsed),
        }
    }

    /// Words that match no known filter value are dropped before the request is built.
    pub(crate) async fn search_filtered(
        &self,
        term: Option<&str>,
        item_types: &[String],
        date_range: Option<&str>,
        sort: Option<&str>,
    ) -> Outcome {
        let mut request = serde_json::json!({
            "term": term,
            "item_types": item_types,
            "date_range": date_range,
            "sort": sort,
        });
        let Some(term) = non_empty(term) else {
            return envelope::invalid(Strategy::SearchFiltered, request, "term must be non-empty");
        };
        let filter: SearchFilter = filter_from_words(term, item_types, date_range, sort);
        request["applied"] = serde_json::to_value(&filter).unwrap_or_default();
        let t0 = Instant::now();
        let r = self
            .bounded(|c| {
                let filter = &filter;
                async move { self.retrieval.search_filtered(filter, &c).await }
            })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(listing) => {
                let text = listing.to_text();
                let result = serde_json::to_value(&listing).unwrap_or_default();
                envelope::success(Strategy::SearchFiltered, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::SearchFiltered, request, &e, elapsed),
        }
    }

    pub(crate) async fn extract_navigation(&self, reference: Option<&str>) -> Outcome {
        let request = serde_json::json!({ "reference": reference });
        let Some(reference) = non_empty(reference) else {
            return envelope::invalid(
                Strategy::ExtractNavigation,
                request,
                "reference must be non-empty",
            );
        };
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.extract_navigation(reference, &c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(links) => {
                let text = links_to_markdown(&links);
                let result = serde_json::json!({ "count": links.len(), "links": links });
                envelope::success(Strategy::ExtractNavigation, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::ExtractNavigation, request, &e, elapsed),
        }
    }

    pub(crate) async fn get_highlights(&self) -> Outcome {
        let request = serde_json::json!({ "news_path": self.retrieval.config().news_path });
        let t0 = Instant::now();
        let r = self
            .bounded(|c| async move { self.retrieval.get_highlights(&c).await })
            .await;
        let elapsed = t0.elapsed().as_millis();
        match r {
            Ok(items) => {
                let text = highlights_to_text(&items);
                let result = serde_json::json!({ "count": items.len(), "highlights": items });
                envelope::success(Strategy::GetHighlights, request, result, text, None, elapsed)
            }
            Err(e) => envelope::failure(Strategy::GetHighlights, request, &e, elapsed),
        }
    }

    /// Configuration (no secrets to hide: the engine holds none), capability names, local tool
    /// availability and the escalation table.
    pub(crate) fn meta(&self) -> serde_json::Value {
        let config = self.retrieval.config();
        let mut payload = serde_json::json!({
            "ok": true,
            "name": "ifinder",
            "version": env!("CARGO_PKG_VERSION"),
            "config": config,
            "capabilities": Strategy::ALL.iter().map(|s| serde_json::json!({
                "name": s.name(),
                "cost_rank": s.cost_rank(),
            })).collect::<Vec<_>>(),
            "local_tools": {
                "node": shellout::has(&config.node_bin),
                "pdftotext": shellout::has("pdftotext"),
            },
            "escalations": ESCALATIONS,
        });
        envelope::add_envelope_fields(&mut payload, "ifinder_meta", 0);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ifinder_core::{
        Config, FetchBackend, FetchRequest, FetchResponse, RenderBackend, RenderRequest,
        RenderedPage,
    };
    use std::sync::Arc;

    /// Never answers on its own; only cancellation ends a call.
    struct Stalled;

    #[async_trait]
    impl FetchBackend for Stalled {
        async fn fetch(
            &self,
            req: &FetchRequest,
            cancel: &CancellationToken,
        ) -> Result<FetchResponse> {
            cancel.cancelled().await;
            Err(Error::Cancelled {
                reference: req.reference.clone(),
            })
        }
    }

    #[async_trait]
    impl RenderBackend for Stalled {
        async fn render(
            &self,
            req: &RenderRequest,
            cancel: &CancellationToken,
        ) -> Result<RenderedPage> {
            cancel.cancelled().await;
            Err(Error::Cancelled {
                reference: req.reference.clone(),
            })
        }
    }

    fn stalled(deadline_ms: u64) -> Capabilities {
        let config = Config {
            base_url: "http://127.0.0.1:9".to_string(),
            call_deadline_ms: deadline_ms,
            ..Config::default()
        };
        Capabilities::new(Retrieval::with_backends(
            Arc::new(config),
            Arc::new(Stalled),
            Arc::new(Stalled),
        ))
    }

    #[tokio::test]
    async fn call_deadline_surfaces_as_timeout() {
        let caps = stalled(50);
        let o = caps.fetch(Some("/barbacena"), None).await;
        assert!(!o.ok());
        assert_eq!(o.payload["error"]["code"].as_str(), Some("timeout"));
        assert_eq!(o.payload["next"].as_str(), Some("fetch_rendered"));
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_calls() {
        let caps = stalled(60_000);
        let c2 = caps.clone();
        let call = tokio::spawn(async move { c2.fetch_rendered(Some("/agenda")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        caps.shutdown();
        let o = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("call should end after shutdown")
            .unwrap();
        assert_eq!(o.payload["error"]["code"].as_str(), Some("cancelled"));
        assert_eq!(o.payload["state"].as_str(), Some("failed"));
    }

    #[tokio::test]
    async fn blank_inputs_are_rejected_before_any_request() {
        let caps = stalled(60_000);
        let o = caps.search_simple(Some("   ")).await;
        assert_eq!(o.payload["error"]["code"].as_str(), Some("invalid_params"));
        let o = caps.extract_document(None).await;
        assert_eq!(o.payload["error"]["code"].as_str(), Some("invalid_params"));
    }

    #[test]
    fn meta_lists_every_capability_and_the_table() {
        let v = stalled(1).meta();
        assert_eq!(v["kind"].as_str(), Some("ifinder_meta"));
        assert_eq!(v["capabilities"].as_array().map(Vec::len), Some(Strategy::ALL.len()));
        assert!(!v["escalations"].as_array().unwrap().is_empty());
        assert_eq!(v["config"]["base_url"].as_str(), Some("http://127.0.0.1:9"));
    }
}
