use ifinder_core::{Config, Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod document;
pub mod highlights;
pub mod navigation;
pub mod normalize;
pub mod render;
pub mod retrieval;
pub mod search;
pub mod shellout;
pub mod static_fetch;
pub mod textprep;

#[cfg(test)]
mod test_support;

pub use document::DocumentExtractor;
pub use highlights::HighlightsExtractor;
pub use navigation::NavigationExtractor;
pub use render::PlaywrightRenderer;
pub use retrieval::Retrieval;
pub use search::SiteSearch;
pub use static_fetch::StaticFetcher;

/// reqwest-backed [`FetchBackend`]: bounded body reads, timeout/cancel classification.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    default_timeout: Duration,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10).min(config.http_timeout()))
            .build()
            .map_err(|e| Error::NotConfigured(format!("cliente HTTP: {e}")))?;
        Ok(Self {
            client,
            default_timeout: config.http_timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn fetch_uncancelled(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let started = std::time::Instant::now();
        let url = url::Url::parse(&req.url)
            .map_err(|e| Error::network(&req.reference, format!("URL inválida ({e})")))?;

        let mut rb = self.client.get(url);
        if let Some(ua) = req.user_agent.as_deref() {
            rb = rb.header(reqwest::header::USER_AGENT, ua);
        }
        let resp = rb.send().await.map_err(|e| classify(req, e, started))?;
        let final_url = resp.url().to_string();
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::network(&req.reference, format!("HTTP {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(self.max_body_bytes) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(req, e, started))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status: status.as_u16(),
            content_type,
            bytes,
            truncated,
        })
    }

    fn timeout_for(&self, req: &FetchRequest) -> Duration {
        req.timeout().unwrap_or(self.default_timeout)
    }
}

/// reqwest only times out on connect here (the request budget is enforced outside), so the
/// reported figure is the time actually spent.
fn classify(req: &FetchRequest, e: reqwest::Error, started: std::time::Instant) -> Error {
    if e.is_timeout() {
        return Error::Timeout {
            reference: req.reference.clone(),
            after_ms: started.elapsed().as_millis() as u64,
        };
    }
    // The URL is already in the message through `reference`.
    Error::network(&req.reference, e.without_url())
}

#[async_trait::async_trait]
impl FetchBackend for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest, cancel: &CancellationToken) -> Result<FetchResponse> {
        let timeout = self.timeout_for(req);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled { reference: req.reference.clone() }),
            r = tokio::time::timeout(timeout, self.fetch_uncancelled(req)) => match r {
                Ok(r) => r,
                Err(_) => Err(Error::Timeout {
                    reference: req.reference.clone(),
                    after_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }
}
