use crate::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// How the static fetcher should hand back a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Visible text plus the link graph, capped at `max_text_chars`.
    #[default]
    TextOnly,
    /// Parsed but unstripped markup, capped at `max_html_chars`.
    RawMarkup,
}

impl RenderMode {
    /// Permissive parse; unknown values yield `None` so callers can fall back to the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text_only" | "textonly" => Some(Self::TextOnly),
            "raw" | "html" | "markup" | "raw_markup" | "rawmarkup" => Some(Self::RawMarkup),
            _ => None,
        }
    }
}

/// One anchor from a page, in document order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkEntry {
    pub display_text: Option<String>,
    pub target: String,
}

impl LinkEntry {
    pub fn to_markdown(&self) -> String {
        format!(
            "[{}]({})",
            self.display_text.as_deref().unwrap_or(""),
            self.target
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Html,
    Pdf,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPage {
    pub reference: String,
    pub url: String,
    pub text: String,
    pub links: Vec<LinkEntry>,
    /// The text hit the cap; the policy may escalate to a heavier strategy.
    pub truncated: bool,
    pub source: ContentSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkupPage {
    pub reference: String,
    pub url: String,
    pub html: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FetchOutcome {
    Text(TextPage),
    Markup(MarkupPage),
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub reference: String,
    pub final_url: String,
    pub status: Option<u16>,
    pub html: String,
    pub truncated: bool,
    /// Engine that actually produced the page (after any launch fallback).
    pub engine: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentText {
    pub reference: String,
    /// Where the bytes came from: a URL or a local path.
    pub location: String,
    pub pages: usize,
    pub markdown: String,
    /// Extraction engine (`pdf-extract` or a shellout fallback).
    pub engine: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub title: String,
    pub url: String,
}

/// Lifecycle of a single capability call. No operation retries internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    NotStarted,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// The reference as the caller wrote it; used in error messages.
    pub reference: String,
    /// Absolute URL to GET.
    pub url: String,
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Overrides the backend's default user agent.
    pub user_agent: Option<String>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_ms.map(std::time::Duration::from_millis)
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    /// Declared or sniffed PDF.
    pub fn is_pdf(&self) -> bool {
        let ct = self
            .content_type
            .as_deref()
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        ct == "application/pdf" || crate::bytes_look_like_pdf(&self.bytes)
    }
}

/// Plain HTTP retrieval. Implementations must map non-2xx statuses to `Error::Network`.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest, cancel: &CancellationToken) -> Result<FetchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub reference: String,
    pub url: String,
    pub timeout_ms: u64,
}

/// Headless-browser retrieval. Each call owns its browser process for its whole lifetime.
#[async_trait::async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, req: &RenderRequest, cancel: &CancellationToken)
        -> Result<RenderedPage>;
}
