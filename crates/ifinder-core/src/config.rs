use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.ifsudestemg.edu.br";

/// Fixed settings injected into every retrieval component at construction.
///
/// Nothing here is mutated after startup; components hold it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Origin that relative references are resolved against.
    pub base_url: String,
    /// Path of the portal's search view.
    pub search_path: String,
    /// Path of the news index used for highlights.
    pub news_path: String,
    /// Cap (chars) for text-mode results.
    pub max_text_chars: usize,
    /// Cap (chars) for raw markup results (static raw mode and rendered pages).
    pub max_html_chars: usize,
    /// Per-request timeout for page and search fetches.
    pub http_timeout_ms: u64,
    /// Per-request timeout for document downloads.
    pub document_timeout_ms: u64,
    /// Hard ceiling for one browser navigation, launch included.
    pub render_timeout_ms: u64,
    /// Enclosing deadline for one capability call (server side).
    pub call_deadline_ms: u64,
    /// Hard cap on bytes read from a response body.
    pub max_body_bytes: u64,
    pub user_agent: String,
    /// Browser-like agent for document hosts that reject unknown clients.
    pub document_user_agent: String,
    /// Node.js binary used to drive Playwright.
    pub node_bin: String,
    /// Browser engines tried in order; the next one is used only when launch fails.
    pub render_engines: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: "/@@search".to_string(),
            news_path: "/barbacena/noticias".to_string(),
            max_text_chars: 12_000,
            max_html_chars: 20_000,
            http_timeout_ms: 15_000,
            document_timeout_ms: 30_000,
            render_timeout_ms: 30_000,
            call_deadline_ms: 90_000,
            max_body_bytes: 10_000_000,
            user_agent: "ifinder/0.1 (+portal retrieval)".to_string(),
            document_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36"
                .to_string(),
            node_bin: "node".to_string(),
            render_engines: vec!["chromium".to_string(), "firefox".to_string()],
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env(key).and_then(|s| s.parse::<u64>().ok())
}

impl Config {
    /// Defaults overridden by `IFINDER_*` environment variables.
    pub fn from_env() -> Self {
        let mut c = Self::default();
        c.apply_env();
        c
    }

    /// Apply `IFINDER_*` overrides in place. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env("IFINDER_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env("IFINDER_SEARCH_PATH") {
            self.search_path = v;
        }
        if let Some(v) = env("IFINDER_NEWS_PATH") {
            self.news_path = v;
        }
        if let Some(v) = env_u64("IFINDER_HTTP_TIMEOUT_MS") {
            self.http_timeout_ms = v;
        }
        if let Some(v) = env_u64("IFINDER_DOCUMENT_TIMEOUT_MS") {
            self.document_timeout_ms = v;
        }
        if let Some(v) = env_u64("IFINDER_RENDER_TIMEOUT_MS") {
            self.render_timeout_ms = v;
        }
        if let Some(v) = env_u64("IFINDER_CALL_DEADLINE_MS") {
            self.call_deadline_ms = v;
        }
        if let Some(v) = env_u64("IFINDER_MAX_BODY_BYTES") {
            self.max_body_bytes = v;
        }
        if let Some(v) = env("IFINDER_NODE") {
            self.node_bin = v;
        }
        if let Some(v) = env("IFINDER_RENDER_ENGINES") {
            let engines: Vec<String> = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !engines.is_empty() {
                self.render_engines = engines;
            }
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_millis(self.document_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }

    /// Absolute URL of the search view.
    pub fn search_url(&self) -> String {
        crate::resolve(&self.base_url, &self.search_path)
    }

    /// Absolute URL of the news index.
    pub fn news_url(&self) -> String {
        crate::resolve(&self.base_url, &self.news_path)
    }
}
