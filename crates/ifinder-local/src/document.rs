//! PDF documents: download or local read, text extraction, markdown shaping, and link discovery.

use crate::normalize::anchor_text;
use crate::{shellout, StaticFetcher};
use html_scraper::{Html, Selector};
use ifinder_core::{
    bytes_look_like_pdf, resolve, Config, DocumentLink, DocumentText, Error, FetchBackend,
    FetchRequest, Result,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Name used when a document anchor has no text.
pub const DEFAULT_DOCUMENT_NAME: &str = "Documento PDF";

/// Hard cap for the shellout fallback's output.
const SHELLOUT_MAX_CHARS: usize = 2_000_000;

#[derive(Clone)]
pub struct DocumentExtractor {
    config: Arc<Config>,
    backend: Arc<dyn FetchBackend>,
    pages: StaticFetcher,
}

impl DocumentExtractor {
    pub fn new(config: Arc<Config>, backend: Arc<dyn FetchBackend>) -> Self {
        let pages = StaticFetcher::new(config.clone(), backend.clone());
        Self {
            config,
            backend,
            pages,
        }
    }

    /// Full text of a PDF as markdown. No length cap is applied.
    ///
    /// `reference` is a local file path (or `file://` URL) when one exists, else a URL or path
    /// on the portal.
    pub async fn extract(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentText> {
        let (location, bytes) = match local_path(reference).await {
            Some(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| Error::unreadable(reference, e))?;
                (path.display().to_string(), bytes)
            }
            None => {
                let url = resolve(&self.config.base_url, reference);
                let req = FetchRequest {
                    reference: reference.to_string(),
                    url: url.clone(),
                    timeout_ms: Some(self.config.document_timeout_ms),
                    max_bytes: Some(self.config.max_body_bytes),
                    user_agent: Some(self.config.document_user_agent.clone()),
                };
                let resp = self.backend.fetch(&req, cancel).await?;
                if resp.truncated {
                    return Err(Error::unreadable(
                        reference,
                        format!("documento maior que {} bytes", self.config.max_body_bytes),
                    ));
                }
                (resp.final_url, resp.bytes)
            }
        };
        extract_from_bytes(reference, location, bytes).await
    }

    /// Anchors on a page that point at PDF documents, absolute and deduplicated by URL.
    pub async fn find_links(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentLink>> {
        let (final_url, html) = self.pages.get_html(reference, cancel).await?;
        let links = document_links(&html, &final_url, &self.config.base_url);
        if links.is_empty() {
            return Err(Error::NoResults {
                term: reference.to_string(),
                message: "Nenhum documento PDF encontrado na página.".to_string(),
            });
        }
        Ok(links)
    }
}

async fn local_path(reference: &str) -> Option<PathBuf> {
    let r = reference.trim();
    let p = PathBuf::from(r.strip_prefix("file://").unwrap_or(r));
    let meta = tokio::fs::metadata(&p).await.ok()?;
    meta.is_file().then_some(p)
}

/// Extract text from PDF bytes off the async runtime.
///
/// Non-PDF bytes and parser failures are `UnreadableDocument`; a PDF with no text layer is
/// `EmptyContent`.
pub async fn extract_from_bytes(
    reference: &str,
    location: String,
    bytes: Vec<u8>,
) -> Result<DocumentText> {
    if !bytes_look_like_pdf(&bytes) {
        return Err(Error::unreadable(reference, "o conteúdo não é um PDF"));
    }
    let (pages, engine) = tokio::task::spawn_blocking(move || pdf_pages(&bytes))
        .await
        .map_err(|e| Error::unreadable(reference, format!("extração interrompida ({e})")))?
        .map_err(|cause| Error::unreadable(reference, cause))?;

    let markdown = pages_to_markdown(&pages);
    if markdown.is_empty() {
        return Err(Error::EmptyContent {
            reference: reference.to_string(),
        });
    }
    Ok(DocumentText {
        reference: reference.to_string(),
        location,
        pages: pages.len(),
        markdown,
        engine,
    })
}

/// Per-page text: `pdf-extract` first, `pdftotext` when it fails or panics.
fn pdf_pages(bytes: &[u8]) -> std::result::Result<(Vec<String>, &'static str), String> {
    let primary = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes));
    let cause = match primary {
        Ok(Ok(pages)) => return Ok((pages, "pdf-extract")),
        Ok(Err(e)) => e.to_string(),
        Err(_) => "falha interna do extrator de PDF".to_string(),
    };
    tracing::debug!(cause = %cause, "pdf-extract failed; trying pdftotext");
    match shellout::pdftotext(bytes, Duration::from_secs(20), SHELLOUT_MAX_CHARS) {
        Ok(text) => {
            let mut pages: Vec<String> = text.split('\u{0c}').map(|p| p.to_string()).collect();
            // pdftotext ends every page with a form feed.
            if pages.last().is_some_and(|p| p.trim().is_empty()) {
                pages.pop();
            }
            Ok((pages, "pdftotext"))
        }
        Err(_) => Err(cause),
    }
}

/// Pages joined by blank lines, each page normalized for markdown consumers.
pub fn pages_to_markdown(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| page_to_markdown(p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn page_to_markdown(page: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in page.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push(String::new());
            }
            continue;
        }
        blank_run = 0;
        out.push(escape_markdown_line(line));
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Escape characters that would otherwise turn plain document text into markdown syntax.
fn escape_markdown_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 4);
    let indent = line.len() - line.trim_start().len();
    out.push_str(&line[..indent]);
    let body = &line[indent..];
    if body.starts_with('#') || body.starts_with('>') {
        out.push('\\');
    }
    for ch in body.chars() {
        if matches!(ch, '\\' | '*' | '_' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Whether an href points at a PDF (by extension or the portal's download view).
pub fn is_document_href(href: &str) -> bool {
    let lc = href.trim().to_ascii_lowercase();
    let path = lc.split(['?', '#']).next().unwrap_or("");
    path.ends_with(".pdf") || lc.ends_with(".pdf") || lc.contains("at_download/file")
}

/// PDF anchors from `html`, resolved against the page URL and deduplicated by URL.
pub fn document_links(html: &str, page_url: &str, base_url: &str) -> Vec<DocumentLink> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let page = url::Url::parse(page_url).ok();
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || !is_document_href(href) {
            continue;
        }
        let url = page
            .as_ref()
            .and_then(|p| p.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| resolve(base_url, href));
        if !seen.insert(url.clone()) {
            continue;
        }
        out.push(DocumentLink {
            name: anchor_text(&a).unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string()),
            url,
        });
    }
    out
}
