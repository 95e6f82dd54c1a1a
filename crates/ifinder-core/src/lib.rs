//! Backend-agnostic types for the portal retrieval engine.
//!
//! This crate does no IO. It defines the error taxonomy, the injected configuration, reference
//! resolution, bounded-text helpers, and the fetch/render traits that `ifinder-local` implements.

mod config;
mod error;
pub mod escalation;
mod reference;
mod search;
mod text;
mod types;

pub use config::{Config, DEFAULT_BASE_URL};
pub use error::{Error, ErrorKind, Result, HIGHLIGHTS_LAYOUT_MESSAGE, NO_RESULTS_MESSAGE};
pub use reference::{has_scheme, resolve, Reference};
pub use search::{DateRange, ItemType, SearchFilter, SearchListing, SearchResultEntry, SortOrder};
pub use text::{clip_with_ellipsis, norm_ws, truncate_chars};
pub use types::{
    ContentSource, DocumentLink, DocumentText, FetchBackend, FetchOutcome, FetchRequest,
    FetchResponse, Highlight, LinkEntry, MarkupPage, OperationState, RenderBackend, RenderMode,
    RenderRequest, RenderedPage, TextPage,
};

/// Sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
