//! Declarative strategy ordering for the calling policy.
//!
//! The engine never follows these rows itself. They exist so a policy can drive escalation from
//! a table keyed on the engine's result classification instead of from prose.

use crate::ErrorKind;
use crate::ErrorKind as K;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Fetch,
    FetchRendered,
    ExtractDocument,
    FindDocumentLinks,
    SearchSimple,
    SearchFiltered,
    ExtractNavigation,
    GetHighlights,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::Fetch,
        Strategy::FetchRendered,
        Strategy::ExtractDocument,
        Strategy::FindDocumentLinks,
        Strategy::SearchSimple,
        Strategy::SearchFiltered,
        Strategy::ExtractNavigation,
        Strategy::GetHighlights,
    ];

    /// Capability name as exposed to the policy.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::FetchRendered => "fetch_rendered",
            Self::ExtractDocument => "extract_document",
            Self::FindDocumentLinks => "find_document_links",
            Self::SearchSimple => "search_simple",
            Self::SearchFiltered => "search_filtered",
            Self::ExtractNavigation => "extract_navigation",
            Self::GetHighlights => "get_highlights",
        }
    }

    /// Relative cost; lower is tried first.
    pub fn cost_rank(self) -> u8 {
        match self {
            Self::SearchSimple | Self::GetHighlights => 0,
            Self::SearchFiltered | Self::Fetch | Self::ExtractNavigation => 1,
            Self::FindDocumentLinks => 1,
            Self::ExtractDocument => 2,
            Self::FetchRendered => 3,
        }
    }
}

/// Observable condition on a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "on", content = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Failed(ErrorKind),
    /// Succeeded, but the text hit its cap.
    Truncated,
    /// Succeeded on a document rather than a page.
    PdfContent,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Escalation {
    pub from: Strategy,
    #[serde(flatten)]
    pub trigger: Trigger,
    /// `None` means: stop and report.
    pub to: Option<Strategy>,
}

use Strategy as S;
use Trigger as T;

const fn failed(kind: K) -> T {
    T::Failed(kind)
}

const fn row(from: Strategy, trigger: Trigger, to: Option<Strategy>) -> Escalation {
    Escalation { from, trigger, to }
}

pub const ESCALATIONS: &[Escalation] = &[
    row(S::Fetch, failed(K::EmptyContent), Some(S::FetchRendered)),
    row(S::Fetch, T::Truncated, Some(S::FetchRendered)),
    row(S::Fetch, failed(K::Timeout), Some(S::FetchRendered)),
    row(S::Fetch, T::PdfContent, Some(S::ExtractDocument)),
    row(S::Fetch, failed(K::Network), None),
    row(S::SearchSimple, failed(K::NoResults), Some(S::SearchFiltered)),
    row(S::SearchFiltered, failed(K::NoResults), Some(S::ExtractNavigation)),
    row(S::SearchSimple, failed(K::Network), Some(S::ExtractNavigation)),
    row(S::ExtractNavigation, failed(K::LayoutMismatch), Some(S::FetchRendered)),
    row(S::GetHighlights, failed(K::LayoutMismatch), Some(S::FetchRendered)),
    row(S::FindDocumentLinks, failed(K::NoResults), Some(S::ExtractNavigation)),
    row(S::ExtractDocument, failed(K::UnreadableDocument), Some(S::Fetch)),
    row(S::FetchRendered, failed(K::Timeout), None),
    row(S::FetchRendered, failed(K::NotConfigured), None),
];

/// Next strategy for `(from, trigger)`; `None` when the table says stop or has no row.
pub fn next_strategy(from: Strategy, trigger: Trigger) -> Option<Strategy> {
    ESCALATIONS
        .iter()
        .find(|e| e.from == from && e.trigger == trigger)
        .and_then(|e| e.to)
}
