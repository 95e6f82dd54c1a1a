use serde::Serialize;

/// Classified failure of a retrieval operation.
///
/// Messages are written for the calling policy (and, through it, the end user), so they are in
/// the portal's language and never carry credentials or internal traces.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Erro de rede ao acessar {reference}: {cause}")]
    Network { reference: String, cause: String },
    #[error("Tempo esgotado ({after_ms} ms) ao acessar {reference}")]
    Timeout { reference: String, after_ms: u64 },
    #[error("A página {reference} não possui texto extraível")]
    EmptyContent { reference: String },
    #[error("Não foi possível ler o documento {reference}: {cause}")]
    UnreadableDocument { reference: String, cause: String },
    #[error("{message}")]
    LayoutMismatch {
        reference: String,
        marker: String,
        message: String,
    },
    #[error("{message}")]
    NoResults { term: String, message: String },
    #[error("Operação cancelada ao acessar {reference}")]
    Cancelled { reference: String },
    #[error("Recurso não configurado: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Exact message returned when a well-formed search yields nothing.
pub const NO_RESULTS_MESSAGE: &str = "Nenhum resultado encontrado.";

/// Exact message returned when the news index no longer carries headline markers.
pub const HIGHLIGHTS_LAYOUT_MESSAGE: &str =
    "Nenhuma notícia encontrada no layout atual da página.";

impl Error {
    pub fn network(reference: impl Into<String>, cause: impl ToString) -> Self {
        Self::Network {
            reference: reference.into(),
            cause: cause.to_string(),
        }
    }

    pub fn unreadable(reference: impl Into<String>, cause: impl ToString) -> Self {
        Self::UnreadableDocument {
            reference: reference.into(),
            cause: cause.to_string(),
        }
    }

    pub fn no_results(term: impl Into<String>) -> Self {
        Self::NoResults {
            term: term.into(),
            message: NO_RESULTS_MESSAGE.to_string(),
        }
    }

    pub fn layout_mismatch(
        reference: impl Into<String>,
        marker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LayoutMismatch {
            reference: reference.into(),
            marker: marker.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::EmptyContent { .. } => ErrorKind::EmptyContent,
            Self::UnreadableDocument { .. } => ErrorKind::UnreadableDocument,
            Self::LayoutMismatch { .. } => ErrorKind::LayoutMismatch,
            Self::NoResults { .. } => ErrorKind::NoResults,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
        }
    }

    /// The reference (or search term) the failure is about, when there is one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Network { reference, .. }
            | Self::Timeout { reference, .. }
            | Self::EmptyContent { reference }
            | Self::UnreadableDocument { reference, .. }
            | Self::LayoutMismatch { reference, .. }
            | Self::Cancelled { reference } => Some(reference),
            Self::NoResults { term, .. } => Some(term),
            Self::NotConfigured(_) => None,
        }
    }
}

/// Stable classification codes; the policy layer keys its escalation table on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    EmptyContent,
    UnreadableDocument,
    LayoutMismatch,
    NoResults,
    Cancelled,
    NotConfigured,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::EmptyContent => "empty_content",
            Self::UnreadableDocument => "unreadable_document",
            Self::LayoutMismatch => "layout_mismatch",
            Self::NoResults => "no_results",
            Self::Cancelled => "cancelled",
            Self::NotConfigured => "not_configured",
        }
    }

    /// Whether calling the same operation again, unchanged, might succeed.
    pub fn retryable(self) -> bool {
        match self {
            Self::Network | Self::Timeout | Self::Cancelled => true,
            Self::EmptyContent
            | Self::UnreadableDocument
            | Self::LayoutMismatch
            | Self::NoResults
            | Self::NotConfigured => false,
        }
    }

    /// The mechanism worked; the information is simply not there.
    pub fn is_absence(self) -> bool {
        matches!(self, Self::NoResults)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
