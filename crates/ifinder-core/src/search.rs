use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Content types the portal search can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Page,
    Event,
    File,
    News,
    Notice,
    Bid,
    Opportunity,
    Media,
    Image,
    Link,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    None,
    Yesterday,
    LastWeek,
    LastMonth,
}

impl DateRange {
    /// Fixed day offsets; "last month" is 30 days, not calendar arithmetic.
    pub fn days_back(self) -> Option<i64> {
        match self {
            Self::None => None,
            Self::Yesterday => Some(1),
            Self::LastWeek => Some(7),
            Self::LastMonth => Some(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Relevance,
    Date,
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    pub term: String,
    pub item_types: BTreeSet<ItemType>,
    pub date_range: DateRange,
    pub sort: SortOrder,
}

impl SearchFilter {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResultEntry {
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
}

/// Parsed result page: at most ten entries in backend order plus the reported total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchListing {
    pub term: String,
    pub total: usize,
    pub entries: Vec<SearchResultEntry>,
}

impl SearchListing {
    /// Header line with the total and the term, then one block per entry.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Encontrados {} resultados para '{}':\n",
            self.total, self.term
        );
        for (i, e) in self.entries.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{}. {}\n   URL: {}\n", i + 1, e.title, e.url));
            if let Some(s) = e.summary.as_deref() {
                out.push_str(&format!("   {s}\n"));
            }
        }
        out.trim_end().to_string()
    }
}
