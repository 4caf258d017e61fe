use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a source's listing crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The run's page limit was reached
    MaxPages,

    /// The first page of the run had no item cards
    FirstPageEmpty,

    /// Several consecutive pages contributed no new item
    NoNewItems,

    /// The next page URL equals the current one
    PaginationLoop,

    /// A `next-link` listing had no next link
    NoNextPage,

    /// A listing page had no item cards under the `abort` structural policy
    StructuralAbort,

    /// A listing page could not be fetched after retries
    FetchFailed,

    /// Cancellation was requested
    Cancelled,
}

impl StopReason {
    /// Converts the reason to its ledger string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::MaxPages => "max_pages",
            Self::FirstPageEmpty => "first_page_empty",
            Self::NoNewItems => "no_new_items",
            Self::PaginationLoop => "pagination_loop",
            Self::NoNextPage => "no_next_page",
            Self::StructuralAbort => "structural_abort",
            Self::FetchFailed => "fetch_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a reason from its ledger string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "max_pages" => Some(Self::MaxPages),
            "first_page_empty" => Some(Self::FirstPageEmpty),
            "no_new_items" => Some(Self::NoNewItems),
            "pagination_loop" => Some(Self::PaginationLoop),
            "no_next_page" => Some(Self::NoNextPage),
            "structural_abort" => Some(Self::StructuralAbort),
            "fetch_failed" => Some(Self::FetchFailed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true when the crawl ended because something went wrong
    pub fn is_abnormal(&self) -> bool {
        matches!(
            self,
            Self::FirstPageEmpty | Self::StructuralAbort | Self::FetchFailed
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
