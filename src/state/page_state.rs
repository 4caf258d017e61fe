/// Listing page states driving pagination
///
/// A crawl moves `Fetching(n)` to `HasItems(n)` or `Empty(n)` once the listing
/// page is parsed, then either on to `Fetching(n + 1)` or to `Done`.
use std::fmt;

/// Represents the state of the listing crawl after the last transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Listing page `n` is being fetched
    Fetching(u32),

    /// Listing page `n` contained at least one item card
    HasItems(u32),

    /// Listing page `n` contained no item cards
    Empty(u32),

    /// Pagination has finished
    Done,
}

impl PageState {
    /// Returns true once pagination has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Page index the state refers to, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Fetching(n) | Self::HasItems(n) | Self::Empty(n) => Some(*n),
            Self::Done => None,
        }
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// Pages only move forward: a parsed page may be followed by the fetch of a
    /// strictly later page, and every non-terminal state may end the crawl.
    pub fn can_transition_to(&self, next: &PageState) -> bool {
        match (self, next) {
            (Self::Done, _) => false,
            (_, Self::Done) => true,
            (Self::Fetching(n), Self::HasItems(m)) | (Self::Fetching(n), Self::Empty(m)) => n == m,
            (Self::HasItems(n), Self::Fetching(m)) | (Self::Empty(n), Self::Fetching(m)) => m > n,
            _ => false,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetching(_) => "fetching",
            Self::HasItems(_) => "has_items",
            Self::Empty(_) => "empty",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page() {
            Some(page) => write!(f, "{}({})", self.name(), page),
            None => write!(f, "{}", self.name()),
        }
    }
}
