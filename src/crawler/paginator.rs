//! Listing pagination state machine
//!
//! The paginator decides which listing page comes next and when the crawl
//! stops. It never fetches anything; the harvester reports what each page
//! contained through [`Paginator::record_page`].

use crate::config::{PaginationScheme, StructuralPolicy};
use crate::state::{PageState, StopReason};
use crate::UrlResult;
use crate::url::page_url;
use tracing::{debug, info, warn};
use url::Url;

/// Limits that end a listing crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    /// First page to fetch; earlier pages are never requested
    pub start_page: u32,
    /// Listing pages to fetch in this run; `None` is unbounded
    pub max_pages: Option<u32>,
    /// Consecutive pages without a new item that end the crawl
    pub stale_page_limit: u32,
    pub structural_policy: StructuralPolicy,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            start_page: 0,
            max_pages: None,
            stale_page_limit: 3,
            structural_policy: StructuralPolicy::TreatAsEmpty,
        }
    }
}

/// Walks the listing pages of one source
#[derive(Debug)]
pub struct Paginator {
    listing: Url,
    scheme: PaginationScheme,
    limits: PaginationLimits,
    state: Option<PageState>,
    current_url: Option<Url>,
    upcoming: Option<(u32, Url)>,
    pages_fetched: u32,
    stale_pages: u32,
    stop_reason: Option<StopReason>,
}

impl Paginator {
    /// Creates a paginator positioned before `limits.start_page`
    ///
    /// # Returns
    ///
    /// * `Ok(Paginator)` - Ready to hand out the first page
    /// * `Err(UrlError)` - The start page cannot be addressed by the scheme
    pub fn new(listing: Url, scheme: PaginationScheme, limits: PaginationLimits) -> UrlResult<Self> {
        let first_url = page_url(&listing, &scheme, limits.start_page)?;
        Ok(Self {
            listing,
            scheme,
            limits,
            state: None,
            current_url: None,
            upcoming: Some((limits.start_page, first_url)),
            pages_fetched: 0,
            stale_pages: 0,
            stop_reason: None,
        })
    }

    /// Hands out the next listing page to fetch
    ///
    /// Returns `None` once the crawl has stopped.
    pub fn next_page(&mut self) -> Option<(u32, Url)> {
        if self.stop_reason.is_some() {
            return None;
        }
        let (page, url) = self.upcoming.take()?;
        self.transition(PageState::Fetching(page));
        self.current_url = Some(url.clone());
        Some((page, url))
    }

    /// Records what the page handed out last contained
    ///
    /// # Arguments
    ///
    /// * `found` - Item cards on the page
    /// * `new_items` - Cards that were neither stored nor seen earlier in the run
    /// * `next_link` - The page's "next" link, used by `next-link` schemes
    ///
    /// # Returns
    ///
    /// The state of the page: `HasItems(n)` or `Empty(n)`
    pub fn record_page(&mut self, found: usize, new_items: usize, next_link: Option<Url>) -> PageState {
        let Some(PageState::Fetching(page)) = self.state else {
            warn!("Page recorded without a page being fetched");
            return self.state.unwrap_or(PageState::Done);
        };

        let page_state = if found > 0 {
            PageState::HasItems(page)
        } else {
            PageState::Empty(page)
        };
        self.transition(page_state);
        self.pages_fetched += 1;

        if new_items == 0 {
            self.stale_pages += 1;
        } else {
            self.stale_pages = 0;
        }
        debug!(
            "Listing page {}: {} cards, {} new, {} stale page(s) in a row",
            page, found, new_items, self.stale_pages
        );

        if found == 0 && self.pages_fetched == 1 {
            self.stop(StopReason::FirstPageEmpty);
        } else if found == 0 && self.limits.structural_policy == StructuralPolicy::Abort {
            self.stop(StopReason::StructuralAbort);
        } else if self.stale_pages >= self.limits.stale_page_limit {
            self.stop(StopReason::NoNewItems);
        } else if self
            .limits
            .max_pages
            .is_some_and(|max| self.pages_fetched >= max)
        {
            self.stop(StopReason::MaxPages);
        } else {
            self.schedule_next(page, next_link);
        }

        page_state
    }

    fn schedule_next(&mut self, page: u32, next_link: Option<Url>) {
        let candidate = match &self.scheme {
            PaginationScheme::NextLink { .. } => match next_link {
                Some(url) => url,
                None => {
                    self.stop(StopReason::NoNextPage);
                    return;
                }
            },
            scheme => match page_url(&self.listing, scheme, page + 1) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Cannot address listing page {}: {}", page + 1, e);
                    self.stop(StopReason::NoNextPage);
                    return;
                }
            },
        };

        if self.current_url.as_ref() == Some(&candidate) {
            warn!("Next listing page resolves to the current URL {}", candidate);
            self.stop(StopReason::PaginationLoop);
            return;
        }
        self.upcoming = Some((page + 1, candidate));
    }

    /// Ends the crawl; the first reason given is kept
    pub fn stop(&mut self, reason: StopReason) {
        if self.stop_reason.is_some() {
            return;
        }
        info!(
            "Pagination stopped after {} page(s): {}",
            self.pages_fetched, reason
        );
        self.stop_reason = Some(reason);
        self.upcoming = None;
        self.transition(PageState::Done);
    }

    fn transition(&mut self, next: PageState) {
        if let Some(current) = self.state {
            debug_assert!(
                current.can_transition_to(&next),
                "illegal page transition {} -> {}",
                current,
                next
            );
        }
        self.state = Some(next);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_done(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// Listing pages recorded in this run
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn state(&self) -> Option<PageState> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Url {
        Url::parse("https://www.apra.gov.au/news-and-publications").unwrap()
    }

    fn paginator(limits: PaginationLimits) -> Paginator {
        Paginator::new(listing(), PaginationScheme::default(), limits).unwrap()
    }

    #[test]
    fn test_pages_ascend_from_start_page() {
        let mut paginator = paginator(PaginationLimits {
            start_page: 2,
            ..PaginationLimits::default()
        });

        let (page, url) = paginator.next_page().unwrap();
        assert_eq!(page, 2);
        assert_eq!(url.query(), Some("page=2"));
        assert_eq!(paginator.record_page(5, 5, None), PageState::HasItems(2));

        let (page, url) = paginator.next_page().unwrap();
        assert_eq!(page, 3);
        assert_eq!(url.query(), Some("page=3"));
    }

    #[test]
    fn test_first_page_empty_stops() {
        let mut paginator = paginator(PaginationLimits::default());
        paginator.next_page().unwrap();
        assert_eq!(paginator.record_page(0, 0, None), PageState::Empty(0));
        assert_eq!(paginator.stop_reason(), Some(StopReason::FirstPageEmpty));
        assert!(paginator.next_page().is_none());
        assert_eq!(paginator.state(), Some(PageState::Done));
    }

    #[test]
    fn test_later_empty_pages_tolerated_until_new_item() {
        let mut paginator = paginator(PaginationLimits::default());

        for (found, new_items) in [(4, 4), (0, 0), (0, 0), (3, 1)] {
            paginator.next_page().unwrap();
            paginator.record_page(found, new_items, None);
            assert!(!paginator.is_done());
        }
        assert_eq!(paginator.pages_fetched(), 4);
    }

    #[test]
    fn test_three_duplicate_pages_stop() {
        let mut paginator = paginator(PaginationLimits::default());

        paginator.next_page().unwrap();
        paginator.record_page(10, 10, None);
        for _ in 0..2 {
            paginator.next_page().unwrap();
            paginator.record_page(10, 0, None);
            assert!(!paginator.is_done());
        }
        paginator.next_page().unwrap();
        paginator.record_page(10, 0, None);
        assert_eq!(paginator.stop_reason(), Some(StopReason::NoNewItems));
    }

    #[test]
    fn test_duplicate_first_pages_count_as_stale() {
        let mut paginator = paginator(PaginationLimits::default());
        for _ in 0..3 {
            paginator.next_page().unwrap();
            paginator.record_page(10, 0, None);
        }
        assert_eq!(paginator.stop_reason(), Some(StopReason::NoNewItems));
    }

    #[test]
    fn test_max_pages() {
        let mut paginator = paginator(PaginationLimits {
            max_pages: Some(2),
            start_page: 5,
            ..PaginationLimits::default()
        });
        paginator.next_page().unwrap();
        paginator.record_page(3, 3, None);
        paginator.next_page().unwrap();
        paginator.record_page(3, 3, None);
        assert_eq!(paginator.stop_reason(), Some(StopReason::MaxPages));
        assert!(paginator.next_page().is_none());
    }

    #[test]
    fn test_abort_policy_stops_on_later_empty_page() {
        let mut paginator = paginator(PaginationLimits {
            structural_policy: StructuralPolicy::Abort,
            ..PaginationLimits::default()
        });
        paginator.next_page().unwrap();
        paginator.record_page(3, 3, None);
        paginator.next_page().unwrap();
        paginator.record_page(0, 0, None);
        assert_eq!(paginator.stop_reason(), Some(StopReason::StructuralAbort));
    }

    #[test]
    fn test_next_link_scheme() {
        let scheme = PaginationScheme::NextLink {
            next_selector: "a.next".to_string(),
        };
        let mut paginator =
            Paginator::new(listing(), scheme, PaginationLimits::default()).unwrap();

        let (_, first) = paginator.next_page().unwrap();
        assert_eq!(first, listing());

        let next = Url::parse("https://www.apra.gov.au/news-and-publications?page=1").unwrap();
        paginator.record_page(2, 2, Some(next.clone()));
        assert_eq!(paginator.next_page().unwrap(), (1, next.clone()));

        paginator.record_page(2, 2, Some(next));
        assert_eq!(paginator.stop_reason(), Some(StopReason::PaginationLoop));
    }

    #[test]
    fn test_next_link_missing() {
        let scheme = PaginationScheme::NextLink {
            next_selector: "a.next".to_string(),
        };
        let mut paginator =
            Paginator::new(listing(), scheme, PaginationLimits::default()).unwrap();
        paginator.next_page().unwrap();
        paginator.record_page(2, 2, None);
        assert_eq!(paginator.stop_reason(), Some(StopReason::NoNextPage));
    }

    #[test]
    fn test_next_link_cannot_start_later() {
        let scheme = PaginationScheme::NextLink {
            next_selector: "a.next".to_string(),
        };
        let limits = PaginationLimits {
            start_page: 1,
            ..PaginationLimits::default()
        };
        assert!(Paginator::new(listing(), scheme, limits).is_err());
    }

    #[test]
    fn test_fragment_pagination() {
        let scheme = PaginationScheme::Fragment {
            template: "first={offset}".to_string(),
            start: 0,
            step: 10,
        };
        let listing = Url::parse("https://www.rbnz.govt.nz/news").unwrap();
        let mut paginator = Paginator::new(listing, scheme, PaginationLimits::default()).unwrap();
        paginator.next_page().unwrap();
        paginator.record_page(10, 10, None);
        let (page, url) = paginator.next_page().unwrap();
        assert_eq!(page, 1);
        assert_eq!(url.fragment(), Some("first=10"));
    }

    #[test]
    fn test_stop_keeps_first_reason() {
        let mut paginator = paginator(PaginationLimits::default());
        paginator.next_page().unwrap();
        paginator.stop(StopReason::Cancelled);
        paginator.stop(StopReason::FetchFailed);
        assert_eq!(paginator.stop_reason(), Some(StopReason::Cancelled));
    }
}
