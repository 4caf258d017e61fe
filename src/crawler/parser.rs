//! Listing page parser
//!
//! This module turns a listing page into item references:
//! - Item cards are located with the source's `item` selector
//! - Each card yields a link, and optionally a title, date text and extra fields
//! - Identities are checked against the store and the references already seen
//!   this run, so known items are never fetched again
//!
//! Nothing here touches the network.

use crate::config::{IdentityMode, PaginationScheme, SourceConfig};
use crate::extract::text::collapse_whitespace;
use crate::storage::{ItemIdentity, ItemStore};
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use url::Url;

/// One item card found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    pub url: Url,
    pub title: Option<String>,
    pub date_text: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// A parsed listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Cards in markup order, without repeated links
    pub cards: Vec<ListingCard>,
    /// Target of the "next" link, when the source paginates that way
    pub next_link: Option<Url>,
}

/// An item that still has to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    pub url: Url,
    pub identity: ItemIdentity,
    pub listing_title: Option<String>,
    pub listing_date: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Outcome of harvesting one listing page
#[derive(Debug, Clone, Default)]
pub struct PageHarvest {
    /// New references in markup order
    pub fresh: Vec<ItemReference>,
    /// Cards whose identity was already stored or already seen this run
    pub duplicates: usize,
    /// Item cards on the page
    pub found: usize,
    pub next_link: Option<Url>,
}

/// Compiled listing selectors and identity rules for one source
#[derive(Debug)]
pub struct ListingParser {
    item: Selector,
    link: Option<Selector>,
    title: Option<Selector>,
    date: Option<Selector>,
    extra: Vec<(String, Selector)>,
    next: Option<Selector>,
    /// First link inside a card when no `link` selector is configured
    anchor: Selector,
    identity: IdentityMode,
    strip_query: bool,
}

impl ListingParser {
    /// Compiles the listing selectors of a source
    ///
    /// # Returns
    ///
    /// * `Ok(ListingParser)` - Ready to parse listing pages
    /// * `Err(ConfigError)` - A selector failed to parse
    pub fn for_source(source: &SourceConfig) -> Result<Self, ConfigError> {
        let selectors = &source.selectors;
        let next = match &source.pagination {
            PaginationScheme::NextLink { next_selector } => Some(compile(next_selector)?),
            _ => None,
        };

        Ok(Self {
            item: compile(&selectors.item)?,
            link: selectors.link.as_deref().map(compile).transpose()?,
            title: selectors.title.as_deref().map(compile).transpose()?,
            date: selectors.date.as_deref().map(compile).transpose()?,
            extra: selectors
                .extra
                .iter()
                .map(|(field, selector)| Ok((field.clone(), compile(selector)?)))
                .collect::<Result<Vec<_>, ConfigError>>()?,
            next,
            anchor: compile("a[href]")?,
            identity: source.identity,
            strip_query: source.strip_query,
        })
    }

    /// Finds the item cards and the next link on a listing page
    ///
    /// Links pointing back at the page itself are skipped, as are repeated
    /// links on the same page.
    pub fn parse(&self, html: &str, page_url: &Url) -> ListingPage {
        let document = Html::parse_document(html);
        let mut page_itself = page_url.clone();
        page_itself.set_fragment(None);

        let mut on_page = HashSet::new();
        let mut cards = Vec::new();

        for card in document.select(&self.item) {
            let Some((url, link_text)) = self.card_link(card, page_url) else {
                debug!("Item card without a usable link on {}", page_url);
                continue;
            };
            if url == page_itself || !on_page.insert(url.clone()) {
                continue;
            }

            let title = self
                .title
                .as_ref()
                .and_then(|selector| select_text(card, selector))
                .or(link_text);
            let date_text = self.date.as_ref().and_then(|selector| {
                card.select(selector).next().and_then(|element| {
                    element
                        .value()
                        .attr("datetime")
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                        .or_else(|| non_empty(element_text(element)))
                })
            });
            let extra = self
                .extra
                .iter()
                .filter_map(|(field, selector)| {
                    select_text(card, selector).map(|value| (field.clone(), value))
                })
                .collect();

            cards.push(ListingCard {
                url,
                title,
                date_text,
                extra,
            });
        }

        let next_link = self.next.as_ref().and_then(|selector| {
            document
                .select(selector)
                .filter_map(|element| element.value().attr("href"))
                .find_map(|href| resolve_link(href, page_url))
        });

        ListingPage { cards, next_link }
    }

    /// Turns a listing page into fresh item references and a duplicate count
    ///
    /// # Arguments
    ///
    /// * `html` - The listing page
    /// * `page_url` - Where the page was fetched from
    /// * `store` - Items harvested by earlier runs
    /// * `seen` - Identities already referenced in this run; updated in place
    /// * `force` - Treat stored items as fresh so they are harvested again
    pub fn harvest_page(
        &self,
        html: &str,
        page_url: &Url,
        store: &dyn ItemStore,
        seen: &mut HashSet<ItemIdentity>,
        force: bool,
    ) -> PageHarvest {
        let listing = self.parse(html, page_url);
        let mut harvest = PageHarvest {
            found: listing.cards.len(),
            next_link: listing.next_link,
            ..PageHarvest::default()
        };

        for card in listing.cards {
            let identity = match ItemIdentity::derive(
                &card.url,
                card.title.as_deref(),
                self.identity,
                self.strip_query,
            ) {
                Ok(identity) => identity,
                Err(e) => {
                    debug!("Skipping {}: {}", card.url, e);
                    continue;
                }
            };

            if !seen.insert(identity.clone()) || (!force && store.exists(&identity)) {
                harvest.duplicates += 1;
                continue;
            }

            harvest.fresh.push(ItemReference {
                url: card.url,
                identity,
                listing_title: card.title,
                listing_date: card.date_text,
                extra: card.extra,
            });
        }

        harvest
    }

    fn card_link(&self, card: ElementRef<'_>, page_url: &Url) -> Option<(Url, Option<String>)> {
        let anchor = match &self.link {
            Some(selector) => card.select(selector).next(),
            None if card.value().name() == "a" => Some(card),
            None => card.select(&self.anchor).next(),
        }?;
        let url = resolve_link(anchor.value().attr("href")?, page_url)?;
        Some((url, non_empty(element_text(anchor))))
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn select_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector).next().and_then(|element| non_empty(element_text(element)))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
