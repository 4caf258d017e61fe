//! URL handling module
//!
//! This module provides identity canonicalization, listing page addressing and
//! the link resolution rules shared by the listing parser and the HTML extractor.

mod normalize;
mod pagination;

// Re-export main functions
pub use normalize::canonicalize;
pub use pagination::page_url;

use url::Url;

/// Resolves an `href` against a base URL, applying the link filtering rules
///
/// Returns `None` for:
/// - empty and fragment-only (`#...`) hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` targets
/// - anything that does not resolve to an http(s) URL
///
/// The fragment of the resolved URL is removed.
///
/// # Examples
///
/// ```
/// use notice_harvester::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/news/").unwrap();
/// let link = resolve_link("item-1#comments", &base).unwrap();
/// assert_eq!(link.as_str(), "https://example.com/news/item-1");
/// assert!(resolve_link("mailto:press@example.com", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    absolute.set_fragment(None);
    Some(absolute)
}

/// Returns the lowercase extension of the URL's last path segment, if any
pub fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (_, extension) = segment.rsplit_once('.')?;
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_ascii_lowercase())
    }
}

/// Checks whether the URL's path ends in one of the given extensions
pub fn has_extension(url: &Url, extensions: &[String]) -> bool {
    path_extension(url)
        .map(|ext| extensions.iter().any(|candidate| candidate.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}
