use crate::config::PaginationScheme;
use crate::UrlError;
use url::Url;

/// Resolves the URL of listing page `page` (zero-based) for a pagination scheme
///
/// `query` schemes replace (or add) one query parameter and keep the rest of the
/// listing URL's query. `fragment` schemes put the rendered template in the
/// fragment, for listings whose client-side search reads its offset from there.
/// `next-link` listings can only address page 0 directly; later pages come from
/// the "next" link of the page before.
///
/// # Arguments
///
/// * `listing` - URL of listing page 0
/// * `scheme` - Pagination scheme of the source
/// * `page` - Zero-based page index
///
/// # Returns
///
/// * `Ok(Url)` - URL of the requested page
/// * `Err(UrlError::UnaddressablePage)` - `next-link` scheme and `page > 0`
pub fn page_url(listing: &Url, scheme: &PaginationScheme, page: u32) -> Result<Url, UrlError> {
    match scheme {
        PaginationScheme::Query { param, start, step } => {
            let offset = offset_for(*start, *step, page);
            let mut url = listing.clone();
            let kept: Vec<(String, String)> = listing
                .query_pairs()
                .filter(|(key, _)| key != param.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(param, &offset.to_string());
            Ok(url)
        }
        PaginationScheme::Fragment {
            template,
            start,
            step,
        } => {
            let offset = offset_for(*start, *step, page);
            let mut url = listing.clone();
            url.set_fragment(Some(&template.replace("{offset}", &offset.to_string())));
            Ok(url)
        }
        PaginationScheme::NextLink { .. } => {
            if page == 0 {
                Ok(listing.clone())
            } else {
                Err(UrlError::UnaddressablePage { page })
            }
        }
    }
}

fn offset_for(start: u32, step: u32, page: u32) -> u64 {
    u64::from(start) + u64::from(page) * u64::from(step)
}
