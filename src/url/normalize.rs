use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "mc_cid",
    "_ga",
];

/// Produces the canonical form of an item URL used for identity hashing
///
/// # Canonicalization Steps
///
/// 1. Upgrade `http` to `https`
/// 2. Lowercase the host and drop a leading `www.`
/// 3. Remove dot segments and duplicate slashes; trim the trailing slash (except root)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters and sort the rest, or drop the
///    whole query when `strip_query` is set
///
/// Two URLs that differ only in these respects name the same item.
///
/// # Arguments
///
/// * `url` - Absolute item URL
/// * `strip_query` - Drop the entire query string
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - The URL is not http(s) or has no host
///
/// # Examples
///
/// ```
/// use notice_harvester::url::canonicalize;
/// use url::Url;
///
/// let url = Url::parse("http://WWW.Example.com/news/item/?utm_source=x#top").unwrap();
/// let canonical = canonicalize(&url, false).unwrap();
/// assert_eq!(canonical.as_str(), "https://example.com/news/item");
/// ```
pub fn canonicalize(url: &Url, strip_query: bool) -> Result<Url, UrlError> {
    let mut url = url.clone();

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| UrlError::InvalidScheme(url.scheme().to_string()))?;
    }

    let host = url
        .host_str()
        .map(|host| host.to_lowercase())
        .ok_or(UrlError::MissingHost)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if strip_query {
        url.set_query(None);
    } else if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
