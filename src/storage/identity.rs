use crate::config::IdentityMode;
use crate::url::canonicalize;
use crate::UrlResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Number of hex characters kept from the SHA-256 digest
const IDENTITY_HEX_LEN: usize = 16;

/// Stable identity of a harvested item across runs
///
/// Derived from the canonical item URL (and optionally its title), so the same
/// item reached through cosmetically different links maps to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    /// Derives the identity of an item
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute item URL as found on the listing page
    /// * `title` - Listing title, used only with `IdentityMode::UrlAndTitle`
    /// * `mode` - Identity strictness configured for the source
    /// * `strip_query` - Ignore the query string entirely
    ///
    /// # Returns
    ///
    /// * `Ok(ItemIdentity)` - 16 hex characters of SHA-256
    /// * `Err(UrlError)` - The URL cannot be canonicalized
    pub fn derive(
        url: &Url,
        title: Option<&str>,
        mode: IdentityMode,
        strip_query: bool,
    ) -> UrlResult<Self> {
        let canonical = canonicalize(url, strip_query)?;

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_str().as_bytes());
        if mode == IdentityMode::UrlAndTitle {
            let title = title.map(str::trim).unwrap_or_default();
            hasher.update(b"\n");
            hasher.update(title.as_bytes());
        }

        let digest = hex::encode(hasher.finalize());
        Ok(Self(digest[..IDENTITY_HEX_LEN].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
