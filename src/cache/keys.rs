//! Cache key derivation.
//!
//! Keys are `<namespace><sha256 of the canonical filter JSON>`. Only
//! [`AppliedFilters`] feeds the hash, so request ids, timestamps and other
//! request metadata can never split the cache.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{AppliedFilters, AppliedGeo};

/// Root of every key this crate writes. Swept by `invalidate_cache`.
pub const LEADS_NAMESPACE: &str = "leads:";
pub const SEARCH_PREFIX: &str = "leads:search:";
pub const PREVIEW_PREFIX: &str = "leads:preview:";

// Bump when the cached payload shape changes.
const KEY_VERSION: &str = "v1";

/// Fields that change a preview. Sort and pagination do not.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewScope<'a> {
    industry: &'a Option<String>,
    sub_niche: &'a Option<String>,
    cuisine: &'a Option<String>,
    sport: &'a Option<String>,
    tattoo_style: &'a Option<String>,
    country: &'a Option<String>,
    city: &'a Option<String>,
    has_email: bool,
    has_phone: bool,
    has_website: bool,
    has_social_media: bool,
    verified: bool,
    geo: &'a Option<AppliedGeo>,
}

impl<'a> From<&'a AppliedFilters> for PreviewScope<'a> {
    fn from(f: &'a AppliedFilters) -> Self {
        Self {
            industry: &f.industry,
            sub_niche: &f.sub_niche,
            cuisine: &f.cuisine,
            sport: &f.sport,
            tattoo_style: &f.tattoo_style,
            country: &f.country,
            city: &f.city,
            has_email: f.has_email,
            has_phone: f.has_phone,
            has_website: f.has_website,
            has_social_media: f.has_social_media,
            verified: f.verified,
            geo: &f.geo,
        }
    }
}

pub fn search_key(filters: &AppliedFilters) -> String {
    format!("{}{}", SEARCH_PREFIX, digest(filters))
}

pub fn preview_key(filters: &AppliedFilters) -> String {
    format!("{}{}", PREVIEW_PREFIX, digest(&PreviewScope::from(filters)))
}

fn digest<T: Serialize>(value: &T) -> String {
    // Plain structs of strings, bools and finite floats always serialize.
    let canonical = serde_json::to_string(value).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(KEY_VERSION.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
