use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A business record in the lead directory.
///
/// Read-only from the search core's perspective; ingestion and scoring jobs own writes.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: Uuid,
    /// Business name.
    pub name: String,
    /// Industry (e.g., "restaurant", "gym").
    pub industry: Option<String>,
    /// Narrower niche within the industry.
    pub sub_niche: Option<String>,
    /// Cuisine, for restaurants.
    pub cuisine: Option<String>,
    /// Sport, for gyms and clubs.
    pub sport: Option<String>,
    /// Tattoo style, for studios.
    pub tattoo_style: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    /// Social network name -> profile URL.
    pub social_media: Option<serde_json::Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Whether the lead's contact data has been verified.
    pub is_verified: bool,
    /// Quality score in [0, 100].
    pub quality_score: i32,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn has_email(&self) -> bool {
        has_text(&self.email)
    }

    pub fn has_phone(&self) -> bool {
        has_text(&self.phone)
    }

    pub fn has_website(&self) -> bool {
        has_text(&self.website)
    }

    pub fn has_social_media(&self) -> bool {
        match &self.social_media {
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            _ => false,
        }
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Per-tenant usage counter row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UsageCounter {
    pub tenant_id: Uuid,
    /// Usage consumed since `last_reset_at`.
    pub consumed: i64,
    /// Tier-dependent cap for one window.
    #[sqlx(rename = "usage_limit")]
    pub limit: i64,
    pub last_reset_at: DateTime<Utc>,
}

// ============ Search Request Models ============

/// Raw search request as received from the HTTP layer.
///
/// Every field is optional; [`crate::filters::compile_filters`] applies defaults
/// and drops anything malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilter {
    pub industry: Option<String>,
    pub sub_niche: Option<String>,
    pub cuisine: Option<String>,
    pub sport: Option<String>,
    pub tattoo_style: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub has_email: bool,
    pub has_phone: bool,
    pub has_website: bool,
    pub has_social_media: bool,
    pub verified: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    /// "km" or "miles".
    pub unit: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Km,
    Miles,
}

impl DistanceUnit {
    /// Parses a unit name. Anything unrecognised is kilometers.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("mi") | Some("mile") | Some("miles") => DistanceUnit::Miles,
            _ => DistanceUnit::Km,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Newest,
    Oldest,
    Quality,
    Name,
}

impl SortKey {
    /// Parses a sort key. Unknown or missing keys fall back to newest first.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("oldest") => SortKey::Oldest,
            Some("quality") | Some("quality_score") => SortKey::Quality,
            Some("name") => SortKey::Name,
            _ => SortKey::Newest,
        }
    }
}

/// Geospatial filter after validation, echoed back as applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedGeo {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub unit: DistanceUnit,
}

/// Canonical filter set: defaults applied, blanks removed.
///
/// Field order is fixed, so serializing this value is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub industry: Option<String>,
    pub sub_niche: Option<String>,
    pub cuisine: Option<String>,
    pub sport: Option<String>,
    pub tattoo_style: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub has_email: bool,
    pub has_phone: bool,
    pub has_website: bool,
    pub has_social_media: bool,
    pub verified: bool,
    pub geo: Option<AppliedGeo>,
    pub sort: SortKey,
    pub page: u32,
    pub limit: u32,
}

// ============ Response Models ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let limit_i = i64::from(limit.max(1));
        let total_pages = if total <= 0 {
            0
        } else {
            (total + limit_i - 1) / limit_i
        };

        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: i64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub data: Vec<Lead>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
}

/// Raw aggregate counts returned by a [`crate::store::LeadStore`].
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub total: i64,
    pub with_email: i64,
    pub with_phone: i64,
    pub verified: i64,
    /// `None` when nothing matched.
    pub avg_quality: Option<f64>,
}

/// Unmetered statistics over a filter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStats {
    pub total: i64,
    pub with_email: i64,
    pub with_email_percentage: f64,
    pub with_phone: i64,
    pub with_phone_percentage: f64,
    pub verified: i64,
    pub verified_percentage: f64,
    pub average_quality_score: f64,
}

impl PreviewStats {
    pub fn from_counts(counts: &AggregateCounts) -> Self {
        if counts.total <= 0 {
            return Self::default();
        }

        let pct = |part: i64| round_one_decimal(part as f64 * 100.0 / counts.total as f64);

        Self {
            total: counts.total,
            with_email: counts.with_email,
            with_email_percentage: pct(counts.with_email),
            with_phone: counts.with_phone,
            with_phone_percentage: pct(counts.with_phone),
            verified: counts.verified,
            verified_percentage: pct(counts.verified),
            average_quality_score: counts.avg_quality.map(round_one_decimal).unwrap_or(0.0),
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Informational view of a tenant's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    pub consumed: i64,
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(1, 50, 101);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let last = Pagination::new(3, 50, 101);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }

    #[test]
    fn pagination_with_no_results() {
        let p = Pagination::new(1, 50, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn preview_from_zero_counts_is_all_zero() {
        let stats = PreviewStats::from_counts(&AggregateCounts::default());
        assert_eq!(stats, PreviewStats::default());
        assert!(!stats.with_email_percentage.is_nan());
    }

    #[test]
    fn preview_percentages_round_to_one_decimal() {
        let stats = PreviewStats::from_counts(&AggregateCounts {
            total: 3,
            with_email: 1,
            with_phone: 2,
            verified: 3,
            avg_quality: Some(71.666),
        });
        assert_eq!(stats.with_email_percentage, 33.3);
        assert_eq!(stats.with_phone_percentage, 66.7);
        assert_eq!(stats.verified_percentage, 100.0);
        assert_eq!(stats.average_quality_score, 71.7);
    }

    #[test]
    fn unit_and_sort_parsing_is_permissive() {
        assert_eq!(DistanceUnit::parse(Some("Miles")), DistanceUnit::Miles);
        assert_eq!(DistanceUnit::parse(Some("furlongs")), DistanceUnit::Km);
        assert_eq!(DistanceUnit::parse(None), DistanceUnit::Km);
        assert_eq!(SortKey::parse(Some("quality")), SortKey::Quality);
        assert_eq!(SortKey::parse(Some("random")), SortKey::Newest);
    }
}
