//! Filter compiler.
//!
//! Turns a raw [`SearchFilter`] into canonical [`AppliedFilters`] plus a
//! [`Predicate`]: a conjunction of per-field conditions held as plain data.
//! Stores translate the predicate into their own query language.

use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoRadius};
use crate::models::{AppliedFilters, DistanceUnit, Lead, SearchFilter, SortKey};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualityField {
    Industry,
    SubNiche,
    Cuisine,
    Sport,
    TattooStyle,
    Country,
    City,
}

impl EqualityField {
    /// Column name in the `leads` table.
    pub fn column(self) -> &'static str {
        match self {
            EqualityField::Industry => "industry",
            EqualityField::SubNiche => "sub_niche",
            EqualityField::Cuisine => "cuisine",
            EqualityField::Sport => "sport",
            EqualityField::TattooStyle => "tattoo_style",
            EqualityField::Country => "country",
            EqualityField::City => "city",
        }
    }

    pub fn value_of(self, lead: &Lead) -> Option<&str> {
        match self {
            EqualityField::Industry => lead.industry.as_deref(),
            EqualityField::SubNiche => lead.sub_niche.as_deref(),
            EqualityField::Cuisine => lead.cuisine.as_deref(),
            EqualityField::Sport => lead.sport.as_deref(),
            EqualityField::TattooStyle => lead.tattoo_style.as_deref(),
            EqualityField::Country => lead.country.as_deref(),
            EqualityField::City => lead.city.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceField {
    Email,
    Phone,
    Website,
    SocialMedia,
}

impl PresenceField {
    pub fn is_present(self, lead: &Lead) -> bool {
        match self {
            PresenceField::Email => lead.has_email(),
            PresenceField::Phone => lead.has_phone(),
            PresenceField::Website => lead.has_website(),
            PresenceField::SocialMedia => lead.has_social_media(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Equals { field: EqualityField, value: String },
    Present(PresenceField),
    Verified,
    WithinRadius(GeoRadius),
}

impl Condition {
    pub fn matches(&self, lead: &Lead) -> bool {
        match self {
            Condition::Equals { field, value } => field.value_of(lead) == Some(value.as_str()),
            Condition::Present(field) => field.is_present(lead),
            Condition::Verified => lead.is_verified,
            Condition::WithinRadius(radius) => radius.contains(lead.latitude, lead.longitude),
        }
    }
}

/// Conjunction of conditions. Empty matches every lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Builds the predicate for an already canonical filter set.
    ///
    /// Conditions are emitted in a fixed field order, so equal filter sets
    /// always produce equal predicates.
    pub fn from_applied(applied: &AppliedFilters) -> Self {
        let mut conditions = Vec::new();

        let equalities = [
            (EqualityField::Industry, &applied.industry),
            (EqualityField::SubNiche, &applied.sub_niche),
            (EqualityField::Cuisine, &applied.cuisine),
            (EqualityField::Sport, &applied.sport),
            (EqualityField::TattooStyle, &applied.tattoo_style),
            (EqualityField::Country, &applied.country),
            (EqualityField::City, &applied.city),
        ];
        for (field, value) in equalities {
            if let Some(value) = value {
                conditions.push(Condition::Equals {
                    field,
                    value: value.clone(),
                });
            }
        }

        let presences = [
            (PresenceField::Email, applied.has_email),
            (PresenceField::Phone, applied.has_phone),
            (PresenceField::Website, applied.has_website),
            (PresenceField::SocialMedia, applied.has_social_media),
        ];
        for (field, wanted) in presences {
            if wanted {
                conditions.push(Condition::Present(field));
            }
        }

        if applied.verified {
            conditions.push(Condition::Verified);
        }

        if let Some(geo) = &applied.geo {
            conditions.push(Condition::WithinRadius(GeoRadius::from_applied(geo)));
        }

        Self { conditions }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        self.conditions.iter().all(|c| c.matches(lead))
    }
}

/// Output of [`compile_filters`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSearch {
    pub applied: AppliedFilters,
    pub predicate: Predicate,
    pub sort: SortKey,
    pub limit: i64,
    pub offset: i64,
}

/// Compiles a raw search request. Pure; never fails.
pub fn compile_filters(filter: &SearchFilter) -> CompiledSearch {
    let applied = canonicalize(filter);
    let predicate = Predicate::from_applied(&applied);
    let limit = i64::from(applied.limit);
    let offset = i64::from(applied.page - 1) * limit;

    CompiledSearch {
        sort: applied.sort,
        applied,
        predicate,
        limit,
        offset,
    }
}

/// Applies defaults and drops blank or malformed optional input.
pub fn canonicalize(filter: &SearchFilter) -> AppliedFilters {
    let unit = DistanceUnit::parse(filter.unit.as_deref());

    AppliedFilters {
        industry: clean(&filter.industry),
        sub_niche: clean(&filter.sub_niche),
        cuisine: clean(&filter.cuisine),
        sport: clean(&filter.sport),
        tattoo_style: clean(&filter.tattoo_style),
        country: clean(&filter.country),
        city: clean(&filter.city),
        has_email: filter.has_email,
        has_phone: filter.has_phone,
        has_website: filter.has_website,
        has_social_media: filter.has_social_media,
        verified: filter.verified,
        geo: geo::validate_triple(filter.latitude, filter.longitude, filter.radius, unit),
        sort: SortKey::parse(filter.sort.as_deref()),
        page: match filter.page {
            Some(page) if page >= 1 => page,
            _ => DEFAULT_PAGE,
        },
        limit: match filter.limit {
            Some(limit) if limit >= 1 => limit.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        },
    }
}

// An unset filter must never turn into `field = ''`.
fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
