//! Geospatial radius predicate.
//!
//! Radii are normalised to meters before they reach a store. The Postgres store
//! pushes the predicate down as `ST_DWithin` on a geography column so the GiST
//! index does the work; the in-memory store evaluates the haversine distance.

use serde::{Deserialize, Serialize};

use crate::models::{AppliedGeo, DistanceUnit};

pub const METERS_PER_KM: f64 = 1000.0;
pub const METERS_PER_MILE: f64 = 1609.34;

/// Mean earth radius used by the haversine formula.
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// "Stored point lies within `radius_meters` of (`latitude`, `longitude`)".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRadius {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl GeoRadius {
    pub fn new(latitude: f64, longitude: f64, radius: f64, unit: DistanceUnit) -> Self {
        Self {
            latitude,
            longitude,
            radius_meters: to_meters(radius, unit),
        }
    }

    pub fn from_applied(geo: &AppliedGeo) -> Self {
        Self::new(geo.latitude, geo.longitude, geo.radius, geo.unit)
    }

    /// Leads without both coordinates never match.
    pub fn contains(&self, latitude: Option<f64>, longitude: Option<f64>) -> bool {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                haversine_meters(self.latitude, self.longitude, lat, lon) <= self.radius_meters
            }
            _ => false,
        }
    }
}

pub fn to_meters(radius: f64, unit: DistanceUnit) -> f64 {
    match unit {
        DistanceUnit::Km => radius * METERS_PER_KM,
        DistanceUnit::Miles => radius * METERS_PER_MILE,
    }
}

/// Validates a raw (lat, lon, radius) triple.
///
/// Returns `None` unless all three are present and usable; a partial or
/// malformed triple means "no geospatial filter", never an error.
pub fn validate_triple(
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius: Option<f64>,
    unit: DistanceUnit,
) -> Option<AppliedGeo> {
    let (lat, lon, radius) = (latitude?, longitude?, radius?);

    if !lat.is_finite() || !lon.is_finite() || !radius.is_finite() {
        return None;
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) || radius <= 0.0 {
        return None;
    }

    Some(AppliedGeo {
        latitude: normalize_zero(lat),
        longitude: normalize_zero(lon),
        radius,
        unit,
    })
}

// -0.0 and 0.0 describe the same point but serialize differently.
fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}
