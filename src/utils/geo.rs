// utils/geo.rs
use serde::{Deserialize, Serialize};

use crate::error::ErrorMessage;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 20_000.0;
pub const MAX_SEARCH_RADIUS_M: f64 = 500_000.0;

/// A WGS84 point. Construct through [`GeoPoint::new`] so that range checks
/// and the (0,0) "no location" sentinel are always applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, String> {
        if !longitude.is_finite() || !latitude.is_finite() {
            return Err("Coordinates must be finite numbers".to_string());
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err("Longitude must be between -180 and 180".to_string());
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err("Latitude must be between -90 and 90".to_string());
        }
        if longitude == 0.0 && latitude == 0.0 {
            return Err(ErrorMessage::LocationUnavailable.to_string());
        }

        Ok(GeoPoint { longitude, latitude })
    }

    /// Builds a point from optional stored columns, treating the sentinel as absent.
    pub fn from_columns(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(lon), Some(lat)) => GeoPoint::new(lon, lat).ok(),
            _ => None,
        }
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }
}

pub fn validate_radius(radius_m: f64) -> Result<f64, String> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err("maxDistance must be a positive number of metres".to_string());
    }
    if radius_m > MAX_SEARCH_RADIUS_M {
        return Err(format!("maxDistance cannot exceed {} metres", MAX_SEARCH_RADIUS_M));
    }
    Ok(radius_m)
}

/// Keeps candidates strictly inside the radius and orders them nearest first.
/// `locate` returns `None` for candidates without a usable location.
pub fn within_radius_sorted<T, F>(
    origin: &GeoPoint,
    radius_m: f64,
    candidates: Vec<T>,
    locate: F,
) -> Vec<(T, f64)>
where
    F: Fn(&T) -> Option<GeoPoint>,
{
    let mut ranked: Vec<(T, f64)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let point = locate(&candidate)?;
            let distance = origin.distance_to(&point);
            (distance <= radius_m).then_some((candidate, distance))
        })
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

/// SQL fragment computing the haversine distance in metres between the row's
/// `longitude`/`latitude` columns and the bound point (`$1` lon, `$2` lat).
pub const SQL_DISTANCE_M: &str = "6371000 * 2 * asin(least(1.0, sqrt(\
    power(sin(radians(latitude - $2) / 2), 2) + \
    cos(radians($2)) * cos(radians(latitude)) * \
    power(sin(radians(longitude - $1) / 2), 2))))";

/// Index-friendly prefilter for a radius search. Longitudes are split into two
/// spans so a circle crossing the antimeridian is still covered; when it does
/// not cross, both spans are the same.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub lon_spans: [(f64, f64); 2],
}

const ALL_LONGITUDES: (f64, f64) = (-180.0, 180.0);

impl BoundingBox {
    pub fn around(origin: &GeoPoint, radius_m: f64) -> Self {
        let angular = radius_m / EARTH_RADIUS_M;
        let lat_delta = angular.to_degrees();
        let min_lat = origin.latitude - lat_delta;
        let max_lat = origin.latitude + lat_delta;

        // A circle reaching a pole spans every meridian.
        if min_lat <= -90.0 || max_lat >= 90.0 {
            return BoundingBox {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                lon_spans: [ALL_LONGITUDES; 2],
            };
        }

        let ratio = angular.sin() / origin.latitude.to_radians().cos();
        let lon_delta = if ratio >= 1.0 { 180.0 } else { ratio.asin().to_degrees() };
        if lon_delta >= 180.0 {
            return BoundingBox {
                min_lat,
                max_lat,
                lon_spans: [ALL_LONGITUDES; 2],
            };
        }

        let west = origin.longitude - lon_delta;
        let east = origin.longitude + lon_delta;
        let lon_spans = if west < -180.0 {
            [(west + 360.0, 180.0), (-180.0, east)]
        } else if east > 180.0 {
            [(west, 180.0), (-180.0, east - 360.0)]
        } else {
            [(west, east); 2]
        };

        BoundingBox {
            min_lat,
            max_lat,
            lon_spans,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && self
                .lon_spans
                .iter()
                .any(|(west, east)| (*west..=*east).contains(&point.longitude))
    }
}

/// SQL predicate matching [`BoundingBox`] bound as `$4` min lat, `$5` max lat,
/// `$6..$9` the two longitude spans.
pub const SQL_BOUNDING_BOX: &str = "latitude BETWEEN $4 AND $5 \
    AND (longitude BETWEEN $6 AND $7 OR longitude BETWEEN $8 AND $9)";
