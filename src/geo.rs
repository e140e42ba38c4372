//! Great-circle distance between latitude/longitude pairs.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds coordinates from nullable columns. Either side missing yields `None`.
    pub fn from_nullable(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self::new(latitude?, longitude?))
    }

    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_km(self, other)
    }
}

/// Haversine distance in kilometers.
pub fn haversine_km(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1 for near-antipodal points
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Distance from every point of a column to one fixed reference point.
///
/// Null coordinates produce `None`, which callers treat as "does not match".
pub fn distances_to<'a, I>(column: I, reference: &Coordinates) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = Option<&'a Coordinates>>,
{
    column
        .into_iter()
        .map(|point| point.map(|p| haversine_km(p, reference)))
        .collect()
}

/// Returns `true` when the distance is known and at most `radius_km`.
pub fn within(distance: Option<f64>, radius_km: f64) -> bool {
    distance.is_some_and(|d| d <= radius_km)
}
