//! Route matching: finds historical shipments comparable to a queried lane.
//!
//! A lane is compared against every priceable record four ways: by 3-letter
//! and 2-letter postcode prefixes, and by both ends lying within 10 km or
//! 20 km of the queried postcodes. Every comparison also accepts the reversed
//! direction, so B→A history counts for an A→B query.

use serde::Serialize;
use tracing::{debug, info};

use crate::geo::{self, Coordinates};
use crate::geocode::{GeocodeError, Geocoder};
use crate::shipment::{MatchedShipment, ShipmentRecord, is_priceable, normalize_postcode, postcode_prefix};

pub const NEAR_RADIUS_KM: f64 = 10.0;
pub const WIDE_RADIUS_KM: f64 = 20.0;
pub const LONG_PREFIX_LEN: usize = 3;
pub const SHORT_PREFIX_LEN: usize = 2;

/// The four comparability tiers, in ladder order from tightest to loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    ThreeLetter,
    Within10Km,
    Within20Km,
    TwoLetter,
}

impl TierKind {
    pub const LADDER: [TierKind; 4] = [
        TierKind::ThreeLetter,
        TierKind::Within10Km,
        TierKind::Within20Km,
        TierKind::TwoLetter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TierKind::ThreeLetter => "3-letter prefix",
            TierKind::Within10Km => "within 10km",
            TierKind::Within20Km => "within 20km",
            TierKind::TwoLetter => "2-letter prefix",
        }
    }

    /// Identifier safe for file names.
    pub fn slug(&self) -> &'static str {
        match self {
            TierKind::ThreeLetter => "three_letter",
            TierKind::Within10Km => "within_10km",
            TierKind::Within20Km => "within_20km",
            TierKind::TwoLetter => "two_letter",
        }
    }
}

/// An origin/destination lane to price, with an optional vehicle-type filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuery {
    origin_postcode: String,
    destination_postcode: String,
    vehicle_type: Option<String>,
}

impl RouteQuery {
    pub fn new(origin_postcode: &str, destination_postcode: &str, vehicle_type: Option<&str>) -> Self {
        Self {
            origin_postcode: normalize_postcode(origin_postcode),
            destination_postcode: normalize_postcode(destination_postcode),
            vehicle_type: vehicle_type.map(str::to_string),
        }
    }

    pub fn origin_postcode(&self) -> &str {
        &self.origin_postcode
    }

    pub fn destination_postcode(&self) -> &str {
        &self.destination_postcode
    }

    pub fn vehicle_type(&self) -> Option<&str> {
        self.vehicle_type.as_deref()
    }

    /// Resolves both ends through the geocoder. Either failing fails the query.
    pub async fn resolve<G>(self, geocoder: &G) -> Result<ResolvedQuery, GeocodeError>
    where
        G: Geocoder + ?Sized,
    {
        let origin = geocoder.resolve(&self.origin_postcode).await?;
        let destination = geocoder.resolve(&self.destination_postcode).await?;
        Ok(ResolvedQuery {
            query: self,
            origin,
            destination,
        })
    }
}

/// A [`RouteQuery`] whose postcodes have coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub query: RouteQuery,
    pub origin: Coordinates,
    pub destination: Coordinates,
}

impl ResolvedQuery {
    pub fn new(query: RouteQuery, origin: Coordinates, destination: Coordinates) -> Self {
        Self {
            query,
            origin,
            destination,
        }
    }
}

/// Rows of each tier. A record may sit in several tiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTiers {
    pub three_letter: Vec<MatchedShipment>,
    pub within_10km: Vec<MatchedShipment>,
    pub within_20km: Vec<MatchedShipment>,
    pub two_letter: Vec<MatchedShipment>,
}

impl RouteTiers {
    pub fn get(&self, kind: TierKind) -> &[MatchedShipment] {
        match kind {
            TierKind::ThreeLetter => &self.three_letter,
            TierKind::Within10Km => &self.within_10km,
            TierKind::Within20Km => &self.within_20km,
            TierKind::TwoLetter => &self.two_letter,
        }
    }

    fn get_mut(&mut self, kind: TierKind) -> &mut Vec<MatchedShipment> {
        match kind {
            TierKind::ThreeLetter => &mut self.three_letter,
            TierKind::Within10Km => &mut self.within_10km,
            TierKind::Within20Km => &mut self.within_20km,
            TierKind::TwoLetter => &mut self.two_letter,
        }
    }

    pub fn counts(&self) -> TierCounts {
        TierCounts {
            three_letter: self.three_letter.len(),
            within_10km: self.within_10km.len(),
            within_20km: self.within_20km.len(),
            two_letter: self.two_letter.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        TierKind::LADDER.iter().all(|k| self.get(*k).is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub three_letter: usize,
    pub within_10km: usize,
    pub within_20km: usize,
    pub two_letter: usize,
}

impl TierCounts {
    pub fn get(&self, kind: TierKind) -> usize {
        match kind {
            TierKind::ThreeLetter => self.three_letter,
            TierKind::Within10Km => self.within_10km,
            TierKind::Within20Km => self.within_20km,
            TierKind::TwoLetter => self.two_letter,
        }
    }
}

/// The four record-to-target distances. `None` where a coordinate is missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteDistances {
    pub forward_origin: Option<f64>,
    pub forward_dest: Option<f64>,
    pub reverse_origin: Option<f64>,
    pub reverse_dest: Option<f64>,
}

impl RouteDistances {
    /// Both ends within `radius_km`, in either direction.
    pub fn within(&self, radius_km: f64) -> bool {
        (geo::within(self.forward_origin, radius_km) && geo::within(self.forward_dest, radius_km))
            || (geo::within(self.reverse_origin, radius_km)
                && geo::within(self.reverse_dest, radius_km))
    }
}

/// Distances for every record, computed column-wise against the two fixed targets.
pub fn route_distances(rows: &[ShipmentRecord], origin: &Coordinates, destination: &Coordinates) -> Vec<RouteDistances> {
    let origins: Vec<Option<Coordinates>> = rows.iter().map(ShipmentRecord::origin_coordinates).collect();
    let dests: Vec<Option<Coordinates>> = rows.iter().map(ShipmentRecord::destination_coordinates).collect();

    let forward_origin = geo::distances_to(origins.iter().map(Option::as_ref), origin);
    let forward_dest = geo::distances_to(dests.iter().map(Option::as_ref), destination);
    let reverse_origin = geo::distances_to(origins.iter().map(Option::as_ref), destination);
    let reverse_dest = geo::distances_to(dests.iter().map(Option::as_ref), origin);

    (0..rows.len())
        .map(|i| RouteDistances {
            forward_origin: forward_origin[i],
            forward_dest: forward_dest[i],
            reverse_origin: reverse_origin[i],
            reverse_dest: reverse_dest[i],
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
struct PrefixPair {
    origin: String,
    destination: String,
}

impl PrefixPair {
    fn of(origin: &str, destination: &str, len: usize) -> Self {
        Self {
            origin: postcode_prefix(origin, len),
            destination: postcode_prefix(destination, len),
        }
    }

    fn matches(&self, target: &PrefixPair) -> bool {
        (self.origin == target.origin && self.destination == target.destination)
            || (self.origin == target.destination && self.destination == target.origin)
    }
}

/// Priceable, and of the requested vehicle type when one was given.
fn passes_base_filter(row: &ShipmentRecord, vehicle_type: Option<&str>) -> bool {
    is_priceable(row.carrier_price) && vehicle_type.is_none_or(|v| row.vehicle_type == v)
}

/// Splits the dataset into the four comparability tiers for a resolved query.
///
/// Rows keep source order. Rows with a missing coordinate never enter the
/// distance tiers but can still match on postcode prefixes.
#[tracing::instrument(
    skip(rows, resolved),
    fields(
        rows = rows.len(),
        origin = %resolved.query.origin_postcode,
        destination = %resolved.query.destination_postcode,
        vehicle_type = ?resolved.query.vehicle_type
    )
)]
pub fn match_routes(rows: &[ShipmentRecord], resolved: &ResolvedQuery) -> RouteTiers {
    let query = &resolved.query;
    let target_long = PrefixPair::of(&query.origin_postcode, &query.destination_postcode, LONG_PREFIX_LEN);
    let target_short = PrefixPair::of(&query.origin_postcode, &query.destination_postcode, SHORT_PREFIX_LEN);

    let distances = route_distances(rows, &resolved.origin, &resolved.destination);
    let mut tiers = RouteTiers::default();

    for (row, distance) in rows.iter().zip(&distances) {
        if !passes_base_filter(row, query.vehicle_type()) {
            continue;
        }
        let Some(matched) = row.to_matched() else {
            continue;
        };

        let membership = [
            (
                TierKind::ThreeLetter,
                PrefixPair::of(&row.origin_postcode, &row.destination_postcode, LONG_PREFIX_LEN)
                    .matches(&target_long),
            ),
            (TierKind::Within10Km, distance.within(NEAR_RADIUS_KM)),
            (TierKind::Within20Km, distance.within(WIDE_RADIUS_KM)),
            (
                TierKind::TwoLetter,
                PrefixPair::of(&row.origin_postcode, &row.destination_postcode, SHORT_PREFIX_LEN)
                    .matches(&target_short),
            ),
        ];

        for (kind, is_member) in membership {
            if is_member {
                tiers.get_mut(kind).push(matched.clone());
            }
        }
    }

    let counts = tiers.counts();
    info!(
        three_letter = counts.three_letter,
        within_10km = counts.within_10km,
        within_20km = counts.within_20km,
        two_letter = counts.two_letter,
        "Route tiers matched"
    );
    tiers
}

/// Resolves the query postcodes and matches the dataset against them.
///
/// A postcode that cannot be resolved fails the whole query with no partial result.
pub async fn find_similar_routes<G>(
    rows: &[ShipmentRecord],
    origin_postcode: &str,
    destination_postcode: &str,
    vehicle_type: Option<&str>,
    geocoder: &G,
) -> Result<RouteTiers, GeocodeError>
where
    G: Geocoder + ?Sized,
{
    let resolved = RouteQuery::new(origin_postcode, destination_postcode, vehicle_type)
        .resolve(geocoder)
        .await?;
    debug!(origin = ?resolved.origin, destination = ?resolved.destination, "Query postcodes resolved");
    Ok(match_routes(rows, &resolved))
}
