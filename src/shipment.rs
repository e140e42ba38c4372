//! Shipment records and the postcode helpers derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::Coordinates;

/// Separator between the two postcodes of a route key.
pub const ROUTE_KEY_SEPARATOR: &str = " - ";

/// A single historical shipment, one row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub origin_postcode: String,
    pub origin_lat: Option<f64>,
    pub origin_lon: Option<f64>,
    pub destination_postcode: String,
    pub dest_lat: Option<f64>,
    pub dest_lon: Option<f64>,
    pub vehicle_type: String,
    #[serde(default, deserialize_with = "deserialize_pickup_date")]
    pub pickup_date: Option<NaiveDate>,
    pub contract_type: String,
    pub journey_distance: f64,
    pub load_id: i64,
    pub shipper_price: f64,
    pub shipper_id: i64,
    /// Price paid to the carrier. This is the quantity being estimated.
    pub carrier_price: Option<f64>,
    pub carrier_name: String,
}

impl ShipmentRecord {
    pub fn origin_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_nullable(self.origin_lat, self.origin_lon)
    }

    pub fn destination_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_nullable(self.dest_lat, self.dest_lon)
    }

    /// Projects the record onto the columns reported for a matched tier.
    ///
    /// Returns `None` for unpriceable records.
    pub fn to_matched(&self) -> Option<MatchedShipment> {
        let carrier_price = self.carrier_price.filter(|p| is_priceable(Some(*p)))?;
        Some(MatchedShipment {
            origin_postcode: self.origin_postcode.clone(),
            destination_postcode: self.destination_postcode.clone(),
            carrier_price,
            vehicle_type: self.vehicle_type.clone(),
            pickup_date: self.pickup_date,
            contract_type: self.contract_type.clone(),
            shipper_price: self.shipper_price,
            carrier_name: self.carrier_name.clone(),
            shipper_id: self.shipper_id,
        })
    }
}

/// The fixed column set of a tier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedShipment {
    pub origin_postcode: String,
    pub destination_postcode: String,
    pub carrier_price: f64,
    pub vehicle_type: String,
    pub pickup_date: Option<NaiveDate>,
    pub contract_type: String,
    pub shipper_price: f64,
    pub carrier_name: String,
    pub shipper_id: i64,
}

impl MatchedShipment {
    /// Column order of the serialized form.
    pub const CSV_HEADERS: [&'static str; 9] = [
        "origin_postcode",
        "destination_postcode",
        "carrier_price",
        "vehicle_type",
        "pickup_date",
        "contract_type",
        "shipper_price",
        "carrier_name",
        "shipper_id",
    ];
}

/// Access to the columns the price estimators read.
pub trait PricedRow {
    fn carrier_price(&self) -> Option<f64>;
    fn pickup_date(&self) -> Option<NaiveDate>;
    fn vehicle_type(&self) -> &str;
    fn route_key(&self) -> String;
}

impl PricedRow for ShipmentRecord {
    fn carrier_price(&self) -> Option<f64> {
        self.carrier_price
    }

    fn pickup_date(&self) -> Option<NaiveDate> {
        self.pickup_date
    }

    fn vehicle_type(&self) -> &str {
        &self.vehicle_type
    }

    fn route_key(&self) -> String {
        route_key(&self.origin_postcode, &self.destination_postcode)
    }
}

impl PricedRow for MatchedShipment {
    fn carrier_price(&self) -> Option<f64> {
        Some(self.carrier_price)
    }

    fn pickup_date(&self) -> Option<NaiveDate> {
        self.pickup_date
    }

    fn vehicle_type(&self) -> &str {
        &self.vehicle_type
    }

    fn route_key(&self) -> String {
        route_key(&self.origin_postcode, &self.destination_postcode)
    }
}

impl<T: PricedRow + ?Sized> PricedRow for &T {
    fn carrier_price(&self) -> Option<f64> {
        (**self).carrier_price()
    }

    fn pickup_date(&self) -> Option<NaiveDate> {
        (**self).pickup_date()
    }

    fn vehicle_type(&self) -> &str {
        (**self).vehicle_type()
    }

    fn route_key(&self) -> String {
        (**self).route_key()
    }
}

/// A price counts only when present and non-zero.
pub fn is_priceable(price: Option<f64>) -> bool {
    price.is_some_and(|p| p != 0.0 && !p.is_nan())
}

/// Strips all whitespace and uppercases.
pub fn normalize_postcode(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// First `len` characters of the normalized postcode (the whole of it when shorter).
pub fn postcode_prefix(postcode: &str, len: usize) -> String {
    normalize_postcode(postcode).chars().take(len).collect()
}

/// Direction-agnostic key for an origin/destination pair.
pub fn route_key(origin: &str, destination: &str) -> String {
    let a = normalize_postcode(origin);
    let b = normalize_postcode(destination);
    if a < b {
        format!("{a}{ROUTE_KEY_SEPARATOR}{b}")
    } else {
        format!("{b}{ROUTE_KEY_SEPARATOR}{a}")
    }
}

/// Accepts `YYYY-MM-DD` or any datetime string that begins with one.
fn deserialize_pickup_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid pickup_date '{trimmed}': {e}")))
}
