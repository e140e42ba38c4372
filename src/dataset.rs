//! Loading the shipment dataset from CSV and tidying it for matching.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::geo::Coordinates;
use crate::geocode::ReverseIndex;
use crate::shipment::ShipmentRecord;

/// Decimal places coordinates are rounded to when looking up a missing postcode.
pub const POSTCODE_ROUNDING_DP: u32 = 2;

/// Postcodes this short (or empty) are treated as missing.
const MAX_INCOMPLETE_POSTCODE_LEN: usize = 3;

/// Reads every row of a shipment CSV file.
pub fn load_shipments(path: impl AsRef<Path>) -> Result<Vec<ShipmentRecord>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open dataset {}", path.display()))?;
    let rows = read_shipments(file).with_context(|| format!("in dataset {}", path.display()))?;

    info!(path = %path.display(), rows = rows.len(), "Loaded shipment dataset");
    Ok(rows)
}

/// Reads shipment rows from any CSV source with a header line.
pub fn read_shipments<R: Read>(reader: R) -> Result<Vec<ShipmentRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (i, result) in rdr.deserialize::<ShipmentRecord>().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let record: ShipmentRecord =
            result.with_context(|| format!("malformed shipment on line {}", i + 2))?;
        rows.push(record);
    }

    Ok(rows)
}

/// Replaces missing or truncated postcodes using the rounded-coordinate index.
///
/// Rows without coordinates, or whose coordinates have no index entry, keep
/// their original value. Returns how many postcodes were filled.
pub fn fill_missing_postcodes(rows: &mut [ShipmentRecord], index: &ReverseIndex) -> usize {
    let mut filled = 0;

    for row in rows.iter_mut() {
        let origin = row.origin_coordinates();
        if fill_one(&mut row.origin_postcode, origin, index) {
            filled += 1;
        }
        let destination = row.destination_coordinates();
        if fill_one(&mut row.destination_postcode, destination, index) {
            filled += 1;
        }
    }

    debug!(filled, "Filled missing postcodes from coordinates");
    filled
}

fn fill_one(postcode: &mut String, coordinates: Option<Coordinates>, index: &ReverseIndex) -> bool {
    if postcode.trim().chars().count() > MAX_INCOMPLETE_POSTCODE_LEN {
        return false;
    }
    let Some(found) = coordinates.and_then(|c| index.lookup(&c)) else {
        return false;
    };
    *postcode = found.to_string();
    true
}

/// Distinct vehicle types in ascending order.
pub fn vehicle_types(rows: &[ShipmentRecord]) -> Vec<String> {
    rows.iter()
        .map(|r| r.vehicle_type.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::PostcodeCache;
    use crate::shipment::tests::record;

    const HEADER: &str = "origin_postcode,origin_lat,origin_lon,destination_postcode,dest_lat,dest_lon,vehicle_type,pickup_date,contract_type,journey_distance,load_id,shipper_price,shipper_id,carrier_price,carrier_name\n";

    #[test]
    fn test_read_shipments() {
        let data = format!(
            "{HEADER}SW1A 1AA,51.501,-0.141,B11 2AB,52.46,-1.86,Van,2025-01-10,Spot,190,1,300,9,250,Acme\n"
        );
        let rows = read_shipments(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin_postcode, "SW1A 1AA");
        assert_eq!(rows[0].carrier_price, Some(250.0));
        assert_eq!(rows[0].load_id, 1);
    }

    #[test]
    fn test_read_shipments_reports_bad_line() {
        let data = format!(
            "{HEADER}SW1A 1AA,51.501,-0.141,B11 2AB,52.46,-1.86,Van,2025-01-10,Spot,190,1,300,9,250,Acme\n\
             SW1A 1AA,51.501,-0.141,B11 2AB,52.46,-1.86,Van,2025-01-10,Spot,far,2,300,9,250,Acme\n"
        );
        let err = read_shipments(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"), "{err:#}");
    }

    #[test]
    fn test_load_shipments_missing_file() {
        assert!(load_shipments("/definitely/not/here.csv").is_err());
    }

    #[test]
    fn test_fill_missing_postcodes() {
        let mut cache = PostcodeCache::new();
        cache.insert("LS1 4AP", Coordinates::new(53.796, -1.549));
        let index = cache.reverse_index(POSTCODE_ROUNDING_DP);

        let mut short = record("LS1", "B11 2AB", Some(100.0));
        short.origin_lat = Some(53.7962);
        short.origin_lon = Some(-1.5488);

        let mut complete = record("LS1 4AP", "", Some(100.0));
        complete.origin_lat = Some(53.796);
        complete.origin_lon = Some(-1.549);

        let no_coords = record("", "B11 2AB", Some(100.0));

        let mut rows = vec![short, complete, no_coords];
        let filled = fill_missing_postcodes(&mut rows, &index);

        assert_eq!(filled, 1);
        assert_eq!(rows[0].origin_postcode, "LS14AP");
        assert_eq!(rows[1].origin_postcode, "LS1 4AP");
        assert_eq!(rows[1].destination_postcode, "");
        assert_eq!(rows[2].origin_postcode, "");
    }

    #[test]
    fn test_vehicle_types_sorted_unique() {
        let mut a = record("A1", "B1", Some(1.0));
        a.vehicle_type = "Van".into();
        let mut b = record("A1", "B1", Some(1.0));
        b.vehicle_type = "Artic".into();
        let c = a.clone();
        assert_eq!(vehicle_types(&[a, b, c]), vec!["Artic", "Van"]);
    }
}
