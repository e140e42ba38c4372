use chrono::NaiveDate;
use lane_pricer::config::PricingConfig;
use lane_pricer::dataset::{
    POSTCODE_ROUNDING_DP, fill_missing_postcodes, load_shipments, read_shipments, vehicle_types,
};
use lane_pricer::estimate::{EstimateMethod, TimeWeighting, estimate_price};
use lane_pricer::geocode::PostcodeCache;
use lane_pricer::matching::{RouteQuery, TierKind, find_similar_routes};
use lane_pricer::quote::quote_route;
use lane_pricer::shipment::ShipmentRecord;

const SHIPMENTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/shipments.csv");
const CACHE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/postcode_cache.json");

const HEADER: &str = "origin_postcode,origin_lat,origin_lon,destination_postcode,dest_lat,dest_lon,\
vehicle_type,pickup_date,contract_type,journey_distance,load_id,shipper_price,shipper_id,\
carrier_price,carrier_name";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

fn fixture() -> (Vec<ShipmentRecord>, PostcodeCache) {
    let cache = PostcodeCache::load(CACHE).unwrap();
    let mut rows = load_shipments(SHIPMENTS).unwrap();
    fill_missing_postcodes(&mut rows, &cache.reverse_index(POSTCODE_ROUNDING_DP));
    (rows, cache)
}

/// One Van row per price on SW1A 1AA -> B11 2AB, without coordinates.
fn lane_csv(prices: &[f64]) -> String {
    let mut csv = format!("{HEADER}\n");
    for (i, price) in prices.iter().enumerate() {
        csv.push_str(&format!(
            "SW1A 1AA,,,B11 2AB,,,Van,2025-05-01,Spot,190.0,{},{},21,{price},Acme Transport\n",
            5000 + i,
            price + 50.0,
        ));
    }
    csv
}

#[test]
fn test_load_fixture() {
    let rows = load_shipments(SHIPMENTS).unwrap();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[2].pickup_date, NaiveDate::from_ymd_opt(2025, 2, 20));
    assert_eq!(rows[9].carrier_price, None);
    assert_eq!(vehicle_types(&rows), vec!["Artic", "Van"]);
}

#[test]
fn test_short_postcode_filled_from_cache() {
    let cache = PostcodeCache::load(CACHE).unwrap();
    let mut rows = load_shipments(SHIPMENTS).unwrap();

    let filled = fill_missing_postcodes(&mut rows, &cache.reverse_index(POSTCODE_ROUNDING_DP));
    assert_eq!(filled, 1);
    assert_eq!(rows[10].origin_postcode, "SW1A1AA");
    assert_eq!(rows[10].destination_postcode, "B11 3CD");
}

#[tokio::test]
async fn test_find_similar_routes_tiers() {
    let (rows, cache) = fixture();

    let tiers = find_similar_routes(&rows, "sw1a 1aa", "B11 2AB", Some("Van"), &cache)
        .await
        .unwrap();
    let counts = tiers.counts();
    assert_eq!(counts.three_letter, 8);
    assert_eq!(counts.within_10km, 9);
    assert_eq!(counts.within_20km, 9);
    assert_eq!(counts.two_letter, 8);
    assert!(tiers.three_letter.iter().all(|r| r.vehicle_type == "Van"));
    assert!(tiers.within_10km.iter().any(|r| r.origin_postcode == "SE1 7PB"));
}

#[tokio::test]
async fn test_quote_fixture_lane() {
    let (rows, cache) = fixture();
    let query = RouteQuery::new("SW1A 1AA", "B11 2AB", Some("Van"));

    let report = quote_route(&rows, query, &cache, &PricingConfig::default(), today())
        .await
        .unwrap();

    assert_eq!(report.origin_postcode, "SW1A1AA");
    assert_eq!(report.recent_three_letter, 7);
    let estimate = report.estimate.unwrap();
    // Seven 2025 loads at weight 1, the 2024 load at weight 0.5
    assert!((estimate.price - 1905.0 / 7.5).abs() < 1e-9);
    assert_eq!(estimate.explanation, "Estimated from 8 loads (3-letter prefix).");
}

#[tokio::test]
async fn test_quote_without_time_weighting_or_widened() {
    let (rows, cache) = fixture();

    let config = PricingConfig {
        use_time_weighting: false,
        ..PricingConfig::default()
    };
    let query = RouteQuery::new("SW1A 1AA", "B11 2AB", Some("Van"));
    let report = quote_route(&rows, query, &cache, &config, today()).await.unwrap();
    assert_eq!(report.estimate.unwrap().price, 2055.0 / 8.0);

    let config = PricingConfig {
        min_count: 9,
        ..PricingConfig::default()
    };
    let query = RouteQuery::new("SW1A 1AA", "B11 2AB", Some("Van"));
    let report = quote_route(&rows, query, &cache, &config, today()).await.unwrap();
    let estimate = report.estimate.unwrap();
    assert_eq!(
        estimate.method,
        EstimateMethod::TieredAggregate {
            tiers: vec![TierKind::ThreeLetter, TierKind::Within10Km]
        }
    );
    assert_eq!(estimate.stats.unwrap().valid_count, 17);
}

#[tokio::test]
async fn test_quote_unknown_lane_has_no_estimate() {
    let (rows, cache) = fixture();
    let query = RouteQuery::new("LS1 4AP", "M1 1AA", None);

    let report = quote_route(&rows, query, &cache, &PricingConfig::default(), today())
        .await
        .unwrap();
    assert!(report.estimate.is_none());
    assert_eq!(report.summary(), "No data available");
}

#[tokio::test]
async fn test_quote_unresolvable_postcode_is_error() {
    let (rows, cache) = fixture();
    let query = RouteQuery::new("ZZ9 9ZZ", "B11 2AB", None);

    let result = quote_route(&rows, query, &cache, &PricingConfig::default(), today()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_constant_price_lane_quotes_that_price() {
    let rows = read_shipments(lane_csv(&[250.0; 30]).as_bytes()).unwrap();
    let cache = PostcodeCache::load(CACHE).unwrap();
    let query = RouteQuery::new("SW1A 1AA", "B11 2AB", Some("Van"));

    let report = quote_route(&rows, query, &cache, &PricingConfig::default(), today())
        .await
        .unwrap();
    assert_eq!(report.recent_three_letter, 30);
    let estimate = report.estimate.unwrap();
    assert_eq!(estimate.price, 250.0);
    assert_eq!(estimate.explanation, "Estimated from 30 loads (3-letter prefix).");
}

#[tokio::test]
async fn test_busy_lane_uses_density_peak() {
    let mut prices: Vec<f64> = (0..20).map(|i| 200.0 + (i % 4) as f64).collect();
    prices.extend((0..10).map(|i| 340.0 + (i % 4) as f64));
    let rows = read_shipments(lane_csv(&prices).as_bytes()).unwrap();
    let cache = PostcodeCache::load(CACHE).unwrap();
    let query = RouteQuery::new("SW1A 1AA", "B11 2AB", Some("Van"));

    let report = quote_route(&rows, query, &cache, &PricingConfig::default(), today())
        .await
        .unwrap();
    let estimate = report.estimate.unwrap();
    assert_eq!(estimate.method, EstimateMethod::DensityPeak);
    assert_eq!(
        estimate.explanation,
        "Estimated using lowest fair price in last 365 days"
    );
    assert!((estimate.price - 201.5).abs() < 2.0, "got {}", estimate.price);
}

#[tokio::test]
async fn test_thin_lane_has_no_estimate() {
    let rows = read_shipments(lane_csv(&[200.0, 210.0, 220.0]).as_bytes()).unwrap();
    let cache = PostcodeCache::load(CACHE).unwrap();

    let tiers = find_similar_routes(&rows, "SW1A 1AA", "B11 2AB", Some("Van"), &cache)
        .await
        .unwrap();
    assert_eq!(tiers.counts().three_letter, 3);
    assert!(estimate_price(&tiers, 5, TimeWeighting::new(true, today())).is_none());
}
