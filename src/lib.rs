pub mod config;
pub mod dataset;
pub mod estimate;
pub mod fetch;
pub mod geo;
pub mod geocode;
pub mod matching;
pub mod output;
pub mod quote;
pub mod shipment;
