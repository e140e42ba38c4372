//! Postcode to coordinate resolution.
//!
//! [`Geocoder`] is the seam the route matcher calls through. [`PostcodesIo`]
//! resolves against the postcodes.io API, [`PostcodeCache`] is the explicit
//! cache object it is constructed with and also serves offline lookups on its own.

mod cache;
mod postcodes_io;

pub use cache::{PostcodeCache, ReverseIndex};
pub use postcodes_io::{DEFAULT_BASE_URL, LookupTarget, PostcodesIo, lookup_candidates};

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::Coordinates;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("postcode is empty")]
    EmptyPostcode,
    #[error("postcode '{postcode}' not found after all fallback attempts")]
    NotFound { postcode: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("lookup base URL '{0}' cannot take path segments")]
    InvalidBaseUrl(String),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves a postcode to a latitude/longitude pair.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, postcode: &str) -> Result<Coordinates, GeocodeError>;
}
