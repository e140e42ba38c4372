use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::{GeocodeError, Geocoder, PostcodeCache};
use crate::fetch::{BasicClient, HttpClient, get_json};
use crate::geo::Coordinates;
use crate::shipment::normalize_postcode;

pub const DEFAULT_BASE_URL: &str = "https://api.postcodes.io/";

/// One lookup attempt: a full postcode or an outcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    Postcode(String),
    Outcode(String),
}

impl LookupTarget {
    pub fn code(&self) -> &str {
        match self {
            LookupTarget::Postcode(code) | LookupTarget::Outcode(code) => code,
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            LookupTarget::Postcode(_) => "postcodes",
            LookupTarget::Outcode(_) => "outcodes",
        }
    }
}

/// Ordered lookup attempts for a normalized postcode.
///
/// Longer than 4 characters: the full postcode, then its first 4 characters
/// as an outcode. Then, for anything at least 3 characters long, the first 3
/// characters as an outcode.
pub fn lookup_candidates(normalized: &str) -> Vec<LookupTarget> {
    let len = normalized.chars().count();
    let prefix = |n: usize| normalized.chars().take(n).collect::<String>();

    let mut targets = Vec::with_capacity(3);
    if len > 4 {
        targets.push(LookupTarget::Postcode(normalized.to_string()));
        targets.push(LookupTarget::Outcode(prefix(4)));
    }
    if len >= 3 {
        targets.push(LookupTarget::Outcode(prefix(3)));
    }
    targets
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    result: Option<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl LookupResponse {
    fn coordinates(&self) -> Option<Coordinates> {
        let result = self.result.as_ref()?;
        Coordinates::from_nullable(result.latitude, result.longitude)
    }
}

/// Resolver backed by the postcodes.io HTTP API and a [`PostcodeCache`].
pub struct PostcodesIo<C = BasicClient> {
    client: C,
    base_url: Url,
    cache: Mutex<PostcodeCache>,
}

impl<C: HttpClient> PostcodesIo<C> {
    pub fn new(client: C, cache: PostcodeCache) -> Result<Self, GeocodeError> {
        Self::with_base_url(client, cache, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        cache: PostcodeCache,
        base_url: &str,
    ) -> Result<Self, GeocodeError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(GeocodeError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            cache: Mutex::new(cache),
        })
    }

    /// Hands the cache back so the host can persist it.
    pub fn into_cache(self) -> PostcodeCache {
        self.cache.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, PostcodeCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url_for(&self, target: &LookupTarget) -> Result<Url, GeocodeError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GeocodeError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(target.collection())
            .push(target.code());
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> Geocoder for PostcodesIo<C> {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, postcode: &str) -> Result<Coordinates, GeocodeError> {
        let key = normalize_postcode(postcode);
        if key.is_empty() {
            return Err(GeocodeError::EmptyPostcode);
        }

        let cached = self.lock_cache().get(&key);
        if let Some(hit) = cached {
            debug!(postcode = %key, "Postcode cache hit");
            return Ok(hit);
        }

        for target in lookup_candidates(&key) {
            let url = self.url_for(&target)?;
            let response: Option<LookupResponse> = get_json(&self.client, url).await?;

            if let Some(coordinates) = response.as_ref().and_then(LookupResponse::coordinates) {
                info!(
                    postcode = %key,
                    matched = ?target,
                    latitude = coordinates.latitude,
                    longitude = coordinates.longitude,
                    "Postcode resolved"
                );
                self.lock_cache().insert(&key, coordinates);
                return Ok(coordinates);
            }

            debug!(postcode = %key, attempt = ?target, "Lookup missed, falling back");
        }

        warn!(postcode = %key, "Postcode could not be resolved");
        Err(GeocodeError::NotFound { postcode: key })
    }
}
