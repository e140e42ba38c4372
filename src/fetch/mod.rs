//! Minimal HTTP plumbing used by the geocoding resolver.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Issues a GET and decodes the JSON body.
///
/// Any status other than 200 yields `Ok(None)`; transport and decode failures are errors.
pub async fn get_json<C, T>(client: &C, url: Url) -> reqwest::Result<Option<T>>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let req = reqwest::Request::new(reqwest::Method::GET, url.clone());

    let resp = client.execute(req).await?;
    let status = resp.status();
    debug!(url = %url, status = status.as_u16(), "HTTP response");

    if status != reqwest::StatusCode::OK {
        return Ok(None);
    }

    resp.json::<T>().await.map(Some)
}
