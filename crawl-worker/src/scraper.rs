//! Live HTTP fetch, used when a URL misses the Storage cache.
//!
//! Fetch failures are split into distinct kinds (DNS, connection refused,
//! non-2xx status, non-UTF-8 body) so callers can log and report *why* a
//! scrape failed rather than a bare boolean.

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("dns resolution failed for {0}")]
    Dns(String),
    #[error("connection refused for {0}")]
    ConnectionRefused(String),
    #[error("non-2xx response ({status}) for {url}")]
    Status { url: String, status: u16 },
    #[error("response body was not valid utf-8")]
    NotUtf8,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fetch `url`. A bare host with no scheme is treated as `http://<host>`.
#[instrument(skip(client))]
pub async fn fetch(client: &Client<hyper_util::client::legacy::connect::HttpConnector, Empty<Bytes>>, url: &str) -> Result<String, FetchError> {
    let full_url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };

    let uri: hyper::Uri = full_url
        .parse()
        .map_err(|_| FetchError::Dns(full_url.clone()))?;

    let response = client.get(uri).await.map_err(|err| {
        if err.is_connect() {
            FetchError::ConnectionRefused(full_url.clone())
        } else {
            FetchError::Dns(full_url.clone())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: full_url,
            status: status.as_u16(),
        });
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|err| FetchError::Other(anyhow::Error::new(err)))?
        .to_bytes();

    String::from_utf8(body.to_vec()).map_err(|_| FetchError::NotUtf8)
}

pub fn client() -> Client<hyper_util::client::legacy::connect::HttpConnector, Empty<Bytes>> {
    Client::builder(TokioExecutor::new()).build_http()
}
