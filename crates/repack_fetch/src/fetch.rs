use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use repack_consts::consts;
use reqwest::{Client, Response, StatusCode, header::CONTENT_TYPE};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{ArchiveLocation, FetchError, client::build_reqwest_client};

/// Decides whether a response carries an archive.
///
/// Only an exact `200` counts. Forges answer unauthenticated archive requests
/// with a login page that is served as `200 text/html`, so any HTML content
/// type is a failure regardless of the status.
pub fn is_archive_response(status: StatusCode, content_type: Option<&str>) -> bool {
    status == StatusCode::OK
        && !content_type.is_some_and(|value| value.to_ascii_lowercase().contains("html"))
}

/// Downloads repository archives with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
}

impl ArchiveFetcher {
    /// Initialize a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::with_client(build_reqwest_client(timeout)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the archive at `location`, authenticating with `token`.
    ///
    /// The body is streamed into memory. No retries are attempted; a failed
    /// download is reported to the caller as is.
    #[instrument(skip(self, location, token), fields(url = %location.url()))]
    pub async fn fetch(&self, location: &ArchiveLocation, token: &str) -> Result<Bytes, FetchError> {
        let url = location.url().clone();

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| transport_error(err, &url))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if !is_archive_response(status, content_type.as_deref()) {
            let body_prefix = read_body_prefix(response, consts::BODY_PREFIX_LEN).await;
            warn!(
                %status,
                content_type = content_type.as_deref().unwrap_or_default(),
                body_prefix = body_prefix.as_str(),
                "the forge did not return an archive"
            );
            return Err(FetchError::Rejected {
                url,
                status,
                content_type,
                body_prefix,
            });
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| transport_error(err, &url))?;
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "downloaded archive");
        Ok(body.freeze())
    }
}

fn transport_error(err: reqwest::Error, url: &Url) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.clone() }
    } else {
        err.into()
    }
}

/// Reads at most `limit` bytes of the body for diagnostics. A body that fails
/// halfway is reported with whatever arrived.
async fn read_body_prefix(response: Response, limit: usize) -> String {
    let mut prefix = Vec::with_capacity(limit);
    let mut stream = response.bytes_stream();
    while prefix.len() < limit {
        match stream.next().await {
            Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
            _ => break,
        }
    }
    prefix.truncate(limit);
    String::from_utf8_lossy(&prefix).into_owned()
}
