//! Forwarding to the sponsor backend.
//!
//! Accepted requests are forwarded byte-for-byte; the gateway never rewrites
//! a body it has authorized. Responses come back as raw status and bytes so
//! the server layer can decide how to relay them.

use http::StatusCode;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// The sponsor backend could not be reached at the transport level. This is
/// an infrastructure failure, not a denial.
#[derive(Debug, Error)]
#[error("sponsor backend unreachable: {0}")]
pub struct UpstreamError(pub String);

/// Raw reply from the sponsor backend.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Whether the body parses as JSON. Parseable replies are relayed with
    /// status 200 regardless of the upstream status; anything else is
    /// relayed as-is.
    pub fn is_json(&self) -> bool {
        serde_json::from_slice::<serde_json::Value>(&self.body).is_ok()
    }
}

/// HTTP client for the sponsor backend.
#[derive(Debug, Clone)]
pub struct SponsorClient {
    client: Client,
    url: Url,
}

impl SponsorClient {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    /// Forwards the original request body verbatim.
    pub async fn forward(&self, body: Vec<u8>) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| UpstreamError(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError(e.to_string()))?
            .to_vec();

        Ok(UpstreamResponse { status, body })
    }
}
