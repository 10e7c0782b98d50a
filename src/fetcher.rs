//! HTTP fetcher for the published Cloudflare IP ranges.
//!
//! One conditional GET per call. The previously seen validation token is
//! sent as `If-None-Match`; a `304 Not Modified` answer short-circuits the
//! payload transfer. Retries are not attempted here, the daemon simply tries
//! again on its next tick.

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::GuardError;

#[cfg(test)]
use mockall::automock;

/// Default Cloudflare IP ranges endpoint
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4/ips";

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum accepted payload size (1 MB)
/// The real payload is a few KB, anything near this is not a range list
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// A freshly published range list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeList {
    /// IPv4 CIDRs in the order the source returned them
    pub ipv4: Vec<String>,
    /// IPv6 CIDRs in the order the source returned them
    pub ipv6: Vec<String>,
    /// Validation token identifying this version of the list
    pub token: String,
}

/// Result of a successful conditional fetch.
///
/// Failures are reported through the `Err` side of the fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The source published a (possibly empty) list
    Changed(RangeList),
    /// Nothing changed since `token`
    Unchanged { token: String },
}

/// Source of the authoritative range list
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch the range list unless it is unchanged since `previous_token`.
    ///
    /// An empty `previous_token` always requests the full payload.
    async fn fetch(&self, previous_token: &str) -> Result<FetchOutcome, GuardError>;
}

#[derive(Deserialize)]
struct IpsResponse {
    success: bool,
    #[serde(default)]
    result: Option<IpsResult>,
}

#[derive(Deserialize, Default)]
struct IpsResult {
    #[serde(default)]
    ipv4_cidrs: Option<Vec<String>>,
    #[serde(default)]
    ipv6_cidrs: Option<Vec<String>>,
    #[serde(default)]
    etag: Option<String>,
}

/// Fetcher for the Cloudflare `/ips` API
pub struct CloudflareFetcher {
    client: Client,
    api_url: String,
}

impl CloudflareFetcher {
    /// Create a fetcher for `api_url` with a per-request `timeout`
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GuardError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("cf-ip-guard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GuardError::Transport(format!("build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl RangeFetcher for CloudflareFetcher {
    async fn fetch(&self, previous_token: &str) -> Result<FetchOutcome, GuardError> {
        let mut request = self.client.get(&self.api_url);
        if !previous_token.is_empty() {
            request = request.header(IF_NONE_MATCH, previous_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GuardError::Transport(format!("request {}: {}", self.api_url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(etag = %previous_token, "range list not modified");
            return Ok(FetchOutcome::Unchanged {
                token: previous_token.to_string(),
            });
        }
        if !status.is_success() {
            return Err(GuardError::SourceProtocol(format!(
                "unexpected status: {}",
                status
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length as usize > MAX_RESPONSE_SIZE {
                return Err(GuardError::SourceProtocol(format!(
                    "response too large: {} bytes (max: {} bytes)",
                    content_length, MAX_RESPONSE_SIZE
                )));
            }
        }

        let header_token = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| GuardError::Transport(format!("read response body: {}", e)))?;

        // Content-Length may be absent (chunked), so check again
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(GuardError::SourceProtocol(format!(
                "response too large: {} bytes (max: {} bytes)",
                body.len(),
                MAX_RESPONSE_SIZE
            )));
        }

        let list = parse_ranges(&body, header_token)?;
        debug!(
            ipv4 = list.ipv4.len(),
            ipv6 = list.ipv6.len(),
            etag = %list.token,
            "range list fetched"
        );
        Ok(FetchOutcome::Changed(list))
    }
}

/// Parse an `/ips` API body into a range list.
///
/// The body's `result.etag` is the token; `header_token` is only used when
/// the body does not carry one.
pub fn parse_ranges(body: &[u8], header_token: Option<String>) -> Result<RangeList, GuardError> {
    let response: IpsResponse = serde_json::from_slice(body)
        .map_err(|e| GuardError::SourceProtocol(format!("decode json: {}", e)))?;

    if !response.success {
        return Err(GuardError::SourceProtocol(
            "api returned success=false".to_string(),
        ));
    }

    let result = response.result.unwrap_or_default();
    let token = result
        .etag
        .filter(|t| !t.is_empty())
        .or(header_token)
        .unwrap_or_default();

    Ok(RangeList {
        ipv4: result.ipv4_cidrs.unwrap_or_default(),
        ipv6: result.ipv6_cidrs.unwrap_or_default(),
        token,
    })
}
