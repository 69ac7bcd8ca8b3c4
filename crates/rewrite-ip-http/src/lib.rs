// # Dual-Stack HTTP IP Source
//
// This crate resolves the host's public IP address by asking two JSON
// lookup endpoints, one reachable only over IPv4 and one only over IPv6.
//
// ## Policy
//
// - IPv6 answer available → use it
// - otherwise IPv4 answer available → use it
// - otherwise → resolution failure
//
// A single lookup failing (timeout, transport error, bad status, empty or
// malformed body, missing `ip` field) is absorbed and only means "no answer
// from this endpoint".
//
// ## Response Format
//
// ```json
// { "ip": "203.0.113.7" }
// ```

use rewrite_core::traits::{IpSource, IpVersion};
use rewrite_core::{Error, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Default IPv4-only lookup endpoint
pub const DEFAULT_IPV4_URL: &str = "https://api4.ipify.org?format=json";

/// Default IPv6-only lookup endpoint
pub const DEFAULT_IPV6_URL: &str = "https://api6.ipify.org?format=json";

/// Timeout applied to each lookup
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ip: String,
}

/// Public IP source querying an IPv4 and an IPv6 endpoint
#[derive(Debug, Clone)]
pub struct DualStackIpSource {
    /// IPv4 lookup URL
    ipv4_url: String,

    /// IPv6 lookup URL
    ipv6_url: String,

    /// Log individual lookup failures at warn level instead of debug
    debug: bool,

    /// HTTP client
    client: reqwest::Client,
}

impl DualStackIpSource {
    /// Create a source using the default ipify endpoints
    pub fn new(debug: bool) -> Result<Self> {
        Self::with_urls(DEFAULT_IPV4_URL, DEFAULT_IPV6_URL, debug)
    }

    /// Create a source with custom lookup endpoints
    pub fn with_urls(
        ipv4_url: impl Into<String>,
        ipv6_url: impl Into<String>,
        debug: bool,
    ) -> Result<Self> {
        Ok(Self {
            ipv4_url: ipv4_url.into(),
            ipv6_url: ipv6_url.into(),
            debug,
            client: build_client(LOOKUP_TIMEOUT)?,
        })
    }

    /// Replace the per-lookup timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Query one endpoint, absorbing every failure into `None`
    async fn lookup(&self, version: IpVersion) -> Option<IpAddr> {
        let url = match version {
            IpVersion::V4 => &self.ipv4_url,
            IpVersion::V6 => &self.ipv6_url,
        };

        match self.fetch(url).await {
            Ok(ip) => {
                tracing::debug!("{} lookup via '{}' returned {}", version, url, ip);
                Some(ip)
            }
            Err(reason) => {
                if self.debug {
                    tracing::warn!("Error fetching IP from '{}': {}", url, reason);
                } else {
                    tracing::debug!("No {} answer from '{}': {}", version, url, reason);
                }
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<IpAddr, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP error: {}", status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e))?;

        if body.trim().is_empty() {
            return Err("empty response body".to_string());
        }

        let parsed: LookupResponse =
            serde_json::from_str(&body).map_err(|e| format!("malformed response: {}", e))?;

        parsed
            .ip
            .trim()
            .parse()
            .map_err(|_| format!("invalid IP address: {}", parsed.ip))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait::async_trait]
impl IpSource for DualStackIpSource {
    async fn current(&self) -> Result<IpAddr> {
        let ipv4 = self.lookup(IpVersion::V4).await;
        let ipv6 = self.lookup(IpVersion::V6).await;

        match (ipv6, ipv4) {
            (Some(ip), _) => Ok(ip),
            (None, Some(ip)) => {
                tracing::debug!("No IPv6 answer, falling back to IPv4");
                Ok(ip)
            }
            (None, None) => Err(Error::ip_source(
                "neither the IPv4 nor the IPv6 lookup returned an address",
            )),
        }
    }
}
