// # NextDNS Rewrite Provider
//
// This crate provides a NextDNS rewrites provider for the reconciler.
//
// ## Implementation Notes
//
// - ✅ One HTTP request per operation
// - ✅ Explicit outcomes: success, not-found, failure (no exceptions as control flow)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Create is only a success if the echoed record carries the requested name
// - ❌ NO retry logic (the next cycle is the retry)
// - ❌ NO caching (every cycle re-reads the profile)
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - Factory fails fast if the key is empty
//
// ## API Reference
//
// - List rewrites:   GET    `/profiles/:profile_id/rewrites`
// - Create rewrite:  POST   `/profiles/:profile_id/rewrites` `{ "name", "content" }`
// - Delete rewrite:  DELETE `/profiles/:profile_id/rewrites/:rule_id` (204 on success)
// - Auth header:     `X-Api-Key: <key>`

pub mod envelope;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use rewrite_core::config::AccountConfig;
use rewrite_core::traits::{ObservedRewrite, ProviderOutcome, RewriteProvider, RewriteProviderFactory};
use rewrite_core::{Error, Result};
use std::time::Duration;

/// NextDNS API base URL
pub const NEXTDNS_API_BASE: &str = "https://api.nextdns.io";

/// Header carrying the API key
const API_KEY_HEADER: &str = "X-Api-Key";

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// NextDNS rewrites provider bound to one account's API key
pub struct NextDnsProvider {
    /// NextDNS API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL
    base_url: Url,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for NextDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextDnsProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl NextDnsProvider {
    /// Create a provider against the public NextDNS API
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, NEXTDNS_API_BASE)
    }

    /// Create a provider against a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("NextDNS API key cannot be empty"));
        }

        let base_url: String = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| Error::config(format!("Invalid NextDNS API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid NextDNS API URL '{}'", base_url)));
        }

        Ok(Self {
            api_key,
            base_url,
            client: build_client(DEFAULT_HTTP_TIMEOUT)?,
        })
    }

    /// Replace the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// `/profiles/:profile_id/rewrites[/:rule_id]`, every id percent-encoded
    fn rewrites_url(
        &self,
        profile_id: &str,
        rule_id: Option<&str>,
    ) -> std::result::Result<Url, String> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| format!("invalid base URL: {}", self.base_url))?;
            segments
                .pop_if_empty()
                .push("profiles")
                .push(profile_id)
                .push("rewrites");
            if let Some(rule_id) = rule_id {
                segments.push(rule_id);
            }
        }
        Ok(url)
    }

    /// Send a request and return its body, or a failure description
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<(StatusCode, String), String> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        Ok((status, body))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait]
impl RewriteProvider for NextDnsProvider {
    async fn list_rewrites(&self, profile_id: &str) -> ProviderOutcome<Vec<ObservedRewrite>> {
        tracing::debug!("Listing rewrite rules of profile '{}'", profile_id);

        let url = match self.rewrites_url(profile_id, None) {
            Ok(url) => url,
            Err(reason) => return ProviderOutcome::Failure(reason),
        };

        let outcome = match self.send(self.client.get(url)).await {
            Ok((_, body)) => envelope::classify::<Vec<ObservedRewrite>>(&body),
            Err(reason) => ProviderOutcome::Failure(reason),
        };

        if let ProviderOutcome::Success(rules) = &outcome {
            tracing::debug!("Profile '{}' has {} rewrite rule(s)", profile_id, rules.len());
        }

        outcome
    }

    async fn create_rewrite(
        &self,
        profile_id: &str,
        name: &str,
        content: &str,
    ) -> ProviderOutcome<ObservedRewrite> {
        tracing::debug!(
            "Creating rewrite rule '{}' with content '{}' in profile '{}'",
            name,
            content,
            profile_id
        );

        let payload = serde_json::json!({
            "name": name,
            "content": content,
        });
        let url = match self.rewrites_url(profile_id, None) {
            Ok(url) => url,
            Err(reason) => return ProviderOutcome::Failure(reason),
        };

        let outcome = match self.send(self.client.post(url).json(&payload)).await {
            Ok((_, body)) => envelope::classify::<ObservedRewrite>(&body),
            Err(reason) => ProviderOutcome::Failure(reason),
        };

        match outcome {
            ProviderOutcome::Success(created) if created.name == name => {
                tracing::debug!(
                    "Created rewrite rule '{}' with content '{}' in profile '{}'",
                    name,
                    content,
                    profile_id
                );
                ProviderOutcome::Success(created)
            }
            ProviderOutcome::Success(created) => ProviderOutcome::Failure(format!(
                "created record name '{}' does not match '{}'",
                created.name, name
            )),
            other => other,
        }
    }

    async fn delete_rewrite(&self, profile_id: &str, rule_id: &str) -> bool {
        tracing::debug!("Removing rewrite rule '{}' in profile '{}'", rule_id, profile_id);

        let url = match self.rewrites_url(profile_id, Some(rule_id)) {
            Ok(url) => url,
            Err(reason) => {
                tracing::warn!("Cannot remove rewrite rule '{}': {}", rule_id, reason);
                return false;
            }
        };

        match self.send(self.client.delete(url)).await {
            Ok((status, _)) if status == StatusCode::NO_CONTENT => {
                tracing::debug!("Removed rewrite rule '{}' in profile '{}'", rule_id, profile_id);
                true
            }
            Ok((status, body)) => {
                tracing::warn!(
                    "Failed to remove rewrite rule '{}' in profile '{}': {} - {}",
                    rule_id,
                    profile_id,
                    status,
                    body
                );
                false
            }
            Err(reason) => {
                tracing::warn!(
                    "Failed to remove rewrite rule '{}' in profile '{}': {}",
                    rule_id,
                    profile_id,
                    reason
                );
                false
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "nextdns"
    }
}

/// Factory for creating NextDNS providers, one per account
#[derive(Debug, Clone)]
pub struct NextDnsFactory {
    base_url: String,
}

impl NextDnsFactory {
    /// Factory targeting the public NextDNS API
    pub fn new() -> Self {
        Self::with_base_url(NEXTDNS_API_BASE)
    }

    /// Factory targeting a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for NextDnsFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteProviderFactory for NextDnsFactory {
    fn create(&self, account: &AccountConfig) -> Result<Box<dyn RewriteProvider>> {
        let provider = NextDnsProvider::with_base_url(account.api_token.clone(), self.base_url.clone())?;
        Ok(Box::new(provider))
    }
}
