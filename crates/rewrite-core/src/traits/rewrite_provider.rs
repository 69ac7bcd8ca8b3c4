// # Rewrite Provider Trait
//
// Defines the interface for managing DNS rewrite rules via a provider API.
//
// ## Implementations
//
// - NextDNS: `rewrite-provider-nextdns` crate
//
// ## Usage
//
// ```rust,ignore
// use rewrite_core::{ProviderOutcome, RewriteProvider};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* RewriteProvider implementation */;
//
//     match provider.list_rewrites("abc123").await {
//         ProviderOutcome::Success(rules) => println!("{} rules", rules.len()),
//         ProviderOutcome::NotFound => println!("no such profile"),
//         ProviderOutcome::Failure(detail) => println!("unavailable: {}", detail),
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A rewrite rule as currently stored by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRewrite {
    /// Provider-assigned identifier, used only for deletion
    #[serde(default)]
    pub id: String,
    /// Hostname the rule rewrites
    #[serde(default)]
    pub name: String,
    /// Current target of the rule
    #[serde(default)]
    pub content: String,
}

impl ObservedRewrite {
    /// Create an observed rule
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Whether this rule already points at `ip`
    ///
    /// Contents that parse as an address are compared as addresses, so
    /// `2001:db8::1` and `2001:0db8:0:0:0:0:0:1` are the same target.
    pub fn points_to(&self, ip: IpAddr) -> bool {
        match self.content.parse::<IpAddr>() {
            Ok(current) => current == ip,
            Err(_) => self.content == ip.to_string(),
        }
    }
}

/// Outcome of a provider call
///
/// `NotFound` is kept apart from `Failure` so the caller can tell an invalid
/// profile id from a transient outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome<T> {
    /// The call succeeded
    Success(T),
    /// The provider reported the profile (or record) does not exist
    NotFound,
    /// Any other failure: transport, provider error code, malformed response
    Failure(String),
}

/// Trait for rewrite provider implementations
///
/// One instance is bound to one account credential. Every operation is
/// scoped to a single profile.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return an outcome (the engine decides what to do with it)
///
/// ## Forbidden Capabilities
/// - ❌ Implement retry logic or backoff (the next cycle is the retry)
/// - ❌ Cache records beyond a single request
/// - ❌ Decide whether a rule needs changing (owned by the reconciler)
/// - ❌ Spawn tasks or threads
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    /// Fetch every rewrite rule of a profile
    async fn list_rewrites(&self, profile_id: &str) -> ProviderOutcome<Vec<ObservedRewrite>>;

    /// Create a rewrite rule
    ///
    /// Succeeds only if the provider echoes back a record with the requested
    /// name.
    async fn create_rewrite(
        &self,
        profile_id: &str,
        name: &str,
        content: &str,
    ) -> ProviderOutcome<ObservedRewrite>;

    /// Delete a rewrite rule by its identifier
    ///
    /// Returns `true` only when the provider confirms the deletion.
    async fn delete_rewrite(&self, profile_id: &str, rule_id: &str) -> bool;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing a provider bound to one account
pub trait RewriteProviderFactory: Send + Sync {
    /// Create a RewriteProvider for `account`
    ///
    /// # Returns
    ///
    /// A boxed RewriteProvider trait object, or `Error::Config` if the
    /// account cannot be used (e.g. empty credential)
    fn create(
        &self,
        account: &crate::config::AccountConfig,
    ) -> Result<Box<dyn RewriteProvider>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_to_compares_addresses() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        let rule = ObservedRewrite::new("r1", "a.example.com", "2001:0db8:0:0:0:0:0:1");
        assert!(rule.points_to(ip));

        let rule = ObservedRewrite::new("r1", "a.example.com", "9.9.9.9");
        assert!(!rule.points_to(IpAddr::from([1, 2, 3, 4])));
        assert!(rule.points_to(IpAddr::from([9, 9, 9, 9])));
    }

    #[test]
    fn test_points_to_non_address_content() {
        let rule = ObservedRewrite::new("r1", "a.example.com", "target.example.net");
        assert!(!rule.points_to(IpAddr::from([1, 2, 3, 4])));
    }

    #[test]
    fn test_observed_rewrite_tolerates_missing_fields() {
        let rule: ObservedRewrite =
            serde_json::from_str(r#"{ "id": "r1", "name": "a.example.com", "type": "A" }"#)
                .unwrap();
        assert_eq!(rule.content, "");
    }
}
