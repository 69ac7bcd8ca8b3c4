//! Configuration types for the rewrite reconciler
//!
//! The configuration is a JSON document loaded once at startup and never
//! reloaded. Keys are camelCase; every list defaults to empty so a sparse
//! file yields a no-op cycle rather than an error.
//!
//! ```json
//! {
//!   "checkInterval": 60,
//!   "accounts": [
//!     { "apiToken": "...",
//!       "profiles": [
//!         { "profileId": "abc123",
//!           "rewrites": [ { "name": "home.example.com" } ] }
//!       ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default path of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/config.json";

/// Main reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteConfig {
    /// Seconds to sleep between two reconciliation cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval: u64,

    /// Accounts to reconcile, in order
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl RewriteConfig {
    /// Create an empty configuration with the default interval
    pub fn new() -> Self {
        Self {
            check_interval: default_check_interval_secs(),
            accounts: Vec::new(),
        }
    }

    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the configuration file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Validate the configuration
    ///
    /// Only structural problems that would make the loop meaningless are
    /// rejected here. Problems scoped to one account, profile or rule are
    /// reported at reconciliation time so the rest of the tree still runs.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval == 0 {
            return Err(crate::Error::config("checkInterval must be > 0"));
        }

        Ok(())
    }

    /// Interval between cycles
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Total number of profiles across all accounts
    pub fn profile_count(&self) -> usize {
        self.accounts.iter().map(|a| a.profiles.len()).sum()
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One provider account: a credential and the profiles it can manage
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// Provider API key
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub api_token: String,

    /// Profiles owned by this account, in order
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

impl AccountConfig {
    /// Create an account with no profiles
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            profiles: Vec::new(),
        }
    }

    /// Add a profile
    pub fn with_profile(mut self, profile: ProfileConfig) -> Self {
        self.profiles.push(profile);
        self
    }
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("api_token", &"<REDACTED>")
            .field("profiles", &self.profiles)
            .finish()
    }
}

/// A provider profile and the rewrites it should carry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    /// Provider-assigned profile identifier
    #[serde(default)]
    pub profile_id: String,

    /// Desired rewrite rules, in order
    #[serde(default)]
    pub rewrites: Vec<RewriteRuleConfig>,
}

impl ProfileConfig {
    /// Create a profile with no rewrites
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            rewrites: Vec::new(),
        }
    }

    /// Add a rewrite rule for `name`
    pub fn with_rewrite(mut self, name: impl Into<String>) -> Self {
        self.rewrites.push(RewriteRuleConfig::new(name));
        self
    }

    /// Add a rewrite rule as-is (including invalid ones)
    pub fn with_rule(mut self, rule: RewriteRuleConfig) -> Self {
        self.rewrites.push(rule);
        self
    }
}

/// A desired rewrite rule
///
/// The rule's content is implicit: it is always the public IP resolved for
/// the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRuleConfig {
    /// Hostname (or pattern) to rewrite
    #[serde(default)]
    pub name: Option<String>,
}

impl RewriteRuleConfig {
    /// Create a rule for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// The rule name, if present and non-empty
    pub fn valid_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

fn default_check_interval_secs() -> u64 {
    60
}
