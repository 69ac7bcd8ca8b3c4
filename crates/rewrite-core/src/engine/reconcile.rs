//! Desired-vs-observed reconciliation for a single profile
//!
//! Reconciliation is split in two:
//!
//! - [`plan`] is a pure function of the current IP, the desired rules and the
//!   observed rules. It yields one [`RewriteAction`] per desired rule, in
//!   input order.
//! - [`reconcile_profile`] fetches the observed rules, plans, and drives the
//!   provider calls the plan calls for.
//!
//! The provider has no atomic update, so a drifted rule is replaced by a
//! delete followed by a create. The rule is briefly absent in between.

use crate::config::{ProfileConfig, RewriteRuleConfig};
use crate::traits::{ObservedRewrite, ProviderOutcome, RewriteProvider};
use std::net::IpAddr;
use tracing::{debug, error, info, warn};

/// What to do with one desired rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteAction {
    /// No observed rule carries this name
    Create { name: String },
    /// The first observed rule with this name points elsewhere
    Replace {
        name: String,
        stale_id: String,
        stale_content: String,
    },
    /// The first observed rule with this name already points at the IP
    Keep { name: String },
    /// The desired rule has no usable name
    SkipInvalid { index: usize },
}

/// Compute the actions that converge `observed` onto `desired` for `ip`
///
/// Only the first observed rule with a matching name is considered;
/// duplicates further down the list are ignored.
pub fn plan(
    ip: IpAddr,
    desired: &[RewriteRuleConfig],
    observed: &[ObservedRewrite],
) -> Vec<RewriteAction> {
    desired
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let Some(name) = rule.valid_name() else {
                return RewriteAction::SkipInvalid { index };
            };

            match observed.iter().find(|o| o.name == name) {
                None => RewriteAction::Create {
                    name: name.to_string(),
                },
                Some(current) if current.points_to(ip) => RewriteAction::Keep {
                    name: name.to_string(),
                },
                Some(current) => RewriteAction::Replace {
                    name: name.to_string(),
                    stale_id: current.id.clone(),
                    stale_content: current.content.clone(),
                },
            }
        })
        .collect()
}

/// Result of applying one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A missing rule was created
    Created { name: String },
    /// A drifted rule was deleted and recreated
    Replaced { name: String, previous: String },
    /// The rule was already converged
    Unchanged { name: String },
    /// The desired rule had no name
    Invalid { index: usize },
    /// A provider call failed; the next cycle will try again
    Failed { name: String, reason: String },
}

/// How far a profile got this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileStatus {
    /// Observed rules were fetched and the plan was applied
    Reconciled,
    /// The provider does not know this profile id
    NotFound,
    /// The observed rules could not be fetched
    Unavailable(String),
    /// The configured profile id is empty
    InvalidId,
}

/// Per-profile reconciliation summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileReport {
    pub profile_id: String,
    pub status: ProfileStatus,
    pub outcomes: Vec<RuleOutcome>,
}

impl ProfileReport {
    fn skipped(profile_id: &str, status: ProfileStatus) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            status,
            outcomes: Vec::new(),
        }
    }

    /// Number of rules created from scratch
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Created { .. }))
    }

    /// Number of drifted rules replaced
    pub fn replaced(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Replaced { .. }))
    }

    /// Number of rules left untouched
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Unchanged { .. }))
    }

    /// Number of desired rules skipped for having no name
    pub fn invalid(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Invalid { .. }))
    }

    /// Number of rules whose provider calls failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RuleOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|&o| pred(o)).count()
    }
}

/// Reconcile one profile against `ip`
///
/// Nothing is created or deleted unless the observed list was fetched
/// successfully: recreating against an unknown state would duplicate rules.
pub async fn reconcile_profile(
    provider: &dyn RewriteProvider,
    profile: &ProfileConfig,
    ip: IpAddr,
) -> ProfileReport {
    let profile_id = profile.profile_id.as_str();

    if profile_id.is_empty() {
        error!("Profile with empty profileId, skipping {} rewrite rule(s)", profile.rewrites.len());
        return ProfileReport::skipped(profile_id, ProfileStatus::InvalidId);
    }

    debug!("Fetching rewrite rules for profile '{}'", profile_id);
    let observed = match provider.list_rewrites(profile_id).await {
        ProviderOutcome::Success(rules) => rules,
        ProviderOutcome::NotFound => {
            error!(
                "Profile '{}' not found on {}, skipping profile",
                profile_id,
                provider.provider_name()
            );
            return ProfileReport::skipped(profile_id, ProfileStatus::NotFound);
        }
        ProviderOutcome::Failure(reason) => {
            warn!(
                "Rewrite rules of profile '{}' unavailable ({}), skipping profile this cycle",
                profile_id, reason
            );
            return ProfileReport::skipped(profile_id, ProfileStatus::Unavailable(reason));
        }
    };

    let actions = plan(ip, &profile.rewrites, &observed);
    let mut outcomes = Vec::with_capacity(actions.len());

    for action in actions {
        let outcome = apply(provider, profile_id, ip, action, &profile.rewrites).await;
        outcomes.push(outcome);
    }

    ProfileReport {
        profile_id: profile_id.to_string(),
        status: ProfileStatus::Reconciled,
        outcomes,
    }
}

async fn apply(
    provider: &dyn RewriteProvider,
    profile_id: &str,
    ip: IpAddr,
    action: RewriteAction,
    desired: &[RewriteRuleConfig],
) -> RuleOutcome {
    let content = ip.to_string();

    match action {
        RewriteAction::SkipInvalid { index } => {
            error!(
                "Invalid rewrite rule #{} in profile '{}': {:?}. Skipping rule",
                index,
                profile_id,
                desired.get(index)
            );
            RuleOutcome::Invalid { index }
        }
        RewriteAction::Keep { name } => {
            debug!(
                "Rewrite rule '{}' in profile '{}' already points to {}, skipping",
                name, profile_id, ip
            );
            RuleOutcome::Unchanged { name }
        }
        RewriteAction::Create { name } => {
            info!(
                "Rewrite rule '{}' in profile '{}' is not set, creating it with {}",
                name, profile_id, ip
            );
            create(provider, profile_id, name, &content).await
        }
        RewriteAction::Replace {
            name,
            stale_id,
            stale_content,
        } => {
            info!(
                "Updating rewrite rule '{}' in profile '{}': {} -> {}",
                name, profile_id, stale_content, ip
            );

            if !provider.delete_rewrite(profile_id, &stale_id).await {
                error!(
                    "Could not remove stale rewrite rule '{}' ({}) in profile '{}', not recreating it this cycle",
                    name, stale_id, profile_id
                );
                return RuleOutcome::Failed {
                    name,
                    reason: format!("delete of {} failed", stale_id),
                };
            }

            match create(provider, profile_id, name, &content).await {
                RuleOutcome::Created { name } => RuleOutcome::Replaced {
                    name,
                    previous: stale_content,
                },
                other => other,
            }
        }
    }
}

async fn create(
    provider: &dyn RewriteProvider,
    profile_id: &str,
    name: String,
    content: &str,
) -> RuleOutcome {
    let reason = match provider.create_rewrite(profile_id, &name, content).await {
        ProviderOutcome::Success(_) => return RuleOutcome::Created { name },
        ProviderOutcome::NotFound => format!("profile '{}' not found", profile_id),
        ProviderOutcome::Failure(reason) => reason,
    };

    error!(
        "Failed to create rewrite rule '{}' in profile '{}': {}",
        name, profile_id, reason
    );
    RuleOutcome::Failed { name, reason }
}
