//! Core reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Resolving the public IP once per cycle via IpSource
//! - Building one RewriteProvider per account
//! - Reconciling every profile against the resolved IP
//! - Sleeping for the configured interval, forever
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  IpSource   │─── current() ───────┐
//! └─────────────┘                     │
//!                                     ▼
//!                            ┌────────────────┐
//!                            │ ReconcileEngine│
//!                            └────────────────┘
//!                                     │
//!         ┌───────────────────────────┼───────────────────────────┐
//!         │                           │                           │
//!         ▼                           ▼                           ▼
//! ┌─────────────────┐       ┌──────────────────┐         ┌─────────────┐
//! │ ProviderFactory │──────▶│ reconcile_profile│         │   Events    │
//! │ (per account)   │       │ (per profile)    │         │  (notify)   │
//! └─────────────────┘       └──────────────────┘         └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Resolve the current IP (failure aborts the cycle before any provider call)
//! 2. For each account, build a provider from its credential
//! 3. For each profile, list observed rules, plan and apply
//! 4. Emit a summary event, sleep, repeat
//!
//! A failing cycle never stops the loop. Only a shutdown signal does. Each
//! cycle runs in its own task, so a panic inside a provider or IP source
//! fails that cycle only.

pub mod reconcile;

pub use reconcile::{
    ProfileReport, ProfileStatus, RewriteAction, RuleOutcome, plan, reconcile_profile,
};

use crate::config::RewriteConfig;
use crate::error::Result;
use crate::traits::{IpSource, RewriteProviderFactory};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Capacity of the engine event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        accounts_count: usize,
        profiles_count: usize,
    },

    /// A cycle began
    CycleStarted,

    /// The public IP for this cycle was resolved
    IpResolved { ip: IpAddr },

    /// An account was skipped (its provider could not be built)
    AccountSkipped { index: usize, reason: String },

    /// A profile was skipped without any create/delete
    ProfileSkipped { profile_id: String, reason: String },

    /// A missing rewrite rule was created
    RewriteCreated {
        profile_id: String,
        name: String,
        ip: IpAddr,
    },

    /// A drifted rewrite rule was replaced
    RewriteReplaced {
        profile_id: String,
        name: String,
        previous: String,
        ip: IpAddr,
    },

    /// A rewrite rule already pointed at the IP
    RewriteUnchanged { profile_id: String, name: String },

    /// A desired rule without a name was skipped
    RewriteInvalid { profile_id: String, index: usize },

    /// A provider call for a rewrite rule failed
    RewriteFailed {
        profile_id: String,
        name: String,
        error: String,
    },

    /// A cycle ran to completion
    CycleCompleted {
        created: usize,
        replaced: usize,
        unchanged: usize,
        failed: usize,
    },

    /// A cycle was aborted (e.g. no public IP)
    CycleFailed { error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// The IP every profile was reconciled against
    pub ip: IpAddr,
    /// One report per attempted profile, in configuration order
    pub profiles: Vec<ProfileReport>,
    /// Accounts skipped because no provider could be built for them
    pub skipped_accounts: usize,
}

impl CycleReport {
    fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            profiles: Vec::new(),
            skipped_accounts: 0,
        }
    }

    pub fn created(&self) -> usize {
        self.profiles.iter().map(ProfileReport::created).sum()
    }

    pub fn replaced(&self) -> usize {
        self.profiles.iter().map(ProfileReport::replaced).sum()
    }

    pub fn unchanged(&self) -> usize {
        self.profiles.iter().map(ProfileReport::unchanged).sum()
    }

    pub fn failed(&self) -> usize {
        self.profiles.iter().map(ProfileReport::failed).sum()
    }

    /// Number of profiles skipped without touching their rules
    pub fn skipped_profiles(&self) -> usize {
        self.profiles
            .iter()
            .filter(|p| p.status != ProfileStatus::Reconciled)
            .count()
    }
}

/// Core reconciliation engine
///
/// The engine owns the static configuration for the lifetime of the process
/// and drives one cycle at a time. Accounts, profiles and rules are processed
/// sequentially in configuration order, so a cycle is deterministic.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Start with [`ReconcileEngine::run_until()`]
/// 3. Engine runs until the shutdown future resolves
///
/// ## States
///
/// `Running` while a cycle executes, `Idle` while sleeping. There is no
/// terminal state besides shutdown.
///
/// Cloning is cheap: clones share the IP source, factory, configuration
/// and event channel.
#[derive(Clone)]
pub struct ReconcileEngine {
    /// Source of the public IP
    ip_source: Arc<dyn IpSource>,

    /// Builds one provider per account
    factory: Arc<dyn RewriteProviderFactory>,

    /// Desired state, read-only after construction
    config: Arc<RewriteConfig>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconciliation engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        factory: Box<dyn RewriteProviderFactory>,
        config: RewriteConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            ip_source: Arc::from(ip_source),
            factory: Arc::from(factory),
            config: Arc::new(config),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until `shutdown` resolves
    ///
    /// A cycle in flight when `shutdown` resolves is aborted; every provider
    /// call is idempotent so the next start picks up where it left off.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.emit_event(EngineEvent::Started {
            accounts_count: self.config.accounts.len(),
            profiles_count: self.config.profile_count(),
        });

        let interval = self.config.interval();
        info!("Checking rewrites every {} seconds", interval.as_secs());

        tokio::pin!(shutdown);

        loop {
            // Running
            let engine = self.clone();
            let mut cycle = tokio::spawn(async move { engine.run_cycle().await });

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    cycle.abort();
                    break;
                }

                joined = &mut cycle => {
                    let failure = match joined {
                        Ok(Ok(_)) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(e) => Some(format!("cycle task aborted: {}", e)),
                    };

                    if let Some(error) = failure {
                        error!("Reconciliation cycle failed: {}", error);
                        self.emit_event(EngineEvent::CycleFailed { error });
                    }
                }
            }

            // Idle
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Shutdown signal received, engine stopped");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Run a single reconciliation cycle
    ///
    /// # Returns
    ///
    /// - `Ok(CycleReport)`: Every account and profile was visited
    /// - `Err(Error::IpSource)`: No public IP; no provider call was made
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.emit_event(EngineEvent::CycleStarted);

        let ip = self.ip_source.current().await?;
        info!("Current public IP: {}", ip);
        self.emit_event(EngineEvent::IpResolved { ip });

        let mut report = CycleReport::new(ip);

        for (index, account) in self.config.accounts.iter().enumerate() {
            let provider = match self.factory.create(account) {
                Ok(provider) => provider,
                Err(e) => {
                    error!("Skipping account #{}: {}", index, e);
                    report.skipped_accounts += 1;
                    self.emit_event(EngineEvent::AccountSkipped {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            debug!(
                "Account #{}: {} profile(s) on {}",
                index,
                account.profiles.len(),
                provider.provider_name()
            );

            for profile in &account.profiles {
                let profile_report = reconcile_profile(provider.as_ref(), profile, ip).await;
                self.emit_profile_events(&profile_report, ip);
                report.profiles.push(profile_report);
            }
        }

        info!(
            "Cycle complete: {} created, {} replaced, {} unchanged, {} failed, {} profile(s) skipped",
            report.created(),
            report.replaced(),
            report.unchanged(),
            report.failed(),
            report.skipped_profiles()
        );

        self.emit_event(EngineEvent::CycleCompleted {
            created: report.created(),
            replaced: report.replaced(),
            unchanged: report.unchanged(),
            failed: report.failed(),
        });

        Ok(report)
    }

    fn emit_profile_events(&self, report: &ProfileReport, ip: IpAddr) {
        let profile_id = report.profile_id.clone();

        match &report.status {
            ProfileStatus::Reconciled => {}
            ProfileStatus::NotFound => {
                self.emit_event(EngineEvent::ProfileSkipped {
                    profile_id,
                    reason: "profile not found".to_string(),
                });
                return;
            }
            ProfileStatus::Unavailable(reason) => {
                self.emit_event(EngineEvent::ProfileSkipped {
                    profile_id,
                    reason: reason.clone(),
                });
                return;
            }
            ProfileStatus::InvalidId => {
                self.emit_event(EngineEvent::ProfileSkipped {
                    profile_id,
                    reason: "empty profile id".to_string(),
                });
                return;
            }
        }

        for outcome in &report.outcomes {
            let profile_id = profile_id.clone();
            let event = match outcome {
                RuleOutcome::Created { name } => EngineEvent::RewriteCreated {
                    profile_id,
                    name: name.clone(),
                    ip,
                },
                RuleOutcome::Replaced { name, previous } => EngineEvent::RewriteReplaced {
                    profile_id,
                    name: name.clone(),
                    previous: previous.clone(),
                    ip,
                },
                RuleOutcome::Unchanged { name } => EngineEvent::RewriteUnchanged {
                    profile_id,
                    name: name.clone(),
                },
                RuleOutcome::Invalid { index } => EngineEvent::RewriteInvalid {
                    profile_id,
                    index: *index,
                },
                RuleOutcome::Failed { name, reason } => EngineEvent::RewriteFailed {
                    profile_id,
                    name: name.clone(),
                    error: reason.clone(),
                },
            };
            self.emit_event(event);
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event");
        }
    }

    /// Test-only helper to run the engine with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: Contract tests require controlled shutdown.
    /// Production code should use `run_until()`.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_until(async move {
            let _ = shutdown_rx.await;
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::IpResolved {
            ip: IpAddr::from([1, 2, 3, 4]),
        };

        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_cycle_report_totals() {
        let mut report = CycleReport::new(IpAddr::from([1, 2, 3, 4]));
        report.profiles.push(ProfileReport {
            profile_id: "p1".to_string(),
            status: ProfileStatus::Reconciled,
            outcomes: vec![
                RuleOutcome::Created { name: "a".into() },
                RuleOutcome::Unchanged { name: "b".into() },
            ],
        });
        report.profiles.push(ProfileReport {
            profile_id: "p2".to_string(),
            status: ProfileStatus::NotFound,
            outcomes: Vec::new(),
        });

        assert_eq!(report.created(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.replaced(), 0);
        assert_eq!(report.skipped_profiles(), 1);
    }
}
