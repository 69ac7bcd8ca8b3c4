// # rewrite-core
//
// Core library for the NextDNS rewrite reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping provider-side
// DNS rewrite rules pointed at the host's public IP:
// - **IpSource**: Trait for resolving the current public IP
// - **RewriteProvider**: Trait for listing, creating and deleting rewrite rules
// - **reconcile**: Pure desired-vs-observed planning plus its application
// - **ReconcileEngine**: Fixed-interval scheduler driving one cycle at a time
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from HTTP adapters
// 2. **Stateless Cycles**: Every cycle re-reads the provider; nothing is persisted
// 3. **Local Degradation**: A failing rule, profile or account never stops the rest
// 4. **Explicit Outcomes**: Provider results are tagged, never boolean tri-states

pub mod config;
pub mod engine;
pub mod error;
pub mod traits;

// Re-export core types for convenience
pub use config::{AccountConfig, ProfileConfig, RewriteConfig, RewriteRuleConfig};
pub use engine::{CycleReport, EngineEvent, ReconcileEngine};
pub use error::{Error, Result};
pub use traits::{IpSource, ObservedRewrite, ProviderOutcome, RewriteProvider, RewriteProviderFactory};
