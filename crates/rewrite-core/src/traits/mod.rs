//! Core traits for the rewrite reconciler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Resolve the current public IP address
//! - [`RewriteProvider`]: List, create and delete rewrite rules via a provider API

pub mod ip_source;
pub mod rewrite_provider;

pub use ip_source::{IpSource, IpVersion};
pub use rewrite_provider::{
    ObservedRewrite, ProviderOutcome, RewriteProvider, RewriteProviderFactory,
};
