// # IP Source Trait
//
// Defines the interface for resolving the host's current public IP address.
//
// ## Implementations
//
// - Dual-stack HTTP lookup: `rewrite-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use rewrite_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     let current_ip = source.current().await?;
//     println!("Public IP: {}", current_ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for IP source implementations
///
/// The engine calls [`IpSource::current`] exactly once per cycle and
/// reconciles every profile against that single answer.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform outbound lookups with bounded timeouts
/// - ✅ Absorb individual lookup failures and fall back between endpoints
///
/// ## Forbidden Capabilities
/// - ❌ Touch provider records (use `RewriteProvider`)
/// - ❌ Cache answers across calls (every cycle must see a fresh address)
/// - ❌ Spawn polling loops (scheduling is owned by `ReconcileEngine`)
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current IP address
    /// - `Err(Error::IpSource)`: No endpoint produced a usable answer
    async fn current(&self) -> Result<IpAddr, crate::Error>;
}
