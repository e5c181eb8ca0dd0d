// # Address Prober Trait
//
// Defines the interface for discovering the operator's current public address.
//
// ## Implementations
//
// - HTTP plain-text services: `allowsync-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use allowsync_core::AddressProber;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let prober = /* AddressProber implementation */;
//
//     let ip = prober.probe().await?;
//     println!("public address: {}", ip);
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

impl IpVersion {
    /// The version of a concrete address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

/// Trait for address prober implementations
///
/// A prober performs exactly one lookup per call and reports the address
/// it saw. Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// ## Allowed
/// - ✅ One outbound request per `probe()` call
/// - ✅ Trimming and validating the returned token
/// - ✅ A per-request timeout, reported as an `AddressProbe` error
///
/// ## Forbidden
/// - ❌ Retrying (the engine retries on its next tick)
/// - ❌ Caching results between calls (the engine compares against `StateStore`)
/// - ❌ Spawning background polling loops (the engine owns scheduling)
#[async_trait]
pub trait AddressProber: Send + Sync {
    /// Look up the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The address reported by the source
    /// - `Err(Error::AddressProbe)`: The source was unreachable or returned garbage
    async fn probe(&self) -> Result<IpAddr, crate::Error>;

    /// Get the IP version this prober is restricted to
    ///
    /// Returns `None` if either version is accepted.
    fn version(&self) -> Option<IpVersion> {
        None
    }

    /// Name of the prober (for logging)
    fn prober_name(&self) -> &'static str;
}
