// # State Store Trait
//
// Defines the interface for persisting the last reconciled address.
//
// ## Purpose
//
// The state store gives the engine its change detection: an address equal
// to the persisted one needs no remote call. It survives process restarts.
//
// ## Implementations
//
// - File-based: plain text, one address
// - Memory: tests and ephemeral deployments
//
// ## Usage
//
// ```rust
// use allowsync_core::StateStore;
// use allowsync_core::state::MemoryStateStore;
// use std::net::IpAddr;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = MemoryStateStore::new();
//
//     // First run: nothing persisted yet
//     assert_eq!(store.load().await?, None);
//
//     // Commit after a successful apply
//     store.save(IpAddr::from([1, 2, 3, 4])).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for state store implementations
///
/// There is one persisted address per agent instance, so the store is keyed
/// implicitly.
///
/// # Implementation Guidelines
///
/// - **Async I/O only**: never block the runtime
/// - **Atomic save**: a concurrent `load()` must never observe a partial value
/// - **Absent is not an error**: `load()` on a fresh store returns `Ok(None)`
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last reconciled address
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IpAddr))`: The persisted address
    /// - `Ok(None)`: Nothing persisted yet (first run)
    /// - `Err(Error)`: Storage error or unreadable content
    async fn load(&self) -> Result<Option<IpAddr>, crate::Error>;

    /// Overwrite the persisted address
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Durably written
    /// - `Err(Error)`: Storage error
    async fn save(&self, ip: IpAddr) -> Result<(), crate::Error>;

    /// Persist any pending changes
    ///
    /// Stores that write through on `save()` can leave the default.
    async fn flush(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
