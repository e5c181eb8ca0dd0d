// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a state store that doesn't persist across restarts. Useful for
// testing and for deployments where one extra remote fetch after a restart
// is acceptable.
//
// ## Restart Behavior
//
// - The persisted address is lost on restart
// - The startup cycle fetches and reconciles regardless, so the remote list
//   is only rewritten if it is actually stale

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::StateStore;

/// In-memory state store implementation
///
/// Clones share the same slot, so a test can keep a handle while the
/// engine owns another.
///
/// # Example
///
/// ```rust,no_run
/// use allowsync_core::state::MemoryStateStore;
/// use allowsync_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     store.save("1.2.3.4".parse()?).await?;
///
///     let ip = store.load().await?;
///     assert_eq!(ip, Some("1.2.3.4".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<IpAddr>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds an address
    pub fn with_address(ip: IpAddr) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(ip))),
        }
    }

    /// Forget the persisted address
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<IpAddr>, Error> {
        Ok(*self.inner.read().await)
    }

    async fn save(&self, ip: IpAddr) -> Result<(), Error> {
        *self.inner.write().await = Some(ip);
        Ok(())
    }
}
