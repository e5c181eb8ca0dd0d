// # Allow-List Provider Trait
//
// Defines the interface for reading and replacing a remote resource's
// network allow-list.
//
// ## Implementations
//
// - GKE master authorized networks: `allowsync-provider-gke` crate
//
// ## Usage
//
// ```rust,ignore
// use allowsync_core::{AllowListProvider, ResourceRef, reconcile, Reconciliation};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* AllowListProvider implementation */;
//     let cluster = ResourceRef::new("my-project", "us-central1-c", "main");
//
//     let current = provider.fetch(&cluster).await?;
//     if let Reconciliation::Desired(desired) = reconcile(ip, "home", &current) {
//         provider.apply(&cluster, &desired).await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::{AllowList, ResourceRef};

/// Result of an apply call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The remote accepted the new list
    Applied {
        /// Provider-side handle for the change (e.g. a long-running operation name)
        operation: Option<String>,
    },
    /// Dry-run mode: the list was logged, not submitted
    DryRun,
}

/// Trait for allow-list provider implementations
///
/// # Replace Semantics
///
/// `apply()` replaces the *entire* remote list in one atomic call. There is
/// no incremental patch; callers must always submit the complete merged list
/// produced by [`crate::reconcile`].
///
/// # Responsibilities
///
/// ## Allowed
/// - ✅ API calls to the provider's own endpoints
/// - ✅ Mapping provider failures onto the crate error taxonomy
///   (`RemoteApi`, `NotFound`, `PermissionDenied`, `Conflict`, `Timeout`)
///
/// ## Forbidden
/// - ❌ Retry or backoff (owned by `SyncEngine`)
/// - ❌ Deciding whether an update is needed (owned by `reconcile`)
/// - ❌ Touching the state store (owned by `SyncEngine`)
/// - ❌ Editing entries it was not handed (foreign entries pass through verbatim)
#[async_trait]
pub trait AllowListProvider: Send + Sync {
    /// Retrieve the current allow-list of a resource
    ///
    /// # Returns
    ///
    /// - `Ok(AllowList)`: Entries in the order the remote reports them
    /// - `Err(Error)`: `NotFound`, `PermissionDenied`, `RemoteApi` or `Timeout`
    async fn fetch(&self, resource: &ResourceRef) -> Result<AllowList, crate::Error>;

    /// Replace the allow-list of a resource
    ///
    /// # Returns
    ///
    /// - `Ok(ApplyResult)`: The remote accepted the list (or dry-run)
    /// - `Err(Error)`: `Conflict`, `NotFound`, `PermissionDenied`, `RemoteApi` or `Timeout`
    async fn apply(
        &self,
        resource: &ResourceRef,
        desired: &AllowList,
    ) -> Result<ApplyResult, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
