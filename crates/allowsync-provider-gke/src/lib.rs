// # GKE Authorized Networks Provider
//
// This crate provides the allow-list provider for GKE clusters: it reads and
// replaces a cluster's master authorized networks through the Cluster Manager
// API (gRPC).
//
// ## Behaviour
//
// - ✅ One API call per trait method (GetCluster / UpdateCluster)
// - ✅ Every call bounded by a 30 second timeout
// - ✅ gRPC status codes mapped to the allowsync error taxonomy
// - ✅ Dry-run mode: fetches for real, logs the intended update
// - ✅ The update always sets the authorized-networks feature enabled
// - ❌ NO retry logic (owned by SyncEngine)
// - ❌ NO merge logic (owned by `reconcile`)
// - ❌ NO waiting on the returned long-running operation
//
// ## Credentials
//
// Application Default Credentials unless a service-account key file is
// configured. Workload Identity on GKE and `gcloud auth
// application-default login` locally both work without extra flags.
//
// ## API Reference
//
// - GetCluster: `projects/{p}/locations/{l}/clusters/{c}`
// - UpdateCluster with `desired_master_authorized_networks_config`
//   replaces the whole list

use allowsync_core::config::ProviderConfig;
use allowsync_core::traits::{AllowListProvider, ApplyResult};
use allowsync_core::{AllowList, AllowListEntry, Error, ResourceRef, Result};

use async_trait::async_trait;
use gcloud_sdk::google::container::v1::cluster_manager_client::ClusterManagerClient;
use gcloud_sdk::google::container::v1::master_authorized_networks_config::CidrBlock;
use gcloud_sdk::google::container::v1::{
    ClusterUpdate, GetClusterRequest, MasterAuthorizedNetworksConfig, UpdateClusterRequest,
};
use gcloud_sdk::tonic::{Code, Status};
use gcloud_sdk::{GCP_DEFAULT_SCOPES, GoogleApi, GoogleAuthMiddleware, TokenSourceType};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Cluster Manager API endpoint
const CONTAINER_API_URL: &str = "https://container.googleapis.com";

/// Upper bound for a single API call
const API_CALL_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "gke";

/// GKE master authorized networks provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform GetCluster as usual
/// - Log the UpdateCluster payload it would have sent
/// - **NOT** modify the cluster
pub struct GkeAllowListProvider {
    /// Authenticated Cluster Manager client
    client: GoogleApi<ClusterManagerClient<GoogleAuthMiddleware>>,

    /// Service-account key file, if not using ADC
    credentials_path: Option<PathBuf>,

    /// Dry-run mode: if true, fetch but skip updates
    dry_run: bool,
}

impl std::fmt::Debug for GkeAllowListProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GkeAllowListProvider")
            .field("client", &"<GoogleApi>")
            .field("credentials_path", &self.credentials_path)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl GkeAllowListProvider {
    /// Create a new GKE provider
    ///
    /// # Parameters
    ///
    /// - `credentials_path`: Service-account key file (None = Application Default Credentials)
    /// - `dry_run`: If true, fetch but never submit updates
    ///
    /// # Errors
    ///
    /// `Error::Config` if no credentials can be found or the key file is unusable.
    pub async fn new(credentials_path: Option<PathBuf>, dry_run: bool) -> Result<Self> {
        let client = match &credentials_path {
            Some(path) => {
                tracing::debug!("Using service-account key file {}", path.display());
                GoogleApi::from_function_with_token_source(
                    ClusterManagerClient::new,
                    CONTAINER_API_URL,
                    None,
                    GCP_DEFAULT_SCOPES.clone(),
                    TokenSourceType::File(path.clone()),
                )
                .await
            }
            None => {
                tracing::debug!("Using Application Default Credentials");
                GoogleApi::from_function(ClusterManagerClient::new, CONTAINER_API_URL, None).await
            }
        }
        .map_err(|e| Error::config(format!("Failed to initialize GKE client: {}", e)))?;

        Ok(Self {
            client,
            credentials_path,
            dry_run,
        })
    }

    /// Build a provider from its configuration
    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        match config {
            ProviderConfig::Gke {
                credentials_path,
                dry_run,
            } => {
                let credentials_path = credentials_path
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from);
                Self::new(credentials_path, *dry_run).await
            }
        }
    }

    /// Check if the provider is in dry-run mode
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl AllowListProvider for GkeAllowListProvider {
    /// Read the cluster's authorized networks
    ///
    /// A cluster without an authorized-networks config yields an empty list.
    async fn fetch(&self, resource: &ResourceRef) -> Result<AllowList> {
        let request = GetClusterRequest {
            name: resource.to_string(),
            ..Default::default()
        };

        tracing::debug!("GetCluster {}", resource);
        let cluster = bounded("GetCluster", self.client.get().get_cluster(request))
            .await?
            .into_inner();

        let list = from_authorized_networks(cluster.master_authorized_networks_config);
        tracing::debug!("{} has {} authorized networks", resource, list.len());
        Ok(list)
    }

    /// Replace the cluster's authorized networks with `desired`
    ///
    /// # API Calls
    ///
    /// ```text
    /// UpdateCluster {
    ///   name: projects/{p}/locations/{l}/clusters/{c}
    ///   update.desired_master_authorized_networks_config {
    ///     enabled: true
    ///     cidr_blocks: [...]
    ///   }
    /// }
    /// ```
    async fn apply(&self, resource: &ResourceRef, desired: &AllowList) -> Result<ApplyResult> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send UpdateCluster for {} with payload: {}",
                resource,
                dry_run_payload(desired)
            );
            return Ok(ApplyResult::DryRun);
        }

        let operation = bounded(
            "UpdateCluster",
            self.client.get().update_cluster(update_request(resource, desired)),
        )
        .await?
        .into_inner();

        tracing::debug!(
            "UpdateCluster for {} started operation {}",
            resource,
            operation.name
        );

        Ok(ApplyResult::Applied {
            operation: Some(operation.name).filter(|name| !name.is_empty()),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Await an API call, bounded by [`API_CALL_TIMEOUT`]
async fn bounded<T, F>(call: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, Status>>,
{
    match tokio::time::timeout(API_CALL_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(status)) => Err(map_status(call, status)),
        Err(_) => Err(Error::timeout(format!(
            "{} did not complete within {}s",
            call,
            API_CALL_TIMEOUT.as_secs()
        ))),
    }
}

/// Map a gRPC status to the allowsync error taxonomy
pub fn map_status(call: &str, status: Status) -> Error {
    let message = format!("{}: {}", call, status.message());

    match status.code() {
        Code::NotFound => Error::not_found(message),
        Code::PermissionDenied | Code::Unauthenticated => Error::permission_denied(message),
        // An update is already running on the cluster
        Code::FailedPrecondition | Code::Aborted => Error::conflict(message),
        Code::DeadlineExceeded => Error::timeout(message),
        Code::InvalidArgument => Error::invalid_input(message),
        code => Error::remote_api(PROVIDER_NAME, format!("{} ({:?})", message, code)),
    }
}

/// Convert the cluster's authorized-networks config into an allow-list
pub fn from_authorized_networks(config: Option<MasterAuthorizedNetworksConfig>) -> AllowList {
    config
        .map(|config| config.cidr_blocks)
        .unwrap_or_default()
        .into_iter()
        .map(|block| AllowListEntry::new(block.cidr_block, block.display_name))
        .collect()
}

/// Convert an allow-list into the API's CIDR blocks, preserving order
pub fn to_cidr_blocks(list: &AllowList) -> Vec<CidrBlock> {
    list.entries()
        .iter()
        .map(|entry| CidrBlock {
            display_name: entry.label.clone(),
            cidr_block: entry.cidr.clone(),
        })
        .collect()
}

/// Build the UpdateCluster request replacing the whole list
pub fn update_request(resource: &ResourceRef, desired: &AllowList) -> UpdateClusterRequest {
    UpdateClusterRequest {
        name: resource.to_string(),
        update: Some(ClusterUpdate {
            desired_master_authorized_networks_config: Some(MasterAuthorizedNetworksConfig {
                enabled: true,
                cidr_blocks: to_cidr_blocks(desired),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Payload logged in dry-run mode
fn dry_run_payload(desired: &AllowList) -> serde_json::Value {
    let blocks: Vec<serde_json::Value> = desired
        .entries()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "displayName": entry.label,
                "cidrBlock": entry.cidr,
            })
        })
        .collect();

    serde_json::json!({
        "update": {
            "desiredMasterAuthorizedNetworksConfig": {
                "enabled": true,
                "cidrBlocks": blocks,
            }
        }
    })
}
