//! Configuration types for allowsync
//!
//! This module defines all configuration structures used throughout the crate.
//! A [`SyncConfig`] is built once at startup and handed to the engine by
//! value; nothing reads settings from globals afterwards.

use serde::{Deserialize, Serialize};

use crate::model::ResourceRef;

/// Main allowsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Display name of the allow-list entry this agent owns
    pub owned_label: String,

    /// Cluster whose allow-list is managed
    pub resource: ResourceRef,

    /// Address prober configuration
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// Allow-list provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the target
    pub fn new(owned_label: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            owned_label: owned_label.into(),
            resource,
            ip_source: IpSourceConfig::default(),
            provider: ProviderConfig::default(),
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.owned_label.trim().is_empty() {
            return Err(crate::Error::config("Owned label cannot be empty"));
        }

        self.resource.validate()?;
        self.ip_source.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Address prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// Plain-text HTTP address service
    Http {
        /// URL to fetch the address from
        url: String,
        /// IP version to accept (None = either)
        #[serde(default)]
        version: Option<IpVersion>,
    },
}

impl IpSourceConfig {
    /// Validate the address prober configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http { url, .. } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP IP source URL cannot be empty"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "HTTP IP source URL must use http or https: {}",
                        url
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            url: DEFAULT_IP_SOURCE_URL.to_string(),
            version: None,
        }
    }
}

/// Address service used when none is configured
pub const DEFAULT_IP_SOURCE_URL: &str = "http://checkip.amazonaws.com/";

/// IP version to accept from the prober
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
    /// Both IPv4 and IPv6
    Both,
}

impl std::str::FromStr for IpVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "v4" | "4" | "ipv4" => Ok(IpVersion::V4),
            "v6" | "6" | "ipv6" => Ok(IpVersion::V6),
            "both" | "any" => Ok(IpVersion::Both),
            other => Err(crate::Error::config(format!(
                "Unknown IP version '{}'. Valid: v4, v6, both",
                other
            ))),
        }
    }
}

/// Allow-list provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// GKE master authorized networks
    Gke {
        /// Service-account key file (None = Application Default Credentials)
        #[serde(default)]
        credentials_path: Option<String>,
        /// Fetch and log, but never submit updates
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Gke { .. } => "gke",
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Gke {
            credentials_path: None,
            dry_run: false,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period between cycle starts (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Stop with a fatal error after this many consecutive not-found or
    /// permission-denied responses from the remote API.
    ///
    /// `None` retries forever, which is right when outages and
    /// misconfiguration cannot be told apart.
    #[serde(default)]
    pub max_consecutive_rejections: Option<u32>,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Sync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.max_consecutive_rejections == Some(0) {
            return Err(crate::Error::config(
                "max_consecutive_rejections must be > 0 when set",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_consecutive_rejections: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}
