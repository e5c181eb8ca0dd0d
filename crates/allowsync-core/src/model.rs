//! Allow-list data model
//!
//! These types are provider-neutral: the GKE provider converts its
//! protobuf messages to and from them at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// One permitted network range on the remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowListEntry {
    /// Network and prefix length, e.g. "10.0.0.0/8"
    pub cidr: String,
    /// Human-readable display name
    pub label: String,
}

impl AllowListEntry {
    /// Create a new entry
    pub fn new(cidr: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            cidr: cidr.into(),
            label: label.into(),
        }
    }

    /// Single-host entry for an address (`/32` for IPv4, `/128` for IPv6)
    pub fn for_host(ip: IpAddr, label: impl Into<String>) -> Self {
        let prefix = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self::new(format!("{}/{}", ip, prefix), label)
    }

    /// Parse the network address and prefix length
    ///
    /// Returns `None` for malformed CIDR strings. Entries are compared
    /// through this so that "2001:DB8::1/128" and "2001:db8::1/128" match.
    pub fn host(&self) -> Option<(IpAddr, u8)> {
        let (addr, prefix) = self.cidr.trim().split_once('/')?;
        let addr: IpAddr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        (prefix <= max).then_some((addr, prefix))
    }

    /// Whether this entry permits exactly one host
    pub fn is_single_host(&self) -> bool {
        matches!(self.host(), Some((IpAddr::V4(_), 32)) | Some((IpAddr::V6(_), 128)))
    }

    /// Same network as `other`, ignoring labels and textual formatting
    pub fn same_network(&self, other: &AllowListEntry) -> bool {
        match (self.host(), other.host()) {
            (Some(a), Some(b)) => a == b,
            _ => self.cidr == other.cidr,
        }
    }
}

impl fmt::Display for AllowListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.cidr, self.label)
    }
}

/// A remote resource's collection of permitted ranges
///
/// Order is preserved as reported by the remote so that rewritten lists
/// keep foreign entries where their owners put them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    entries: Vec<AllowListEntry>,
}

impl AllowList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in order
    pub fn entries(&self) -> &[AllowListEntry] {
        &self.entries
    }

    /// Consume the list into its entries
    pub fn into_entries(self) -> Vec<AllowListEntry> {
        self.entries
    }

    /// Append an entry
    pub fn push(&mut self, entry: AllowListEntry) {
        self.entries.push(entry);
    }

    /// Entries carrying `label`
    pub fn with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a AllowListEntry> {
        self.entries.iter().filter(move |e| e.label == label)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<AllowListEntry>> for AllowList {
    fn from(entries: Vec<AllowListEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<AllowListEntry> for AllowList {
    fn from_iter<T: IntoIterator<Item = AllowListEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AllowList {
    type Item = AllowListEntry;
    type IntoIter = std::vec::IntoIter<AllowListEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Identifies the remote resource whose allow-list is managed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Cloud project id
    pub project: String,
    /// Zone or region of the cluster
    pub location: String,
    /// Cluster id
    pub cluster: String,
}

impl ResourceRef {
    /// Create a new resource reference
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            cluster: cluster.into(),
        }
    }

    /// Validate that no component is empty or contains a path separator
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (field, value) in [
            ("project", &self.project),
            ("location", &self.location),
            ("cluster", &self.cluster),
        ] {
            if value.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "Resource {} cannot be empty",
                    field
                )));
            }
            if value.contains('/') {
                return Err(crate::Error::config(format!(
                    "Resource {} cannot contain '/': {}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/clusters/{}",
            self.project, self.location, self.cluster
        )
    }
}
