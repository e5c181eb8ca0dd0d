//! Test doubles and common utilities for contract tests
//!
//! Every double is cheaply cloneable and clones share state, so a test can
//! hand one copy to the engine and keep another for assertions.

#![allow(dead_code)]

use allowsync_core::error::{Error, Result};
use allowsync_core::traits::{AddressProber, AllowListProvider, ApplyResult, IpVersion, StateStore};
use allowsync_core::{AllowList, AllowListEntry, MemoryStateStore, ResourceRef, SyncConfig};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Parse an address literal
pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

/// Build an allow-list from (cidr, label) pairs
pub fn list(entries: &[(&str, &str)]) -> AllowList {
    entries
        .iter()
        .map(|(cidr, label)| AllowListEntry::new(*cidr, *label))
        .collect()
}

/// The cluster every test targets
pub fn cluster() -> ResourceRef {
    ResourceRef::new("test-project", "us-central1-c", "test-cluster")
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(owned_label: &str) -> SyncConfig {
    let mut config = SyncConfig::new(owned_label, cluster());
    config.engine.interval_secs = 60;
    config.engine.event_channel_capacity = 100;
    config
}

/// An address prober whose answer the test controls
#[derive(Clone)]
pub struct ScriptedProber {
    /// `None` simulates an outage of the address service
    address: Arc<Mutex<Option<IpAddr>>>,
    probe_count: Arc<AtomicUsize>,
    version: Option<IpVersion>,
}

impl ScriptedProber {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address: Arc::new(Mutex::new(Some(address))),
            probe_count: Arc::new(AtomicUsize::new(0)),
            version: None,
        }
    }

    /// Declare the address family this prober is restricted to
    pub fn restricted_to(mut self, version: IpVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn set_address(&self, address: IpAddr) {
        *self.address.lock().unwrap() = Some(address);
    }

    pub fn go_offline(&self) {
        *self.address.lock().unwrap() = None;
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressProber for ScriptedProber {
    async fn probe(&self) -> Result<IpAddr> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        (*self.address.lock().unwrap())
            .ok_or_else(|| Error::address_probe("address service unreachable"))
    }

    fn version(&self) -> Option<IpVersion> {
        self.version
    }

    fn prober_name(&self) -> &'static str {
        "scripted"
    }
}

/// How a mock remote call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Unavailable,
    NotFound,
    PermissionDenied,
    Conflict,
}

impl Failure {
    fn to_error(self) -> Option<Error> {
        match self {
            Failure::None => None,
            Failure::Unavailable => Some(Error::remote_api("mock", "503 Service Unavailable")),
            Failure::NotFound => Some(Error::not_found("cluster test-cluster")),
            Failure::PermissionDenied => Some(Error::permission_denied("container.clusters.update")),
            Failure::Conflict => Some(Error::conflict("operation already in progress")),
        }
    }
}

/// A mock remote allow-list that records every submitted list
#[derive(Clone)]
pub struct MockAllowListProvider {
    remote: Arc<Mutex<AllowList>>,
    applied: Arc<Mutex<Vec<AllowList>>>,
    fetch_count: Arc<AtomicUsize>,
    apply_count: Arc<AtomicUsize>,
    fetch_failure: Arc<Mutex<Failure>>,
    apply_failure: Arc<Mutex<Failure>>,
    dry_run: Arc<AtomicBool>,
}

impl MockAllowListProvider {
    pub fn new(remote: AllowList) -> Self {
        Self {
            remote: Arc::new(Mutex::new(remote)),
            applied: Arc::new(Mutex::new(Vec::new())),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            apply_count: Arc::new(AtomicUsize::new(0)),
            fetch_failure: Arc::new(Mutex::new(Failure::None)),
            apply_failure: Arc::new(Mutex::new(Failure::None)),
            dry_run: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Accept applies without changing the remote list
    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, failure: Failure) {
        *self.fetch_failure.lock().unwrap() = failure;
    }

    pub fn fail_apply(&self, failure: Failure) {
        *self.apply_failure.lock().unwrap() = failure;
    }

    /// Current remote list
    pub fn remote(&self) -> AllowList {
        self.remote.lock().unwrap().clone()
    }

    /// Replace the remote list behind the agent's back
    pub fn set_remote(&self, remote: AllowList) {
        *self.remote.lock().unwrap() = remote;
    }

    /// Every list passed to apply(), including failed attempts
    pub fn applied(&self) -> Vec<AllowList> {
        self.applied.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn apply_count(&self) -> usize {
        self.apply_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AllowListProvider for MockAllowListProvider {
    async fn fetch(&self, _resource: &ResourceRef) -> Result<AllowList> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_failure.lock().unwrap().to_error() {
            return Err(err);
        }
        Ok(self.remote())
    }

    async fn apply(&self, _resource: &ResourceRef, desired: &AllowList) -> Result<ApplyResult> {
        self.apply_count.fetch_add(1, Ordering::SeqCst);
        self.applied.lock().unwrap().push(desired.clone());
        if let Some(err) = self.apply_failure.lock().unwrap().to_error() {
            return Err(err);
        }
        if self.dry_run.load(Ordering::SeqCst) {
            return Ok(ApplyResult::DryRun);
        }
        self.set_remote(desired.clone());
        Ok(ApplyResult::Applied {
            operation: Some(format!("operation-{}", self.apply_count())),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A state store that counts calls and can refuse writes
#[derive(Clone, Default)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    save_count: Arc<AtomicUsize>,
    flush_count: Arc<AtomicUsize>,
    refuse_writes: Arc<Mutex<bool>>,
}

impl CountingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(ip: IpAddr) -> Self {
        Self {
            inner: MemoryStateStore::with_address(ip),
            ..Self::default()
        }
    }

    pub fn refuse_writes(&self, refuse: bool) {
        *self.refuse_writes.lock().unwrap() = refuse;
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    /// Persisted address, bypassing the counters
    pub async fn persisted(&self) -> Option<IpAddr> {
        self.inner.load().await.expect("memory store never fails")
    }
}

#[async_trait::async_trait]
impl StateStore for CountingStateStore {
    async fn load(&self) -> Result<Option<IpAddr>> {
        self.inner.load().await
    }

    async fn save(&self, ip: IpAddr) -> Result<()> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if *self.refuse_writes.lock().unwrap() {
            return Err(Error::state_store("disk full"));
        }
        self.inner.save(ip).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
