//! Allow-list sync engine
//!
//! The SyncEngine is responsible for:
//! - Probing the public address on a fixed period
//! - Comparing it with the persisted address
//! - Fetching, merging and replacing the remote allow-list on change
//! - Persisting the address after a successful update
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ AddressProber │─── IpAddr ───┐
//! └───────────────┘              │
//!                                ▼
//!                       ┌──────────────┐
//!                       │  SyncEngine  │
//!                       └──────────────┘
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//! ┌─────────────┐      ┌───────────────────┐     ┌─────────────┐
//! │ StateStore  │      │ AllowListProvider │     │   Events    │
//! │ (compare)   │      │ (fetch / apply)   │     │  (notify)   │
//! └─────────────┘      └───────────────────┘     └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Probe the current address
//! 2. Load the persisted address; equal means nothing to do
//! 3. Fetch the remote list and [`reconcile`] it
//! 4. Apply the desired list if the merge produced one
//! 5. Persist the address only after step 4 succeeded
//!
//! A dry-run apply changes nothing remotely, so it never persists the
//! address: every tick repeats the fetch and logs the intended update.
//!
//! Any failure ends the cycle without touching the persisted address, so the
//! next tick repeats the same work.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, ErrorClass, Result};
use crate::model::{AllowList, ResourceRef};
use crate::reconcile::{Reconciliation, reconcile};
use crate::traits::{AddressProber, AllowListProvider, ApplyResult, IpVersion, StateStore};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        resource: String,
        owned_label: String,
    },

    /// Address lookup failed; the cycle was skipped
    AddressProbeFailed {
        error: String,
    },

    /// Observed address differs from the persisted one
    AddressChangeDetected {
        previous_ip: Option<IpAddr>,
        new_ip: IpAddr,
    },

    /// Remote list already correct, nothing submitted
    UpdateSkipped {
        current_ip: IpAddr,
    },

    /// Remote list replaced
    UpdateSucceeded {
        previous_ip: Option<IpAddr>,
        new_ip: IpAddr,
        entries: usize,
    },

    /// Dry-run provider accepted the desired list without modifying the
    /// cluster; the persisted address is not advanced
    UpdateDryRun {
        new_ip: IpAddr,
        entries: usize,
    },

    /// Fetch or apply failed
    UpdateFailed {
        error: String,
        consecutive_rejections: u32,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// What a single cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Address equals the persisted one; no remote calls made
    Unchanged,
    /// Remote list fetched and already correct
    InSync,
    /// Remote list replaced
    Updated,
    /// Update computed and logged only; asked again next tick
    DryRun,
    /// Address lookup failed
    ProbeFailed,
    /// Remote list could not be read
    FetchFailed,
    /// Remote list could not be replaced
    ApplyFailed,
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`] or [`SyncEngine::run_until()`]
/// 3. The first cycle runs immediately; later cycles follow every
///    `interval_secs`
/// 4. Engine runs until the stop signal, or until a fatal error
///
/// ## Startup Convergence
///
/// The first cycle always fetches and reconciles, even when the persisted
/// address matches, so a fresh process repairs a remote list that was edited
/// while it was not running. A forced cycle that fails stays forced.
///
/// ## Threading
///
/// Cycles run strictly one after another on the caller's task. The engine
/// holds no locks; its counters are atomics only so that `run_cycle` can
/// take `&self`.
pub struct SyncEngine {
    /// Public address source
    prober: Box<dyn AddressProber>,

    /// Remote allow-list API
    provider: Box<dyn AllowListProvider>,

    /// Last reconciled address
    state_store: Box<dyn StateStore>,

    /// Managed cluster
    resource: ResourceRef,

    /// Label of the entry this agent owns
    owned_label: String,

    /// Period between cycle starts
    interval: Duration,

    /// Fatal threshold for not-found / permission-denied streaks
    max_consecutive_rejections: Option<u32>,

    /// Current not-found / permission-denied streak
    consecutive_rejections: AtomicU32,

    /// Next cycle must fetch even if the address is unchanged
    force_reconcile: AtomicBool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `prober`: Address prober implementation
    /// - `provider`: Allow-list provider implementation
    /// - `state_store`: State store implementation
    /// - `config`: Validated once here and immutable afterwards
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        prober: Box<dyn AddressProber>,
        provider: Box<dyn AllowListProvider>,
        state_store: Box<dyn StateStore>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            prober,
            provider,
            state_store,
            resource: config.resource,
            owned_label: config.owned_label,
            interval: Duration::from_secs(config.engine.interval_secs),
            max_consecutive_rejections: config.engine.max_consecutive_rejections,
            consecutive_rejections: AtomicU32::new(0),
            force_reconcile: AtomicBool::new(true),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or its sender is dropped)
    pub async fn run_until(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            resource: self.resource.to_string(),
            owned_label: self.owned_label.clone(),
        });
        info!(
            "Syncing allow-list entry {} on {} every {:?} via {} ({}) / {}",
            self.owned_label,
            self.resource,
            self.interval,
            self.prober.prober_name(),
            match self.prober.version() {
                Some(IpVersion::V4) => "IPv4 only",
                Some(IpVersion::V6) => "IPv6 only",
                None => "IPv4 or IPv6",
            },
            self.provider.provider_name()
        );

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        // First tick completes immediately: that is the startup cycle
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        break Err(e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        let reason = match &result {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => e.to_string(),
        };
        self.emit_event(EngineEvent::Stopped { reason });

        self.state_store.flush().await?;
        info!("State flushed, engine stopped");

        result
    }

    /// Run one probe → compare → reconcile → apply → persist cycle
    ///
    /// Transient and rejected failures are logged and reported through the
    /// returned outcome. `Err` means the engine must stop: a fatal error, or
    /// the rejection threshold was reached.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let forced = self.force_reconcile.load(Ordering::SeqCst);

        let probed = self.prober.probe().await.and_then(|ip| match self.prober.version() {
            Some(expected) if IpVersion::of(&ip) != expected => Err(Error::address_probe(format!(
                "{} reported {} but is restricted to {:?}",
                self.prober.prober_name(),
                ip,
                expected
            ))),
            _ => Ok(ip),
        });

        let observed = match probed {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Address probe via {} failed: {}", self.prober.prober_name(), e);
                self.emit_event(EngineEvent::AddressProbeFailed {
                    error: e.to_string(),
                });
                return Ok(CycleOutcome::ProbeFailed);
            }
        };

        let previous = match self.state_store.load().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Ignoring unreadable persisted address: {}", e);
                None
            }
        };

        if previous == Some(observed) {
            if !forced {
                debug!("Address unchanged: {}", observed);
                return Ok(CycleOutcome::Unchanged);
            }
            debug!("Verifying remote allow-list for {}", observed);
        } else {
            info!(
                "Address change detected: {} -> {}",
                previous.map(|ip| ip.to_string()).unwrap_or_else(|| "none".to_string()),
                observed
            );
            self.emit_event(EngineEvent::AddressChangeDetected {
                previous_ip: previous,
                new_ip: observed,
            });
        }

        let current = match self.provider.fetch(&self.resource).await {
            Ok(current) => current,
            Err(e) => return self.remote_failure("fetch", e).map(|_| CycleOutcome::FetchFailed),
        };

        let desired = match reconcile(observed, &self.owned_label, &current) {
            Reconciliation::NoChange => {
                info!(
                    "Allow-list of {} already permits {} as {}",
                    self.resource, observed, self.owned_label
                );
                self.emit_event(EngineEvent::UpdateSkipped {
                    current_ip: observed,
                });
                self.commit(observed).await;
                return Ok(CycleOutcome::InSync);
            }
            Reconciliation::Desired(desired) => desired,
        };

        match self.provider.apply(&self.resource, &desired).await {
            Ok(ApplyResult::DryRun) => {
                self.log_applied(&current, &desired, &ApplyResult::DryRun);
                self.consecutive_rejections.store(0, Ordering::SeqCst);
                self.emit_event(EngineEvent::UpdateDryRun {
                    new_ip: observed,
                    entries: desired.len(),
                });
                Ok(CycleOutcome::DryRun)
            }
            Ok(result) => {
                self.log_applied(&current, &desired, &result);
                self.emit_event(EngineEvent::UpdateSucceeded {
                    previous_ip: previous,
                    new_ip: observed,
                    entries: desired.len(),
                });
                self.commit(observed).await;
                Ok(CycleOutcome::Updated)
            }
            Err(e) => self.remote_failure("apply", e).map(|_| CycleOutcome::ApplyFailed),
        }
    }

    /// Record a successful reconciliation
    async fn commit(&self, observed: IpAddr) {
        self.consecutive_rejections.store(0, Ordering::SeqCst);
        self.force_reconcile.store(false, Ordering::SeqCst);

        // The remote is already correct, so a failed save only costs one
        // extra fetch on the next tick.
        if let Err(e) = self.state_store.save(observed).await {
            error!("Failed to persist address {}: {}", observed, e);
        }
    }

    /// Log and count a fetch/apply failure
    fn remote_failure(&self, stage: &str, e: Error) -> Result<()> {
        let rejections = match e.class() {
            ErrorClass::Rejected => self.consecutive_rejections.fetch_add(1, Ordering::SeqCst) + 1,
            ErrorClass::Transient => {
                self.consecutive_rejections.store(0, Ordering::SeqCst);
                0
            }
            ErrorClass::Fatal => {
                error!("Fatal error during {} on {}: {}", stage, self.resource, e);
                return Err(e);
            }
        };

        error!(
            "Failed to {} allow-list of {} via {}: {}",
            stage,
            self.resource,
            self.provider.provider_name(),
            e
        );
        self.emit_event(EngineEvent::UpdateFailed {
            error: e.to_string(),
            consecutive_rejections: rejections,
        });

        if let Some(max) = self.max_consecutive_rejections
            && rejections >= max
        {
            return Err(Error::config(format!(
                "Giving up on {} after {} consecutive rejections: {}",
                self.resource, rejections, e
            )));
        }

        Ok(())
    }

    fn log_applied(&self, current: &AllowList, desired: &AllowList, result: &ApplyResult) {
        let replaced: Vec<&str> = current
            .with_label(&self.owned_label)
            .map(|e| e.cidr.as_str())
            .collect();
        let new_cidr = desired
            .with_label(&self.owned_label)
            .map(|e| e.cidr.as_str())
            .next()
            .unwrap_or_default();

        match result {
            ApplyResult::Applied { operation } => info!(
                "Updated allow-list of {}: {} {:?} -> {} ({} entries, operation: {})",
                self.resource,
                self.owned_label,
                replaced,
                new_cidr,
                desired.len(),
                operation.as_deref().unwrap_or("n/a")
            ),
            ApplyResult::DryRun => info!(
                "[DRY-RUN] Would update allow-list of {}: {} {:?} -> {}",
                self.resource, self.owned_label, replaced, new_cidr
            ),
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_clone_eq() {
        let dry = EngineEvent::UpdateDryRun {
            new_ip: IpAddr::from([1, 2, 3, 4]),
            entries: 2,
        };
        assert_eq!(dry.clone(), dry);

        let event = EngineEvent::AddressChangeDetected {
            previous_ip: None,
            new_ip: IpAddr::from([1, 2, 3, 4]),
        };
        assert_eq!(event.clone(), event);
    }
}
