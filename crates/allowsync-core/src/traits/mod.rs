//! Core traits for allowsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressProber`]: Discover the current public address
//! - [`AllowListProvider`]: Read and replace a remote allow-list
//! - [`StateStore`]: Persist the last reconciled address

pub mod address_prober;
pub mod allow_list_provider;
pub mod state_store;

pub use address_prober::{AddressProber, IpVersion};
pub use allow_list_provider::{AllowListProvider, ApplyResult};
pub use state_store::StateStore;
