// # allowsync-core
//
// Core library for keeping a cluster's network allow-list in sync with the
// operator's current public address.
//
// ## Architecture Overview
//
// - **AddressProber**: Trait for discovering the current public address
// - **AllowListProvider**: Trait for reading and replacing a remote allow-list
// - **StateStore**: Trait for persisting the last reconciled address
// - **reconcile**: Pure merge of the owned entry into a remote list
// - **SyncEngine**: Drives probe → compare → reconcile → apply → persist
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Pure Merge**: The allow-list merge has no I/O and is unit-testable
// 3. **Single Writer**: One engine per managed entry, cycles never overlap
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Reconciling an already-correct list submits nothing

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, IpSourceConfig, ProviderConfig, StateStoreConfig, SyncConfig};
pub use engine::{CycleOutcome, EngineEvent, SyncEngine};
pub use error::{Error, ErrorClass, Result};
pub use model::{AllowList, AllowListEntry, ResourceRef};
pub use reconcile::{Reconciliation, reconcile};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{AddressProber, AllowListProvider, ApplyResult, StateStore};
