// # regsync-core
//
// Core library for the registry back-office synchronization system.
//
// ## What lives here
//
// This library keeps a local registrar database aligned with the
// authoritative registry over EPP:
// - **EppGateway**: Trait for the registry connection (info, renew, poll)
// - **RegistryStore**: Trait for the local database behind the engine
// - **SyncEngine**: Reads the registry and reconciles one domain at a time
// - **RenewTracker**: Tracks backend renewals from submission to confirmation
// - **PollListener**: Drains the registry poll queue into the engine
// - **CsvImporter**: Seeds the store from an operator CSV export
// - **GatewayRegistry**: Plugin-based registry for gateways and stores
//
// ## Ground rules
//
// 1. **Registry-Authoritative**: local rows follow what the registry reports,
//    never the other way around
// 2. **Idempotency**: every operation can be replayed safely, so at-least-once
//    poll delivery and retries are harmless
// 3. **Plugin-Based**: gateways and stores are registered dynamically, no
//    hard-coded if-else
// 4. **Library-First**: all core functionality can be used as a library

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod poll;
pub mod import;

// The types most callers need, at the crate root
pub use traits::{EppGateway, RegistryStore};
pub use engine::{QuickSyncReport, RenewTracker, SyncEngine, SyncEvent, SyncOptions};
pub use registry::GatewayRegistry;
pub use config::{GatewayConfig, RegsyncConfig, StoreConfig};
pub use error::{EppError, Error, Result};
pub use model::{Domain, DomainStatus};
pub use store::{FileStore, MemoryStore};
pub use poll::PollListener;
pub use import::{CsvImporter, ImportReport};
