// # Registry Store Trait
//
// Defines the interface for the local database behind the engine: the
// back office's view of domains, contacts, nameservers, owner accounts,
// and renewal rows, plus the two audit logs and the per-domain lease
// that serializes synchronization.
//
// ## Implementors
//
// - In-memory: `regsync_core::store::MemoryStore`
// - JSON file: `regsync_core::store::FileStore`
// - Future: SQL-backed stores
//
// A caller's view:
//
// ```rust,ignore
// use regsync_core::RegistryStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* RegistryStore implementation */;
//
//     let _lease = store.acquire_lease("example.com").await?;
//     let domain = store.find_domain("example.com").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::OwnedMutexGuard;

use crate::model::{
    Account, BackendRenew, Contact, Domain, DomainStatus, EventLogEntry, NameServer,
    TransitionLogEntry,
};

/// Exclusive per-domain lease.
///
/// Holding the lease serializes all synchronization work for one domain
/// name; a second acquirer waits until this value is dropped. The guard
/// is owned, so the lease can cross await points and task boundaries.
#[derive(Debug)]
pub struct DomainLease {
    domain_name: String,
    _guard: OwnedMutexGuard<()>,
}

impl DomainLease {
    /// Wrap an acquired guard. Called by store implementations only.
    pub fn new(domain_name: impl Into<String>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            domain_name: domain_name.into(),
            _guard: guard,
        }
    }

    /// The domain name this lease covers
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }
}

/// Fields for a renewal row about to be inserted.
///
/// The store assigns the id, the `started` status, and the creation
/// timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRenew {
    /// Domain being renewed
    pub domain_name: String,
    /// Account paying for the renewal
    pub owner_email: String,
    /// Billing order behind the renewal
    pub order_id: u64,
    /// Restore-fee order when the renewal restores a deleted domain
    pub restore_order_id: Option<u64>,
    /// Expiry on the domain row when the renewal started
    pub previous_expiry: Option<NaiveDate>,
}

/// Trait for registry store implementations
///
/// All reads return owned copies; writers pass full rows and the store
/// replaces by natural key. Single-row operations are atomic.
///
/// # Thread Safety
///
/// Every method may be called concurrently; the store does its own
/// locking. Cross-row consistency is the caller's job and is what
/// [`acquire_lease`](RegistryStore::acquire_lease) exists for; the store
/// itself never blocks one domain's writes on another's.
///
/// # Durability
///
/// Implementations may buffer writes but must persist everything on
/// [`flush`](RegistryStore::flush).
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // Domains

    /// Look up a domain by name
    async fn find_domain(&self, name: &str) -> Result<Option<Domain>, crate::Error>;

    /// Insert or replace a domain row, keyed by name
    async fn put_domain(&self, domain: &Domain) -> Result<(), crate::Error>;

    /// Remove a domain row. Removing a missing row is not an error.
    async fn remove_domain(&self, name: &str) -> Result<(), crate::Error>;

    /// All domain rows
    async fn list_domains(&self) -> Result<Vec<Domain>, crate::Error>;

    /// Domain rows currently in the given status
    async fn list_domains_by_status(
        &self,
        status: DomainStatus,
    ) -> Result<Vec<Domain>, crate::Error>;

    // Contacts

    /// Look up a contact by registry id
    async fn find_contact(&self, registry_id: &str) -> Result<Option<Contact>, crate::Error>;

    /// Insert or replace a contact row, keyed by registry id
    async fn put_contact(&self, contact: &Contact) -> Result<(), crate::Error>;

    /// All contact rows
    async fn list_contacts(&self) -> Result<Vec<Contact>, crate::Error>;

    // Nameservers

    /// Look up a nameserver by hostname
    async fn find_nameserver(&self, hostname: &str)
    -> Result<Option<NameServer>, crate::Error>;

    /// Insert or replace a nameserver row, keyed by hostname
    async fn put_nameserver(&self, nameserver: &NameServer) -> Result<(), crate::Error>;

    /// All nameserver rows
    async fn list_nameservers(&self) -> Result<Vec<NameServer>, crate::Error>;

    // Accounts

    /// Look up an account by email
    async fn find_account(&self, email: &str) -> Result<Option<Account>, crate::Error>;

    /// Insert or replace an account row, keyed by email
    async fn put_account(&self, account: &Account) -> Result<(), crate::Error>;

    /// All account rows
    async fn list_accounts(&self) -> Result<Vec<Account>, crate::Error>;

    // Backend renewals

    /// Insert a renewal row; the store assigns the id and returns the
    /// complete row
    async fn insert_renew(&self, renew: NewRenew) -> Result<BackendRenew, crate::Error>;

    /// Replace a renewal row by id
    async fn update_renew(&self, renew: &BackendRenew) -> Result<(), crate::Error>;

    /// Look up a renewal row by id
    async fn find_renew(&self, id: u64) -> Result<Option<BackendRenew>, crate::Error>;

    /// The `started` renewal for a domain, if one exists.
    ///
    /// The tracker guarantees at most one under the domain lease.
    async fn find_started_renew(
        &self,
        domain_name: &str,
    ) -> Result<Option<BackendRenew>, crate::Error>;

    /// All renewal rows for a domain, oldest first
    async fn list_renews(&self, domain_name: &str)
    -> Result<Vec<BackendRenew>, crate::Error>;

    // Audit logs

    /// Append a sync-attempt entry to the event log
    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), crate::Error>;

    /// Event-log entries for a domain, oldest first
    async fn list_events(&self, domain_name: &str)
    -> Result<Vec<EventLogEntry>, crate::Error>;

    /// Append a status-change entry to the transition log
    async fn append_transition(&self, entry: &TransitionLogEntry) -> Result<(), crate::Error>;

    /// Transition-log entries for a domain, oldest first
    async fn list_transitions(
        &self,
        domain_name: &str,
    ) -> Result<Vec<TransitionLogEntry>, crate::Error>;

    // Coordination

    /// Acquire the exclusive lease for a domain name, waiting if another
    /// holder has it
    async fn acquire_lease(&self, domain_name: &str) -> Result<DomainLease, crate::Error>;

    /// Write any buffered state to durable storage
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing stores from configuration
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Create a store instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: The store section of the configuration
    ///
    /// # Returns
    ///
    /// A shared store trait object
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<std::sync::Arc<dyn RegistryStore>, crate::Error>;
}
