// # Memory Store
//
// In-memory implementation of RegistryStore.
//
// A simple, fast store that does not persist across restarts; the
// default for tests and for ephemeral runs where the next quick-sync
// rebuilds local state from the registry anyway.
//
// ## On restart
//
// - Every table is gone
// - Renew ids restart from 1, so renewal history does not survive
// - Nothing to recover; the registry remains the source of truth
//
// ## Fits
//
// - Tests
// - Dry runs and one-shot imports
// - Deployments where a full resync on start is acceptable

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LeaseMap, Tables};
use crate::Error;
use crate::config::StoreConfig;
use crate::model::{
    Account, BackendRenew, Contact, Domain, DomainStatus, EventLogEntry, NameServer,
    TransitionLogEntry,
};
use crate::traits::store::{DomainLease, NewRenew, RegistryStore, StoreFactory};

/// In-memory registry store
///
/// All tables live in a [`Tables`] value behind one RwLock; the lease map
/// is separate so holding a lease never blocks reads.
///
/// # Example
///
/// ```rust,no_run
/// use regsync_core::store::MemoryStore;
/// use regsync_core::RegistryStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let domain = store.find_domain("example.com").await?;
///     assert!(domain.is_none());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    leases: Arc<LeaseMap>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every entity table is empty
    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.is_empty()
    }

    /// Drop all rows from all tables
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn find_domain(&self, name: &str) -> Result<Option<Domain>, Error> {
        Ok(self.tables.read().await.find_domain(name))
    }

    async fn put_domain(&self, domain: &Domain) -> Result<(), Error> {
        self.tables.write().await.put_domain(domain);
        Ok(())
    }

    async fn remove_domain(&self, name: &str) -> Result<(), Error> {
        self.tables.write().await.remove_domain(name);
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, Error> {
        Ok(self.tables.read().await.list_domains())
    }

    async fn list_domains_by_status(
        &self,
        status: DomainStatus,
    ) -> Result<Vec<Domain>, Error> {
        Ok(self.tables.read().await.list_domains_by_status(status))
    }

    async fn find_contact(&self, registry_id: &str) -> Result<Option<Contact>, Error> {
        Ok(self.tables.read().await.find_contact(registry_id))
    }

    async fn put_contact(&self, contact: &Contact) -> Result<(), Error> {
        self.tables.write().await.put_contact(contact);
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, Error> {
        Ok(self.tables.read().await.list_contacts())
    }

    async fn find_nameserver(&self, hostname: &str) -> Result<Option<NameServer>, Error> {
        Ok(self.tables.read().await.find_nameserver(hostname))
    }

    async fn put_nameserver(&self, nameserver: &NameServer) -> Result<(), Error> {
        self.tables.write().await.put_nameserver(nameserver);
        Ok(())
    }

    async fn list_nameservers(&self) -> Result<Vec<NameServer>, Error> {
        Ok(self.tables.read().await.list_nameservers())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self.tables.read().await.find_account(email))
    }

    async fn put_account(&self, account: &Account) -> Result<(), Error> {
        self.tables.write().await.put_account(account);
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, Error> {
        Ok(self.tables.read().await.list_accounts())
    }

    async fn insert_renew(&self, renew: NewRenew) -> Result<BackendRenew, Error> {
        Ok(self.tables.write().await.insert_renew(renew))
    }

    async fn update_renew(&self, renew: &BackendRenew) -> Result<(), Error> {
        if self.tables.write().await.update_renew(renew) {
            Ok(())
        } else {
            Err(Error::RenewNotFound(renew.id))
        }
    }

    async fn find_renew(&self, id: u64) -> Result<Option<BackendRenew>, Error> {
        Ok(self.tables.read().await.find_renew(id))
    }

    async fn find_started_renew(
        &self,
        domain_name: &str,
    ) -> Result<Option<BackendRenew>, Error> {
        Ok(self.tables.read().await.find_started_renew(domain_name))
    }

    async fn list_renews(&self, domain_name: &str) -> Result<Vec<BackendRenew>, Error> {
        Ok(self.tables.read().await.list_renews(domain_name))
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), Error> {
        self.tables.write().await.append_event(entry);
        Ok(())
    }

    async fn list_events(&self, domain_name: &str) -> Result<Vec<EventLogEntry>, Error> {
        Ok(self.tables.read().await.list_events(domain_name))
    }

    async fn append_transition(&self, entry: &TransitionLogEntry) -> Result<(), Error> {
        self.tables.write().await.append_transition(entry);
        Ok(())
    }

    async fn list_transitions(
        &self,
        domain_name: &str,
    ) -> Result<Vec<TransitionLogEntry>, Error> {
        Ok(self.tables.read().await.list_transitions(domain_name))
    }

    async fn acquire_lease(&self, domain_name: &str) -> Result<DomainLease, Error> {
        Ok(self.leases.acquire(domain_name).await)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered; writes land in the tables directly
        Ok(())
    }
}

/// Factory for building memory stores from configuration
pub struct MemoryStoreFactory;

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn RegistryStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            other => Err(Error::config(format!(
                "memory store factory cannot build config: {:?}",
                other
            ))),
        }
    }
}
