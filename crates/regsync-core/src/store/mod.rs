//! Store implementations
//!
//! Two reference implementations of [`RegistryStore`]:
//!
//! - [`MemoryStore`]: all tables in memory, lost on restart
//! - [`FileStore`]: JSON file persistence with crash recovery
//!
//! Both share the same table layout ([`Tables`]) and lease map, so they
//! behave identically apart from durability.

pub mod file;
pub mod memory;

pub use file::{FileStore, FileStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{
    Account, BackendRenew, Contact, Domain, DomainStatus, EventLogEntry, NameServer,
    RenewStatus, TransitionLogEntry,
};
use crate::traits::store::{DomainLease, NewRenew};

/// The complete table set behind a store.
///
/// Plain data, no locking; stores wrap it in whatever synchronization
/// they need. Serializable so the file store can persist it wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    domains: HashMap<String, Domain>,
    contacts: HashMap<String, Contact>,
    nameservers: HashMap<String, NameServer>,
    accounts: HashMap<String, Account>,
    /// Keyed by id; BTreeMap keeps renewals in assignment order
    renews: BTreeMap<u64, BackendRenew>,
    next_renew_id: u64,
    events: Vec<EventLogEntry>,
    transitions: Vec<TransitionLogEntry>,
}

impl Tables {
    pub(crate) fn find_domain(&self, name: &str) -> Option<Domain> {
        self.domains.get(name).cloned()
    }

    pub(crate) fn put_domain(&mut self, domain: &Domain) {
        self.domains.insert(domain.name.clone(), domain.clone());
    }

    pub(crate) fn remove_domain(&mut self, name: &str) {
        self.domains.remove(name);
    }

    pub(crate) fn list_domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self.domains.values().cloned().collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        domains
    }

    pub(crate) fn list_domains_by_status(&self, status: DomainStatus) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self
            .domains
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        domains
    }

    pub(crate) fn find_contact(&self, registry_id: &str) -> Option<Contact> {
        self.contacts.get(registry_id).cloned()
    }

    pub(crate) fn put_contact(&mut self, contact: &Contact) {
        self.contacts
            .insert(contact.registry_id.clone(), contact.clone());
    }

    pub(crate) fn list_contacts(&self) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self.contacts.values().cloned().collect();
        contacts.sort_by(|a, b| a.registry_id.cmp(&b.registry_id));
        contacts
    }

    pub(crate) fn find_nameserver(&self, hostname: &str) -> Option<NameServer> {
        self.nameservers.get(hostname).cloned()
    }

    pub(crate) fn put_nameserver(&mut self, nameserver: &NameServer) {
        self.nameservers
            .insert(nameserver.hostname.clone(), nameserver.clone());
    }

    pub(crate) fn list_nameservers(&self) -> Vec<NameServer> {
        let mut hosts: Vec<NameServer> = self.nameservers.values().cloned().collect();
        hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        hosts
    }

    pub(crate) fn find_account(&self, email: &str) -> Option<Account> {
        self.accounts.get(email).cloned()
    }

    pub(crate) fn put_account(&mut self, account: &Account) {
        self.accounts.insert(account.email.clone(), account.clone());
    }

    pub(crate) fn list_accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.email.cmp(&b.email));
        accounts
    }

    pub(crate) fn insert_renew(&mut self, renew: NewRenew) -> BackendRenew {
        self.next_renew_id += 1;
        let row = BackendRenew {
            id: self.next_renew_id,
            domain_name: renew.domain_name,
            owner_email: renew.owner_email,
            order_id: renew.order_id,
            restore_order_id: renew.restore_order_id,
            previous_expiry: renew.previous_expiry,
            next_expiry: None,
            status: RenewStatus::Started,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.renews.insert(row.id, row.clone());
        row
    }

    /// Returns false when no row with that id exists
    pub(crate) fn update_renew(&mut self, renew: &BackendRenew) -> bool {
        match self.renews.get_mut(&renew.id) {
            Some(row) => {
                *row = renew.clone();
                true
            }
            None => false,
        }
    }

    pub(crate) fn find_renew(&self, id: u64) -> Option<BackendRenew> {
        self.renews.get(&id).cloned()
    }

    pub(crate) fn find_started_renew(&self, domain_name: &str) -> Option<BackendRenew> {
        self.renews
            .values()
            .find(|r| r.domain_name == domain_name && r.status == RenewStatus::Started)
            .cloned()
    }

    pub(crate) fn list_renews(&self, domain_name: &str) -> Vec<BackendRenew> {
        self.renews
            .values()
            .filter(|r| r.domain_name == domain_name)
            .cloned()
            .collect()
    }

    pub(crate) fn append_event(&mut self, entry: &EventLogEntry) {
        self.events.push(entry.clone());
    }

    pub(crate) fn list_events(&self, domain_name: &str) -> Vec<EventLogEntry> {
        self.events
            .iter()
            .filter(|e| e.domain_name == domain_name)
            .cloned()
            .collect()
    }

    pub(crate) fn append_transition(&mut self, entry: &TransitionLogEntry) {
        self.transitions.push(entry.clone());
    }

    pub(crate) fn list_transitions(&self, domain_name: &str) -> Vec<TransitionLogEntry> {
        self.transitions
            .iter()
            .filter(|t| t.domain_name == domain_name)
            .cloned()
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.domains.is_empty()
            && self.contacts.is_empty()
            && self.nameservers.is_empty()
            && self.accounts.is_empty()
            && self.renews.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        *self = Tables::default();
    }
}

/// Per-domain lease slots.
///
/// One async mutex per domain name, created on first use. Slots are never
/// reclaimed; the set of names is bounded by the portfolio.
#[derive(Debug, Default)]
pub(crate) struct LeaseMap {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LeaseMap {
    /// Acquire the exclusive lease for a name, waiting for any current
    /// holder to release it
    pub(crate) async fn acquire(&self, domain_name: &str) -> DomainLease {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(domain_name.to_string())
                .or_default()
                .clone()
        };
        let guard = slot.lock_owned().await;
        DomainLease::new(domain_name, guard)
    }
}
