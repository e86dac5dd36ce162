//! Bulk CSV importer
//!
//! Seeds the registry store from an operator-supplied CSV export, one
//! domain per row. The importer validates each row, creates the owner
//! account and placeholder contacts it references, and inserts or
//! updates the domain row. Import never touches the status of a domain
//! that already exists; new domains start out `Inactive` and are
//! confirmed against the registry by the next quick-sync.
//!
//! Row format (comma separated, no header):
//!
//! ```text
//! domain name, zone, owner email, registrant id, admin id, billing id,
//! tech id, nameserver 1..4
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Trailing blank
//! nameserver columns may be omitted; interior blanks keep their slot.
//! A blank contact or owner column leaves the stored value untouched.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::reconcile;
use crate::error::{Error, Result};
use crate::model::{
    Account, BackendRenew, Contact, Domain, DomainStatus, EventLogEntry, NAMESERVER_SLOTS,
    NameServer, RenewStatus, TransitionLogEntry, matching_zone, normalize_domain_name,
};
use crate::traits::{DomainLease, NewRenew, RegistryStore};

/// Columns before the nameserver block: name, zone, owner email, and
/// the four contact ids.
const FIXED_FIELDS: usize = 7;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Rows that changed the store, or would have under dry-run
    pub processed: usize,
    /// Rejected rows with their line numbers
    pub errors: Vec<RowError>,
}

impl ImportReport {
    /// True when every row was accepted
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A rejected CSV row
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// 1-based line number in the input file
    pub line: usize,
    /// Why the row was rejected
    pub message: String,
}

/// One-shot CSV importer over a registry store.
pub struct CsvImporter {
    store: Arc<dyn RegistryStore>,
    zones: Vec<String>,
}

impl CsvImporter {
    /// Create an importer writing to `store`, accepting only domains
    /// under the given zones.
    pub fn new(store: Arc<dyn RegistryStore>, zones: Vec<String>) -> Self {
        Self { store, zones }
    }

    /// Load a CSV file into the store.
    ///
    /// Rows are processed independently. A rejected row is recorded in
    /// the report and the batch continues. With `dry_run` set, every
    /// row runs through the exact live code path against a store
    /// wrapper that swallows mutations, so the returned counts are
    /// what a live run would do without committing anything.
    pub async fn load_from_csv(&self, path: &Path, dry_run: bool) -> Result<ImportReport> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::import(format!("cannot read {}: {}", path.display(), e)))?;

        let store: Arc<dyn RegistryStore> = if dry_run {
            Arc::new(DryRunStore::new(self.store.clone()))
        } else {
            self.store.clone()
        };

        let mut report = ImportReport::default();
        for (index, raw_line) in data.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match self.process_row(store.as_ref(), line).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {
                    debug!("Import line {} is already up to date", line_number);
                }
                Err(e) => {
                    warn!("Import line {} rejected: {}", line_number, e);
                    report.errors.push(RowError {
                        line: line_number,
                        message: e.to_string(),
                    });
                }
            }
        }

        if !dry_run {
            store.flush().await?;
        }

        info!(
            "Imported {}: {} row(s) processed, {} rejected{}",
            path.display(),
            report.processed,
            report.errors.len(),
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }

    /// Apply one data row. Returns whether the store changed.
    async fn process_row(&self, store: &dyn RegistryStore, line: &str) -> Result<bool> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < FIXED_FIELDS || fields.len() > FIXED_FIELDS + NAMESERVER_SLOTS {
            return Err(Error::import(format!(
                "expected {} to {} fields, found {}",
                FIXED_FIELDS,
                FIXED_FIELDS + NAMESERVER_SLOTS,
                fields.len()
            )));
        }

        let name = normalize_domain_name(fields[0])?;
        let zone = fields[1].trim_matches('.').to_lowercase();
        if zone.is_empty() || !self.zones.iter().any(|z| z == &zone) {
            return Err(Error::UnsupportedZone { domain: name });
        }
        if matching_zone(&name, std::slice::from_ref(&zone)).is_none() {
            return Err(Error::import(format!("{name} is not under zone {zone}")));
        }

        let owner_email = fields[2].to_lowercase();
        let _lease = store.acquire_lease(&name).await?;

        let mut changed = false;

        // The operator supplied the data, so creating the owner account
        // needs no further authorization.
        if !owner_email.is_empty() {
            let (_, outcome) = reconcile::reconcile_account(store, &owner_email).await?;
            changed |= outcome.created();
        }

        // Contacts referenced only by id get placeholder rows. The next
        // synchronization fills their profiles from the registry.
        for registry_id in fields[3..FIXED_FIELDS].iter().filter(|f| !f.is_empty()) {
            if store.find_contact(registry_id).await?.is_none() {
                store.put_contact(&Contact::placeholder(*registry_id)).await?;
                changed = true;
            }
        }

        // A row shorter than the full slot count leaves nameservers
        // alone; once any nameserver column is present the whole block
        // is taken as the desired slot layout.
        let nameservers_given = fields.len() > FIXED_FIELDS;
        let nameserver_fields: Vec<String> =
            fields[FIXED_FIELDS..].iter().map(|f| f.to_string()).collect();
        if nameservers_given {
            reconcile::reconcile_nameservers(store, &nameserver_fields).await?;
        }

        let existing = store.find_domain(&name).await?;
        let mut domain = match existing.clone() {
            Some(domain) => domain,
            None => Domain::new(&name, &owner_email),
        };

        if !owner_email.is_empty() {
            domain.owner_email = owner_email.clone();
        }

        let id_columns = [fields[3], fields[4], fields[5], fields[6]];
        let id_slots = [
            &mut domain.registrant_id,
            &mut domain.admin_id,
            &mut domain.billing_id,
            &mut domain.tech_id,
        ];
        for (slot, value) in id_slots.into_iter().zip(id_columns) {
            if !value.is_empty() {
                *slot = Some(value.to_string());
            }
        }

        if nameservers_given {
            domain.set_nameservers(&nameserver_fields);
        }

        match existing {
            Some(before) if before == domain => Ok(changed),
            _ => {
                store.put_domain(&domain).await?;
                Ok(true)
            }
        }
    }
}

/// Store wrapper that swallows every mutation.
///
/// Reads pass through to the wrapped store, so validation and change
/// detection behave exactly as a live run would while nothing commits.
struct DryRunStore {
    inner: Arc<dyn RegistryStore>,
}

impl DryRunStore {
    fn new(inner: Arc<dyn RegistryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RegistryStore for DryRunStore {
    async fn find_domain(&self, name: &str) -> Result<Option<Domain>> {
        self.inner.find_domain(name).await
    }

    async fn put_domain(&self, _domain: &Domain) -> Result<()> {
        Ok(())
    }

    async fn remove_domain(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        self.inner.list_domains().await
    }

    async fn list_domains_by_status(&self, status: DomainStatus) -> Result<Vec<Domain>> {
        self.inner.list_domains_by_status(status).await
    }

    async fn find_contact(&self, registry_id: &str) -> Result<Option<Contact>> {
        self.inner.find_contact(registry_id).await
    }

    async fn put_contact(&self, _contact: &Contact) -> Result<()> {
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.inner.list_contacts().await
    }

    async fn find_nameserver(&self, hostname: &str) -> Result<Option<NameServer>> {
        self.inner.find_nameserver(hostname).await
    }

    async fn put_nameserver(&self, _nameserver: &NameServer) -> Result<()> {
        Ok(())
    }

    async fn list_nameservers(&self) -> Result<Vec<NameServer>> {
        self.inner.list_nameservers().await
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>> {
        self.inner.find_account(email).await
    }

    async fn put_account(&self, _account: &Account) -> Result<()> {
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn insert_renew(&self, renew: NewRenew) -> Result<BackendRenew> {
        // Shape the row the live store would return, without keeping it
        Ok(BackendRenew {
            id: 0,
            domain_name: renew.domain_name,
            owner_email: renew.owner_email,
            order_id: renew.order_id,
            restore_order_id: renew.restore_order_id,
            previous_expiry: renew.previous_expiry,
            next_expiry: None,
            status: RenewStatus::Started,
            created_at: Utc::now(),
            processed_at: None,
        })
    }

    async fn update_renew(&self, _renew: &BackendRenew) -> Result<()> {
        Ok(())
    }

    async fn find_renew(&self, id: u64) -> Result<Option<BackendRenew>> {
        self.inner.find_renew(id).await
    }

    async fn find_started_renew(&self, domain_name: &str) -> Result<Option<BackendRenew>> {
        self.inner.find_started_renew(domain_name).await
    }

    async fn list_renews(&self, domain_name: &str) -> Result<Vec<BackendRenew>> {
        self.inner.list_renews(domain_name).await
    }

    async fn append_event(&self, _entry: &EventLogEntry) -> Result<()> {
        Ok(())
    }

    async fn list_events(&self, domain_name: &str) -> Result<Vec<EventLogEntry>> {
        self.inner.list_events(domain_name).await
    }

    async fn append_transition(&self, _entry: &TransitionLogEntry) -> Result<()> {
        Ok(())
    }

    async fn list_transitions(&self, domain_name: &str) -> Result<Vec<TransitionLogEntry>> {
        self.inner.list_transitions(domain_name).await
    }

    async fn acquire_lease(&self, domain_name: &str) -> Result<DomainLease> {
        self.inner.acquire_lease(domain_name).await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
