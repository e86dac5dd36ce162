// # File Store
//
// File-backed implementation of RegistryStore with crash recovery.
//
// The daemon and the operator CLI share one JSON database file. Every
// mutation is written through to disk before the call returns, so a
// crash loses at most the write in progress; that write lands in a temp
// file renamed over the database, and each successful write refreshes a
// `.backup` copy for recovery when a later load finds corrupted JSON.
//
// ## On-disk layout
//
// ```json
// {
//   "version": "1.0",
//   "tables": {
//     "domains": {
//       "example.com": { "name": "example.com", "status": "ACTIVE", ... }
//     },
//     "contacts": {},
//     "renews": {},
//     "events": []
//   }
// }
// ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::{LeaseMap, Tables};
use crate::Error;
use crate::config::StoreConfig;
use crate::model::{
    Account, BackendRenew, Contact, Domain, DomainStatus, EventLogEntry, NameServer,
    TransitionLogEntry,
};
use crate::traits::store::{DomainLease, NewRenew, RegistryStore, StoreFactory};

/// On-disk format version, written into every document and checked on
/// load so a later layout change can migrate old files
const DB_FORMAT_VERSION: &str = "1.0";

/// File-backed registry store with crash recovery
///
/// Reads are served from memory; every mutation is written through to
/// disk immediately. A load that finds unparseable JSON falls back to
/// the `.backup` copy of the last good write instead of refusing to
/// start.
///
/// # Example
///
/// ```rust,no_run
/// use regsync_core::store::FileStore;
/// use regsync_core::RegistryStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/regsync/registry.json").await?;
///
///     let domains = store.list_domains().await?;
///     println!("{} domains tracked", domains.len());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    db: Arc<RwLock<DbState>>,
    leases: Arc<LeaseMap>,
}

/// In-memory image of the database plus its write-through flag
#[derive(Debug)]
struct DbState {
    tables: Tables,
    dirty: bool,
}

/// The JSON document as it sits on disk
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DbDocument {
    version: String,
    tables: Tables,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// Missing parent directories are created. A corrupted database
    /// falls back to the backup; when the backup is unusable too, the
    /// store starts empty rather than refusing to open.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tables = Self::load_tables_with_recovery(&path).await?;

        Ok(Self {
            path,
            db: Arc::new(RwLock::new(DbState {
                tables,
                dirty: false,
            })),
            leases: Arc::new(LeaseMap::default()),
        })
    }

    /// Load the tables, falling back to the backup on corruption
    async fn load_tables_with_recovery(path: &Path) -> Result<Tables, Error> {
        match Self::load_tables(path).await {
            Ok(tables) => {
                tracing::debug!(
                    "Loaded database: {} domains",
                    tables.list_domains().len()
                );
                Ok(tables)
            }
            Err(e) => {
                // Only parse failures trigger recovery; IO errors propagate
                let error_str = e.to_string().to_lowercase();
                let looks_corrupted = error_str.contains("json")
                    || error_str.contains("parse")
                    || error_str.contains("format")
                    || error_str.contains("expected value")
                    || error_str.contains("serde");
                if !looks_corrupted {
                    return Err(e);
                }

                tracing::warn!("Database looks corrupted: {}. Trying the backup.", e);

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup exists. Starting empty.");
                    return Ok(Tables::default());
                }

                match Self::load_tables(&backup_path).await {
                    Ok(tables) => {
                        tracing::info!(
                            "Recovered {} domains from the backup",
                            tables.list_domains().len()
                        );
                        if let Err(restore_err) =
                            Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Could not put the recovered copy back in place: {}",
                                restore_err
                            );
                        }
                        Ok(tables)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "The backup is corrupted too: {}. Starting empty.",
                            backup_err
                        );
                        Ok(Tables::default())
                    }
                }
            }
        }
    }

    /// Load the tables from one file
    async fn load_tables(path: &Path) -> Result<Tables, Error> {
        if !path.exists() {
            tracing::debug!("No database at {}, starting empty", path.display());
            return Ok(Tables::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("cannot read database {}: {}", path.display(), e))
        })?;

        let document: DbDocument = serde_json::from_str(&content).map_err(|e| {
            Error::store(format!("cannot parse database {}: {}", path.display(), e))
        })?;

        if document.version != DB_FORMAT_VERSION {
            tracing::warn!(
                "Database version is {} but this build writes {}; loading anyway",
                document.version,
                DB_FORMAT_VERSION
            );
        }

        Ok(document.tables)
    }

    /// Write the tables to disk atomically
    async fn persist(&self) -> Result<(), Error> {
        let json = {
            let guard = self.db.read().await;
            let document = DbDocument {
                version: DB_FORMAT_VERSION.to_string(),
                tables: guard.tables.clone(),
            };
            serde_json::to_string_pretty(&document)
                .map_err(|e| Error::store(format!("cannot serialize database: {}", e)))?
        };

        // Stage the new contents in a temp file
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!("cannot create {}: {}", temp_path.display(), e))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!("cannot write {}: {}", temp_path.display(), e))
            })?;

            file.flush().await.map_err(|e| {
                Error::store(format!("cannot flush {}: {}", temp_path.display(), e))
            })?;
        }

        // Refresh the backup from the current good copy
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Backup refresh failed: {}", e);
            }
        }

        // Rename over the database; readers see the old or the new
        // document, never a torn one
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "cannot rename {} over {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        {
            let mut guard = self.db.write().await;
            guard.dirty = false;
        }

        tracing::trace!("Database written: {}", self.path.display());
        Ok(())
    }

    /// Put the recovered backup back in place of the corrupted file
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "cannot copy backup {} over {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Backup copied over the corrupted database");
        Ok(())
    }

    /// Path of the temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Path of the backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Run a mutation and write through to disk
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let value = {
            let mut guard = self.db.write().await;
            let value = f(&mut guard.tables)?;
            guard.dirty = true;
            value
        };
        self.persist().await?;
        Ok(value)
    }
}

#[async_trait]
impl RegistryStore for FileStore {
    async fn find_domain(&self, name: &str) -> Result<Option<Domain>, Error> {
        Ok(self.db.read().await.tables.find_domain(name))
    }

    async fn put_domain(&self, domain: &Domain) -> Result<(), Error> {
        self.mutate(|t| {
            t.put_domain(domain);
            Ok(())
        })
        .await
    }

    async fn remove_domain(&self, name: &str) -> Result<(), Error> {
        self.mutate(|t| {
            t.remove_domain(name);
            Ok(())
        })
        .await
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, Error> {
        Ok(self.db.read().await.tables.list_domains())
    }

    async fn list_domains_by_status(
        &self,
        status: DomainStatus,
    ) -> Result<Vec<Domain>, Error> {
        Ok(self
            .db
            .read()
            .await
            .tables
            .list_domains_by_status(status))
    }

    async fn find_contact(&self, registry_id: &str) -> Result<Option<Contact>, Error> {
        Ok(self.db.read().await.tables.find_contact(registry_id))
    }

    async fn put_contact(&self, contact: &Contact) -> Result<(), Error> {
        self.mutate(|t| {
            t.put_contact(contact);
            Ok(())
        })
        .await
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, Error> {
        Ok(self.db.read().await.tables.list_contacts())
    }

    async fn find_nameserver(&self, hostname: &str) -> Result<Option<NameServer>, Error> {
        Ok(self.db.read().await.tables.find_nameserver(hostname))
    }

    async fn put_nameserver(&self, nameserver: &NameServer) -> Result<(), Error> {
        self.mutate(|t| {
            t.put_nameserver(nameserver);
            Ok(())
        })
        .await
    }

    async fn list_nameservers(&self) -> Result<Vec<NameServer>, Error> {
        Ok(self.db.read().await.tables.list_nameservers())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self.db.read().await.tables.find_account(email))
    }

    async fn put_account(&self, account: &Account) -> Result<(), Error> {
        self.mutate(|t| {
            t.put_account(account);
            Ok(())
        })
        .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, Error> {
        Ok(self.db.read().await.tables.list_accounts())
    }

    async fn insert_renew(&self, renew: NewRenew) -> Result<BackendRenew, Error> {
        self.mutate(|t| Ok(t.insert_renew(renew))).await
    }

    async fn update_renew(&self, renew: &BackendRenew) -> Result<(), Error> {
        self.mutate(|t| {
            if t.update_renew(renew) {
                Ok(())
            } else {
                Err(Error::RenewNotFound(renew.id))
            }
        })
        .await
    }

    async fn find_renew(&self, id: u64) -> Result<Option<BackendRenew>, Error> {
        Ok(self.db.read().await.tables.find_renew(id))
    }

    async fn find_started_renew(
        &self,
        domain_name: &str,
    ) -> Result<Option<BackendRenew>, Error> {
        Ok(self
            .db
            .read()
            .await
            .tables
            .find_started_renew(domain_name))
    }

    async fn list_renews(&self, domain_name: &str) -> Result<Vec<BackendRenew>, Error> {
        Ok(self.db.read().await.tables.list_renews(domain_name))
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), Error> {
        self.mutate(|t| {
            t.append_event(entry);
            Ok(())
        })
        .await
    }

    async fn list_events(&self, domain_name: &str) -> Result<Vec<EventLogEntry>, Error> {
        Ok(self.db.read().await.tables.list_events(domain_name))
    }

    async fn append_transition(&self, entry: &TransitionLogEntry) -> Result<(), Error> {
        self.mutate(|t| {
            t.append_transition(entry);
            Ok(())
        })
        .await
    }

    async fn list_transitions(
        &self,
        domain_name: &str,
    ) -> Result<Vec<TransitionLogEntry>, Error> {
        Ok(self.db.read().await.tables.list_transitions(domain_name))
    }

    async fn acquire_lease(&self, domain_name: &str) -> Result<DomainLease, Error> {
        Ok(self.leases.acquire(domain_name).await)
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.db.read().await.dirty;
        if dirty { self.persist().await } else { Ok(()) }
    }
}

/// Factory for building file stores from configuration
pub struct FileStoreFactory;

#[async_trait]
impl StoreFactory for FileStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn RegistryStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Arc::new(FileStore::new(path).await?)),
            other => Err(Error::config(format!(
                "file store factory cannot build config: {:?}",
                other
            ))),
        }
    }
}
