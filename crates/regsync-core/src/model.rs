//! Data model for the registry back office
//!
//! Rows mirror what the store persists: domains, contacts, nameservers,
//! owner accounts, backend renewals, and the two audit logs. The domain
//! lifecycle state machine lives here too; the synchronizer drives it but
//! the transition rules belong to [`Domain`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of nameserver slots on a domain row.
///
/// The slot list is fixed-size: unused slots hold blank strings, never
/// nulls, and slot order survives serialization and imports.
pub const NAMESERVER_SLOTS: usize = 4;

/// Lifecycle status of a domain as confirmed by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    /// Registered and resolving
    Active,
    /// Registered locally, not (yet) confirmed active at the registry
    Inactive,
    /// Removed from the zone by the registry
    Deactivated,
    /// On hold at the registrar's request
    ClientHold,
    /// On hold at the registry's request
    ServerHold,
    /// Queued for deletion at the registry
    ToBeDeleted,
    /// Queued for restore after deletion
    ToBeRestored,
    /// Sentinel: last reconciliation failed non-retryably and no safe
    /// status could be inferred. Never a legitimate remote status.
    Unknown,
}

impl DomainStatus {
    /// All statuses, in lifecycle-rank order
    pub const ALL: [DomainStatus; 8] = [
        DomainStatus::Unknown,
        DomainStatus::Inactive,
        DomainStatus::Active,
        DomainStatus::ClientHold,
        DomainStatus::ServerHold,
        DomainStatus::ToBeRestored,
        DomainStatus::ToBeDeleted,
        DomainStatus::Deactivated,
    ];

    /// Position in the lifecycle, used only by the local-write regression
    /// guard: a registered domain never moves to a lower rank without an
    /// explicit override. Remote-confirmed reads ignore the rank entirely.
    pub fn rank(&self) -> u8 {
        match self {
            DomainStatus::Unknown => 0,
            DomainStatus::Inactive => 1,
            DomainStatus::Active => 2,
            DomainStatus::ClientHold => 3,
            DomainStatus::ServerHold => 4,
            DomainStatus::ToBeRestored => 5,
            DomainStatus::ToBeDeleted => 6,
            DomainStatus::Deactivated => 7,
        }
    }

    /// Parse a registry status string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(DomainStatus::Active),
            "INACTIVE" => Some(DomainStatus::Inactive),
            "DEACTIVATED" => Some(DomainStatus::Deactivated),
            "CLIENT_HOLD" => Some(DomainStatus::ClientHold),
            "SERVER_HOLD" => Some(DomainStatus::ServerHold),
            "TO_BE_DELETED" => Some(DomainStatus::ToBeDeleted),
            "TO_BE_RESTORED" => Some(DomainStatus::ToBeRestored),
            "UNKNOWN" => Some(DomainStatus::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DomainStatus::Active => "ACTIVE",
            DomainStatus::Inactive => "INACTIVE",
            DomainStatus::Deactivated => "DEACTIVATED",
            DomainStatus::ClientHold => "CLIENT_HOLD",
            DomainStatus::ServerHold => "SERVER_HOLD",
            DomainStatus::ToBeDeleted => "TO_BE_DELETED",
            DomainStatus::ToBeRestored => "TO_BE_RESTORED",
            DomainStatus::Unknown => "UNKNOWN",
        };
        f.pad(s)
    }
}

/// A domain row in the local database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name, lowercase, validated. Unique key.
    pub name: String,
    /// Registry-assigned identifier. Assigned once on the first confirmed
    /// read and immutable afterwards.
    pub registry_id: Option<String>,
    /// Lifecycle status
    pub status: DomainStatus,
    /// Expiry date as last confirmed by the registry
    pub expiry_date: Option<NaiveDate>,
    /// Registry id of the registrant contact
    pub registrant_id: Option<String>,
    /// Registry id of the admin contact
    pub admin_id: Option<String>,
    /// Registry id of the billing contact
    pub billing_id: Option<String>,
    /// Registry id of the tech contact
    pub tech_id: Option<String>,
    /// Email of the owning account
    pub owner_email: String,
    /// Nameserver hostnames in slot order; empty slots are blank strings
    pub nameservers: [String; NAMESERVER_SLOTS],
    /// Whether the back office renews this domain automatically
    pub auto_renew: bool,
    /// When the last successful synchronization finished
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Soft-delete tombstone; set when the registry confirmed the domain
    /// gone. A tombstoned row keeps its last status.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Domain {
    /// Create a fresh local row for an already-normalized name.
    ///
    /// Starts `Inactive` with no registry id; the first synchronization
    /// against the registry fills in the confirmed state.
    pub fn new(name: impl Into<String>, owner_email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry_id: None,
            status: DomainStatus::Inactive,
            expiry_date: None,
            registrant_id: None,
            admin_id: None,
            billing_id: None,
            tech_id: None,
            owner_email: owner_email.into(),
            nameservers: Default::default(),
            auto_renew: false,
            last_synced_at: None,
            deleted_at: None,
        }
    }

    /// Whether the soft-delete tombstone is set
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the registry has ever confirmed this domain
    pub fn is_registered(&self) -> bool {
        self.registry_id.is_some()
    }

    /// Record the registry-assigned identifier.
    ///
    /// Assign-once: a later confirmed read reporting a different id for
    /// the same name is an integrity error, not an update.
    pub fn assign_registry_id(&mut self, remote_id: &str) -> Result<()> {
        match &self.registry_id {
            None => {
                self.registry_id = Some(remote_id.to_string());
                Ok(())
            }
            Some(local) if local == remote_id => Ok(()),
            Some(local) => Err(Error::RegistryIdMismatch {
                domain: self.name.clone(),
                local: local.clone(),
                remote: remote_id.to_string(),
            }),
        }
    }

    /// Apply a status confirmed by a remote read, verbatim.
    ///
    /// Remote-confirmed reads move status freely in either direction.
    /// Returns `(from, to)` if the status actually changed.
    pub fn apply_remote_status(
        &mut self,
        status: DomainStatus,
    ) -> Option<(DomainStatus, DomainStatus)> {
        if self.status == status {
            return None;
        }
        let from = self.status;
        self.status = status;
        Some((from, status))
    }

    /// Apply a locally-decided status, e.g. from an import row.
    ///
    /// On a registered domain this refuses to move the lifecycle backwards
    /// unless `force` is set; the registry's confirmed state outranks any
    /// local opinion. Unregistered rows move freely.
    pub fn apply_local_status(
        &mut self,
        status: DomainStatus,
        force: bool,
    ) -> Result<Option<(DomainStatus, DomainStatus)>> {
        if self.is_registered() && !force && status.rank() < self.status.rank() {
            return Err(Error::StatusRegression {
                domain: self.name.clone(),
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        Ok(self.apply_remote_status(status))
    }

    /// Mark the domain `Unknown` after a non-retryable reconciliation
    /// failure. Returns the transition if the status changed.
    pub fn mark_unknown(&mut self) -> Option<(DomainStatus, DomainStatus)> {
        self.apply_remote_status(DomainStatus::Unknown)
    }

    /// Write the nameserver slots from a remote host list.
    ///
    /// Slot order follows the input; missing slots become blank. Hosts
    /// beyond the slot count are dropped.
    pub fn set_nameservers<S: AsRef<str>>(&mut self, hosts: &[S]) {
        for (i, slot) in self.nameservers.iter_mut().enumerate() {
            *slot = hosts
                .get(i)
                .map(|h| h.as_ref().trim().to_lowercase())
                .unwrap_or_default();
        }
    }

    /// Nameserver slots that are actually populated
    pub fn active_nameservers(&self) -> impl Iterator<Item = &str> {
        self.nameservers
            .iter()
            .filter(|h| !h.is_empty())
            .map(|h| h.as_str())
    }
}

/// A contact row, keyed by its registry-assigned id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Registry-assigned contact identifier. Unique key.
    pub registry_id: String,
    /// Full name
    pub name: String,
    /// Organization
    pub organization: String,
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: String,
    /// Postal address, single line
    pub address: String,
}

impl Contact {
    /// A contact known only by its registry id, with all profile fields
    /// blank. Used when a domain references an id we have no profile for.
    pub fn placeholder(registry_id: impl Into<String>) -> Self {
        Self {
            registry_id: registry_id.into(),
            ..Default::default()
        }
    }
}

/// A nameserver host, keyed by hostname and shared between domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameServer {
    /// Hostname, lowercase. Unique key.
    pub hostname: String,
    /// Registry-assigned identifier, when the registry models hosts as
    /// objects
    pub registry_id: Option<String>,
}

impl NameServer {
    /// Create a host row for an already-normalized hostname
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            registry_id: None,
        }
    }
}

/// An owner account, keyed by email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Email address, lowercase. Unique key.
    pub email: String,
    /// Display name shown in the back office
    pub display_name: String,
}

impl Account {
    /// Create an account for an already-normalized email
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            display_name: email.clone(),
            email,
        }
    }
}

/// Lifecycle of a backend renewal row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewStatus {
    /// Renewal submitted to the registry, outcome not yet confirmed
    Started,
    /// Renewal confirmed; terminal
    Processed,
}

impl std::fmt::Display for RenewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenewStatus::Started => write!(f, "started"),
            RenewStatus::Processed => write!(f, "processed"),
        }
    }
}

/// One backend renewal attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRenew {
    /// Store-assigned identifier
    pub id: u64,
    /// Domain name being renewed. The Domain row may not exist yet when
    /// the renewal restores a deleted name.
    pub domain_name: String,
    /// Email of the account paying for the renewal
    pub owner_email: String,
    /// Billing order behind the renewal
    pub order_id: u64,
    /// Billing order for the restore fee; present exactly when this
    /// renewal restores a deleted domain
    pub restore_order_id: Option<u64>,
    /// Expiry date on the domain row when the renewal started
    pub previous_expiry: Option<NaiveDate>,
    /// Expiry date reported when the renewal was processed
    pub next_expiry: Option<NaiveDate>,
    /// Row status
    pub status: RenewStatus,
    /// When the renewal was started
    pub created_at: DateTime<Utc>,
    /// When the renewal was confirmed processed
    pub processed_at: Option<DateTime<Utc>>,
}

impl BackendRenew {
    /// Whether the renewal is still awaiting confirmation
    pub fn is_started(&self) -> bool {
        self.status == RenewStatus::Started
    }

    /// Whether this renewal restores a deleted domain
    pub fn is_restore(&self) -> bool {
        self.restore_order_id.is_some()
    }
}

/// One synchronization attempt, recorded when event logging is on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Domain the attempt was for
    pub domain_name: String,
    /// Outcome summary, e.g. "synchronized" or "failed: ..."
    pub outcome: String,
    /// When the attempt finished
    pub at: DateTime<Utc>,
}

impl EventLogEntry {
    /// Record an outcome for a domain, timestamped now
    pub fn new(domain_name: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            outcome: outcome.into(),
            at: Utc::now(),
        }
    }
}

/// One status change, recorded when transition logging is on.
///
/// Distinct from the event log: an attempt that leaves the status alone
/// produces an event but no transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    /// Domain whose status changed
    pub domain_name: String,
    /// Status before the change
    pub from: DomainStatus,
    /// Status after the change
    pub to: DomainStatus,
    /// When the change was applied
    pub at: DateTime<Utc>,
}

impl TransitionLogEntry {
    /// Record a status change, timestamped now
    pub fn new(domain_name: impl Into<String>, from: DomainStatus, to: DomainStatus) -> Self {
        Self {
            domain_name: domain_name.into(),
            from,
            to,
            at: Utc::now(),
        }
    }
}

/// Normalize and validate a domain name.
///
/// Lowercases, trims surrounding whitespace and a single trailing dot,
/// then checks registry naming rules: at least two labels, total length
/// at most 253, labels 1-63 characters of ASCII letters, digits, and
/// hyphens, with no label starting or ending in a hyphen.
pub fn normalize_domain_name(raw: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidDomainName {
        domain: raw.to_string(),
        reason: reason.to_string(),
    };

    let name = raw.trim().trim_end_matches('.').to_lowercase();
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.len() > 253 {
        return Err(invalid("name exceeds 253 characters"));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("name needs at least two labels"));
    }
    for label in &labels {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > 63 {
            return Err(invalid("label exceeds 63 characters"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid("label contains invalid characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label starts or ends with a hyphen"));
        }
    }

    Ok(name)
}

/// Find the supported zone a normalized name belongs to.
///
/// Longest configured suffix wins, so `shop.example.co.uk` matches
/// `co.uk` over `uk`. The name must have at least one label in front of
/// the zone; the zone itself is not a domain.
pub fn matching_zone<'a>(name: &str, zones: &'a [String]) -> Option<&'a str> {
    zones
        .iter()
        .filter(|zone| {
            name.len() > zone.len() + 1 && name.ends_with(&format!(".{}", zone))
        })
        .max_by_key(|zone| zone.len())
        .map(|zone| zone.as_str())
}
