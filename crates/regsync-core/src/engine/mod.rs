//! Core synchronization engine
//!
//! The SyncEngine is responsible for:
//! - Bringing one domain's local state into agreement with the registry
//! - Reconciling the entities a domain references (owner, contacts, hosts)
//! - Driving the domain lifecycle state machine from remote reads
//! - Emitting events for external monitoring
//!
//! ## Data flow
//!
//! ```text
//! ┌──────────────┐  poll messages  ┌──────────────┐
//! │ PollListener │────────────────▶│              │
//! └──────────────┘                 │  SyncEngine  │
//!  quick-sync / CLI ──────────────▶│              │
//!                                  └──────┬───────┘
//!                   ┌─────────────────────┼─────────────────────┐
//!                   ▼                     ▼                     ▼
//!            ┌─────────────┐      ┌──────────────┐      ┌─────────────┐
//!            │ EppGateway  │      │RegistryStore │      │   Events    │
//!            │ (info)      │      │ (reconcile)  │      │  (notify)   │
//!            └─────────────┘      └──────────────┘      └─────────────┘
//! ```
//!
//! ## Synchronization Flow
//!
//! 1. Normalize and validate the name, resolve its zone
//! 2. Acquire the per-domain lease
//! 3. `info` against the registry, with bounded retry on transient codes
//! 4. Present: reconcile owner, contacts, and nameservers, then upsert
//!    the domain row with the remote status applied verbatim
//! 5. Absent: finalize deletion when the domain was queued for it
//! 6. Record the attempt in the event log, and any status change in the
//!    transition log

pub mod reconcile;
pub mod renew;
pub mod scheduler;

pub use reconcile::Reconciled;
pub use renew::RenewTracker;
pub use scheduler::QuickSyncReport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RegsyncConfig;
use crate::error::{EppError, Error, Result};
use crate::model::{
    Domain, DomainStatus, EventLogEntry, TransitionLogEntry, matching_zone,
    normalize_domain_name,
};
use crate::traits::{DomainInfo, EppGateway, RegistryStore};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Synchronization of a domain started
    SyncStarted { domain_name: String },

    /// Synchronization finished with the domain present at the registry
    SyncCompleted {
        domain_name: String,
        status: DomainStatus,
    },

    /// The registry confirmed the domain gone and deletion was finalized
    DomainDeleted { domain_name: String, soft: bool },

    /// Synchronization failed
    SyncFailed { domain_name: String, error: String },

    /// The domain's lifecycle status changed
    StatusChanged {
        domain_name: String,
        from: DomainStatus,
        to: DomainStatus,
    },

    /// A backend renewal row was opened
    RenewStarted { domain_name: String, renew_id: u64 },

    /// A backend renewal row was confirmed processed
    RenewProcessed { domain_name: String, renew_id: u64 },

    /// A quick-sync pass finished
    BatchCompleted {
        selected: usize,
        synced: usize,
        failed: usize,
        skipped_over_budget: usize,
    },
}

/// Per-call options for [`SyncEngine::synchronize`]
///
/// Start from [`SyncOptions::interactive`] or [`SyncOptions::unattended`]
/// and adjust with the builder-style setters.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Fill in blank contact profile fields from the registry
    pub refresh_contacts: bool,
    /// Overwrite contact profile fields from the registry unconditionally
    pub rewrite_contacts: bool,
    /// Allow moving the domain to a different owner account
    pub change_owner_allowed: bool,
    /// Allow creating an owner account the registry references but the
    /// back office does not know
    pub create_new_owner_allowed: bool,
    /// Finalize a confirmed deletion by tombstoning the row instead of
    /// removing it
    pub soft_delete: bool,
    /// Propagate failures to the caller instead of absorbing them
    pub raise_errors: bool,
    /// Record every attempt in the event log
    pub log_events: bool,
    /// Record status changes in the transition log
    pub log_transitions: bool,
    /// Wall-clock point after which no further retry is attempted
    pub deadline: Option<Instant>,
}

impl SyncOptions {
    /// Options for an operator-triggered sync: failures propagate
    pub fn interactive() -> Self {
        Self {
            refresh_contacts: true,
            rewrite_contacts: false,
            change_owner_allowed: false,
            create_new_owner_allowed: false,
            soft_delete: true,
            raise_errors: true,
            log_events: true,
            log_transitions: true,
            deadline: None,
        }
    }

    /// Options for background syncs: failures are logged and absorbed
    pub fn unattended() -> Self {
        Self {
            raise_errors: false,
            ..Self::interactive()
        }
    }

    /// Set whether blank contact fields are filled from the registry
    pub fn refresh_contacts(mut self, value: bool) -> Self {
        self.refresh_contacts = value;
        self
    }

    /// Set whether contact fields are overwritten from the registry
    pub fn rewrite_contacts(mut self, value: bool) -> Self {
        self.rewrite_contacts = value;
        self
    }

    /// Authorize moving the domain to a different owner account
    pub fn change_owner_allowed(mut self, value: bool) -> Self {
        self.change_owner_allowed = value;
        self
    }

    /// Authorize creating owner accounts unknown to the back office
    pub fn create_new_owner_allowed(mut self, value: bool) -> Self {
        self.create_new_owner_allowed = value;
        self
    }

    /// Set whether confirmed deletions tombstone the row or remove it
    pub fn soft_delete(mut self, value: bool) -> Self {
        self.soft_delete = value;
        self
    }

    /// Set whether failures propagate to the caller
    pub fn raise_errors(mut self, value: bool) -> Self {
        self.raise_errors = value;
        self
    }

    /// Set whether attempts are recorded in the event log
    pub fn log_events(mut self, value: bool) -> Self {
        self.log_events = value;
        self
    }

    /// Set whether status changes are recorded in the transition log
    pub fn log_transitions(mut self, value: bool) -> Self {
        self.log_transitions = value;
        self
    }

    /// Set the retry deadline
    pub fn deadline(mut self, value: Option<Instant>) -> Self {
        self.deadline = value;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::interactive()
    }
}

/// What a locked synchronization pass concluded
enum Synced {
    /// The registry reported the domain present; the row was upserted
    Present(Domain),
    /// The registry confirmed the domain gone; deletion was finalized
    Deleted { domain: Domain, soft: bool },
}

/// Core synchronization engine
///
/// The engine owns the reconciliation logic between the local database
/// and the remote registry. One instance serves every trigger: operator
/// CLI calls, the poll listener, the quick-sync scheduler, and the renew
/// tracker.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`], which also yields the event
///    receiver
/// 2. Call [`synchronize`](SyncEngine::synchronize) or
///    [`quick_sync`](SyncEngine::quick_sync) from any task
/// 3. Drop to cleanup
///
/// ## Threading
///
/// All methods take `&self`; the engine is shared behind an `Arc` by the
/// daemon's tasks. Per-domain exclusivity comes from the store's lease,
/// not from the engine.
///
/// ## Overload behavior
///
/// - **Bounded event channel**: a slow consumer costs events, not memory
/// - **Bounded retries**: transient registry failures are retried with
///   capped exponential backoff, never forever
/// - **Event dropping**: when the channel is full, events are dropped
///   (logged)
pub struct SyncEngine {
    /// Gateway to the remote registry
    gateway: Arc<dyn EppGateway>,

    /// Local database
    store: Arc<dyn RegistryStore>,

    /// Supported zone suffixes
    zones: Vec<String>,

    /// Retries after the first attempt of a transient-failing call
    max_retries: u32,

    /// Delay before the first retry
    retry_base_delay: Duration,

    /// Backoff multiplier per further retry
    retry_multiplier: f64,

    /// Ceiling on a single backoff delay
    retry_max_delay: Duration,

    /// Where [`SyncEvent`] values go; the daemon's logger holds the
    /// receiving end
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new synchronization engine
    ///
    /// # Parameters
    ///
    /// - `gateway`: Registry gateway implementation
    /// - `store`: Registry store implementation
    /// - `config`: Validated configuration; zones and engine knobs are
    ///   taken from it
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events
    pub fn new(
        gateway: Arc<dyn EppGateway>,
        store: Arc<dyn RegistryStore>,
        config: &RegsyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            gateway,
            store,
            zones: config.zones.clone(),
            max_retries: config.engine.max_retries,
            retry_base_delay: Duration::from_secs(config.engine.retry_base_delay_secs),
            retry_multiplier: config.engine.retry_multiplier,
            retry_max_delay: Duration::from_secs(config.engine.retry_max_delay_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Synchronize one domain against the registry
    ///
    /// Normalizes the name, takes the per-domain lease, reads the
    /// registry with bounded retry, and reconciles local state with
    /// whatever the registry answered. Returns the domain row in the
    /// state synchronization reached.
    ///
    /// Name validation and zone resolution failures are always returned,
    /// as are the integrity conditions (ownership change or owner
    /// creation without authorization, registry id mismatch). Other
    /// failures follow `options.raise_errors`: when false they are
    /// logged, the row is marked `Unknown` if the failure was
    /// non-retryable, and the row is returned as reached. When no local
    /// row exists either, the error is returned since there is nothing
    /// to hand back.
    pub async fn synchronize(&self, domain_name: &str, options: &SyncOptions) -> Result<Domain> {
        let name = normalize_domain_name(domain_name)?;
        let Some(zone) = matching_zone(&name, &self.zones) else {
            return Err(Error::UnsupportedZone { domain: name });
        };
        debug!("Synchronizing {} (zone {})", name, zone);

        let _lease = self.store.acquire_lease(&name).await?;
        self.emit(SyncEvent::SyncStarted {
            domain_name: name.clone(),
        });

        match self.sync_under_lease(&name, options).await {
            Ok(Synced::Present(domain)) => {
                if options.log_events {
                    self.store
                        .append_event(&EventLogEntry::new(&name, "synchronized"))
                        .await?;
                }
                self.emit(SyncEvent::SyncCompleted {
                    domain_name: name.clone(),
                    status: domain.status,
                });
                info!("Synchronized {} ({})", name, domain.status);
                Ok(domain)
            }
            Ok(Synced::Deleted { domain, soft }) => {
                if options.log_events {
                    let outcome = if soft { "deleted (soft)" } else { "deleted" };
                    self.store
                        .append_event(&EventLogEntry::new(&name, outcome))
                        .await?;
                }
                self.emit(SyncEvent::DomainDeleted {
                    domain_name: name.clone(),
                    soft,
                });
                info!("Finalized deletion of {} (soft: {})", name, soft);
                Ok(domain)
            }
            Err(e) => self.absorb_or_raise(&name, e, options).await,
        }
    }

    /// Domains currently in the given status
    pub async fn list_domains_by_status(&self, status: DomainStatus) -> Result<Vec<Domain>> {
        self.store.list_domains_by_status(status).await
    }

    /// Store handle for in-crate collaborators
    pub(crate) fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// One synchronization pass with the lease held
    async fn sync_under_lease(&self, name: &str, options: &SyncOptions) -> Result<Synced> {
        match self.info_with_retry(name, options).await {
            Ok(info) => Ok(Synced::Present(self.apply_info(name, info, options).await?)),
            Err(Error::Epp(ref epp)) if epp.is_object_missing() => {
                self.finalize_absent(name, options).await
            }
            Err(e) => Err(e),
        }
    }

    /// Query the registry, retrying transient failures with backoff
    ///
    /// `max_retries = N` allows N + 1 attempts in total. Non-retryable
    /// failures are returned immediately. A configured deadline stops
    /// further retries once the next backoff would cross it.
    async fn info_with_retry(&self, name: &str, options: &SyncOptions) -> Result<DomainInfo> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.gateway.info(name).await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!("info attempt {} failed for {}: {}", attempt + 1, name, e);
                    last_error = Some(e);

                    // Sleep only when another attempt is coming
                    if attempt < self.max_retries {
                        let delay = self.retry_delay(attempt);
                        if let Some(deadline) = options.deadline {
                            if Instant::now() + delay >= deadline {
                                debug!(
                                    "Retry budget for {} cut short by the deadline",
                                    name
                                );
                                break;
                            }
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Other("info failed".to_string())))
    }

    /// Backoff delay before retry number `attempt + 1`
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = self.retry_multiplier.powi(attempt as i32);
        let secs = (self.retry_base_delay.as_secs_f64() * factor)
            .min(self.retry_max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Reconcile local state with a successful registry read
    async fn apply_info(
        &self,
        name: &str,
        info: DomainInfo,
        options: &SyncOptions,
    ) -> Result<Domain> {
        let existing = self.store.find_domain(name).await?;

        let mut domain = existing
            .clone()
            .unwrap_or_else(|| Domain::new(name, ""));
        // Fail before touching any other row
        domain.assign_registry_id(&info.registry_id)?;

        domain.owner_email =
            reconcile::resolve_owner(&*self.store, name, existing.as_ref(), &info, options)
                .await?;

        reconcile::reconcile_contact(&*self.store, &info.registrant, options).await?;
        for contact in [&info.admin, &info.billing, &info.tech]
            .into_iter()
            .flatten()
        {
            reconcile::reconcile_contact(&*self.store, contact, options).await?;
        }
        reconcile::reconcile_nameservers(&*self.store, &info.nameservers).await?;

        domain.registrant_id = Some(info.registrant.registry_id.clone());
        domain.admin_id = info.admin.as_ref().map(|c| c.registry_id.clone());
        domain.billing_id = info.billing.as_ref().map(|c| c.registry_id.clone());
        domain.tech_id = info.tech.as_ref().map(|c| c.registry_id.clone());
        domain.set_nameservers(&info.nameservers);
        domain.expiry_date = info.expiry_date;

        let transition = domain.apply_remote_status(info.status);
        // A present domain is not deleted, whatever an earlier pass thought
        domain.deleted_at = None;
        domain.last_synced_at = Some(Utc::now());

        self.store.put_domain(&domain).await?;

        if let Some((from, to)) = transition {
            if options.log_transitions {
                self.store
                    .append_transition(&TransitionLogEntry::new(name, from, to))
                    .await?;
            }
            self.emit(SyncEvent::StatusChanged {
                domain_name: name.to_string(),
                from,
                to,
            });
            info!("Status of {} changed: {} -> {}", name, from, to);
        }

        Ok(domain)
    }

    /// Handle a remote-confirmed absence
    ///
    /// Only a domain the back office queued for deletion may be
    /// finalized. Absence of any other domain is unexpected and surfaces
    /// as the object-missing error.
    async fn finalize_absent(&self, name: &str, options: &SyncOptions) -> Result<Synced> {
        let Some(mut domain) = self.store.find_domain(name).await? else {
            return Err(EppError::object_does_not_exist(name).into());
        };

        if domain.status != DomainStatus::ToBeDeleted {
            warn!(
                "Registry reports {} absent but local status is {}",
                name, domain.status
            );
            return Err(EppError::object_does_not_exist(name).into());
        }

        domain.deleted_at = Some(Utc::now());
        domain.last_synced_at = Some(Utc::now());
        if options.soft_delete {
            self.store.put_domain(&domain).await?;
        } else {
            self.store.remove_domain(name).await?;
        }

        Ok(Synced::Deleted {
            domain,
            soft: options.soft_delete,
        })
    }

    /// Apply the failure policy for a synchronization error
    async fn absorb_or_raise(
        &self,
        name: &str,
        error: Error,
        options: &SyncOptions,
    ) -> Result<Domain> {
        if options.log_events {
            self.store
                .append_event(&EventLogEntry::new(name, format!("failed: {}", error)))
                .await?;
        }
        self.emit(SyncEvent::SyncFailed {
            domain_name: name.to_string(),
            error: error.to_string(),
        });
        error!("Synchronization of {} failed: {}", name, error);

        if options.raise_errors || error.is_integrity() {
            return Err(error);
        }

        if error.is_retryable() {
            // Transient trouble says nothing about the domain itself;
            // the status stays whatever it was
            return match self.store.find_domain(name).await? {
                Some(domain) => Ok(domain),
                None => Err(error),
            };
        }

        match self.store.find_domain(name).await? {
            Some(mut domain) => {
                if let Some((from, to)) = domain.mark_unknown() {
                    self.store.put_domain(&domain).await?;
                    if options.log_transitions {
                        self.store
                            .append_transition(&TransitionLogEntry::new(name, from, to))
                            .await?;
                    }
                    self.emit(SyncEvent::StatusChanged {
                        domain_name: name.to_string(),
                        from,
                        to,
                    });
                }
                Ok(domain)
            }
            None => Err(error),
        }
    }

    /// Hand an event to the monitoring channel
    fn emit(&self, event: SyncEvent) {
        use tokio::sync::mpsc::error::TrySendError;
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                // Event processing is slower than event generation; drop
                // rather than grow without bound
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event channel closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_event_equality() {
        let event = SyncEvent::SyncCompleted {
            domain_name: "example.com".to_string(),
            status: DomainStatus::Active,
        };
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_option_presets() {
        let interactive = SyncOptions::interactive();
        assert!(interactive.raise_errors);
        assert!(interactive.soft_delete);
        assert!(!interactive.change_owner_allowed);

        let unattended = SyncOptions::unattended();
        assert!(!unattended.raise_errors);
        assert!(unattended.log_events);

        let tuned = SyncOptions::unattended()
            .rewrite_contacts(true)
            .soft_delete(false);
        assert!(tuned.rewrite_contacts);
        assert!(!tuned.soft_delete);
    }
}
