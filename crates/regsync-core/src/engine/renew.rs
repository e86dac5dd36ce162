//! Backend renewal tracking
//!
//! A renewal is tracked as one row per attempt: opened as `started` when
//! the renewal is submitted, moved to `processed` once the registry
//! confirms it. The tracker enforces at most one `started` row per
//! domain and never advances the domain's expiry from its own
//! bookkeeping; after a confirmation it re-reads the registry so
//! `Domain.expiry_date` only ever carries the registry's answer.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::{SyncEngine, SyncEvent, SyncOptions};
use crate::error::{Error, Result};
use crate::model::{BackendRenew, RenewStatus, normalize_domain_name};
use crate::traits::store::NewRenew;

/// Tracks backend renewals and drives their confirmation
pub struct RenewTracker {
    engine: Arc<SyncEngine>,
}

impl RenewTracker {
    /// Create a tracker over the shared engine
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    /// Open a renewal row for a domain.
    ///
    /// Runs under the domain lease. If a `started` row already exists
    /// for the name, it is returned instead of opening a second one.
    /// `previous_expiry` is captured from the current domain row; a
    /// restore may have no row yet, which leaves it unset.
    pub async fn start_renew(
        &self,
        domain_name: &str,
        owner_email: &str,
        order_id: u64,
        restore_order_id: Option<u64>,
    ) -> Result<BackendRenew> {
        let (renew, _) = self
            .start_renew_inner(domain_name, owner_email, order_id, restore_order_id)
            .await?;
        Ok(renew)
    }

    /// Confirm a renewal processed.
    ///
    /// Idempotent: completing an already-processed row returns it
    /// unchanged. Writes the registry-reported `next_expiry` on the row,
    /// then synchronizes the domain so its expiry date comes from a
    /// fresh registry read rather than from this confirmation.
    pub async fn complete_renew(
        &self,
        renew_id: u64,
        next_expiry: NaiveDate,
    ) -> Result<BackendRenew> {
        let store = &self.engine.store;
        let Some(mut renew) = store.find_renew(renew_id).await? else {
            return Err(Error::RenewNotFound(renew_id));
        };
        if renew.status == RenewStatus::Processed {
            debug!("Renewal {} already processed", renew_id);
            return Ok(renew);
        }

        renew.status = RenewStatus::Processed;
        renew.next_expiry = Some(next_expiry);
        renew.processed_at = Some(Utc::now());
        store.update_renew(&renew).await?;

        self.engine.emit(SyncEvent::RenewProcessed {
            domain_name: renew.domain_name.clone(),
            renew_id,
        });
        info!(
            "Renewal {} for {} processed, next expiry {}",
            renew_id, renew.domain_name, next_expiry
        );

        if let Err(e) = self
            .engine
            .synchronize(&renew.domain_name, &SyncOptions::unattended())
            .await
        {
            warn!(
                "Confirmation sync for {} failed: {}",
                renew.domain_name, e
            );
        }

        Ok(renew)
    }

    /// Submit a renewal to the registry and track it end to end.
    ///
    /// Opens the row, sends the renew command, and completes the row
    /// with the expiry the registry answered. If a renewal is already in
    /// flight for the name, the existing row is returned and no second
    /// command is sent. If the command fails, the row stays `started`
    /// for the poll confirmation or a later resubmission to complete.
    pub async fn submit_renew(
        &self,
        domain_name: &str,
        owner_email: &str,
        order_id: u64,
        restore_order_id: Option<u64>,
        period_years: u32,
    ) -> Result<BackendRenew> {
        let (renew, created) = self
            .start_renew_inner(domain_name, owner_email, order_id, restore_order_id)
            .await?;
        if !created {
            debug!(
                "Renewal already in flight for {} (renew {})",
                renew.domain_name, renew.id
            );
            return Ok(renew);
        }

        match self
            .engine
            .gateway
            .renew(&renew.domain_name, period_years)
            .await
        {
            Ok(receipt) => self.complete_renew(renew.id, receipt.next_expiry).await,
            Err(e) => {
                warn!("Renew command for {} failed: {}", renew.domain_name, e);
                Err(e)
            }
        }
    }

    async fn start_renew_inner(
        &self,
        domain_name: &str,
        owner_email: &str,
        order_id: u64,
        restore_order_id: Option<u64>,
    ) -> Result<(BackendRenew, bool)> {
        let name = normalize_domain_name(domain_name)?;
        let store = &self.engine.store;
        let _lease = store.acquire_lease(&name).await?;

        if let Some(existing) = store.find_started_renew(&name).await? {
            debug!(
                "Renewal already started for {} (renew {})",
                name, existing.id
            );
            return Ok((existing, false));
        }

        let previous_expiry = store.find_domain(&name).await?.and_then(|d| d.expiry_date);
        let renew = store
            .insert_renew(NewRenew {
                domain_name: name.clone(),
                owner_email: owner_email.trim().to_lowercase(),
                order_id,
                restore_order_id,
                previous_expiry,
            })
            .await?;

        self.engine.emit(SyncEvent::RenewStarted {
            domain_name: name.clone(),
            renew_id: renew.id,
        });
        info!("Started renewal {} for {} (order {})", renew.id, name, order_id);
        Ok((renew, true))
    }
}
