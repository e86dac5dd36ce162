//! Batch quick-sync scheduling
//!
//! Re-confirms stale domains against the registry under a soft
//! wall-clock budget. The budget only stops admitting new domains; the
//! domain in flight always finishes, and its retry loop shares the same
//! deadline so a slow registry cannot stretch one admission forever.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{SyncEngine, SyncEvent, SyncOptions};
use crate::error::Result;
use crate::model::Domain;

/// Counters from one quick-sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuickSyncReport {
    /// Domains that passed the staleness filter
    pub selected: usize,
    /// Attempts that completed, including failures absorbed under the
    /// unattended policy
    pub synced: usize,
    /// Attempts that returned an error
    pub failed: usize,
    /// Selected domains never admitted because the budget ran out
    pub skipped_over_budget: usize,
}

/// Whether a domain is due for re-confirmation
fn selectable(domain: &Domain, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
    if domain.is_deleted() {
        return false;
    }
    match domain.last_synced_at {
        None => true,
        Some(at) => now.signed_duration_since(at) > threshold,
    }
}

impl SyncEngine {
    /// Synchronize every stale domain in `domains`, stopping admission
    /// when `request_time_limit` of wall clock has elapsed
    ///
    /// A domain is stale when it was never synchronized or its last
    /// synchronization is older than `hours_passed`. Tombstoned rows are
    /// skipped; their absence is already confirmed. Each admitted domain
    /// goes through [`synchronize`](SyncEngine::synchronize) with the
    /// unattended options and a deadline derived from the budget.
    pub async fn quick_sync(
        &self,
        domains: &[Domain],
        hours_passed: u32,
        request_time_limit: Duration,
    ) -> Result<QuickSyncReport> {
        let deadline = Instant::now() + request_time_limit;
        let threshold = chrono::Duration::hours(i64::from(hours_passed));
        let now = Utc::now();

        let stale: Vec<&Domain> = domains
            .iter()
            .filter(|d| selectable(d, now, threshold))
            .collect();

        let mut report = QuickSyncReport {
            selected: stale.len(),
            ..Default::default()
        };
        let options = SyncOptions::unattended().deadline(Some(deadline));

        for (index, domain) in stale.iter().enumerate() {
            if Instant::now() >= deadline {
                report.skipped_over_budget = stale.len() - index;
                warn!(
                    "Quick-sync budget exhausted; {} selected domains not admitted",
                    report.skipped_over_budget
                );
                break;
            }
            debug!("Quick-sync admitting {}", domain.name);
            match self.synchronize(&domain.name, &options).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Quick-sync of {} failed: {}", domain.name, e);
                }
            }
        }

        self.emit(SyncEvent::BatchCompleted {
            selected: report.selected,
            synced: report.synced,
            failed: report.failed,
            skipped_over_budget: report.skipped_over_budget,
        });
        info!(
            "Quick-sync finished: {}/{} synchronized, {} failed, {} over budget",
            report.synced, report.selected, report.failed, report.skipped_over_budget
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_selection() {
        let now = Utc::now();
        let threshold = chrono::Duration::hours(24);

        let fresh_sync = Domain {
            last_synced_at: Some(now - chrono::Duration::hours(1)),
            ..Domain::new("fresh.com", "owner@example.test")
        };
        let old_sync = Domain {
            last_synced_at: Some(now - chrono::Duration::hours(48)),
            ..Domain::new("old.com", "owner@example.test")
        };
        let never_synced = Domain::new("never.com", "owner@example.test");
        let tombstoned = Domain {
            deleted_at: Some(now),
            ..Domain::new("gone.com", "owner@example.test")
        };

        assert!(!selectable(&fresh_sync, now, threshold));
        assert!(selectable(&old_sync, now, threshold));
        assert!(selectable(&never_synced, now, threshold));
        assert!(!selectable(&tombstoned, now, threshold));
    }
}
