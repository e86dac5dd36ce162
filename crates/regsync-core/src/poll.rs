//! Registry poll queue listener
//!
//! Drains the registry's poll message queue and routes every message
//! into the synchronization engine. Renewal confirmations additionally
//! close the matching backend renew row.
//!
//! ## Acknowledgement
//!
//! A message is acked only after it has been processed successfully.
//! Failures leave the message on the queue and the registry redelivers
//! it, so delivery is at-least-once and every handler below has to be
//! idempotent. A message that keeps failing blocks the queue until an
//! operator resolves the underlying condition.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::engine::{RenewTracker, SyncEngine, SyncOptions};
use crate::error::Error;
use crate::traits::{EppGateway, PollMessage, PollMessageKind};

/// Listener that forwards registry poll messages into the engine.
///
/// The listener processes messages sequentially. Ordering within the
/// queue is preserved and a slow message delays everything behind it,
/// which keeps the local state changes in registry order.
pub struct PollListener {
    gateway: Arc<dyn EppGateway>,
    engine: Arc<SyncEngine>,
    tracker: RenewTracker,
    retry_delay: Duration,
}

impl PollListener {
    /// Create a listener over a gateway and engine pair.
    ///
    /// `retry_delay` is the pause after a failed `poll_next` call or a
    /// failed message, so a wedged queue does not spin hot.
    pub fn new(
        gateway: Arc<dyn EppGateway>,
        engine: Arc<SyncEngine>,
        retry_delay: Duration,
    ) -> Self {
        let tracker = RenewTracker::new(engine.clone());
        Self {
            gateway,
            engine,
            tracker,
            retry_delay,
        }
    }

    /// Run the listener until the surrounding task is cancelled.
    pub async fn run(&self) {
        self.run_internal(None).await;
    }

    /// Run the listener until `shutdown_rx` fires.
    ///
    /// The daemon uses this to stop the listener cleanly before
    /// flushing the store; tests use it to bound the loop.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) {
        self.run_internal(Some(shutdown_rx)).await;
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) {
        info!("Poll listener started");

        if let Some(mut shutdown_rx) = shutdown_rx {
            loop {
                tokio::select! {
                    result = self.gateway.poll_next() => {
                        self.handle_poll_result(result).await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("Poll listener received shutdown signal");
                        break;
                    }
                }
            }
        } else {
            loop {
                let result = self.gateway.poll_next().await;
                self.handle_poll_result(result).await;
            }
        }
    }

    async fn handle_poll_result(&self, result: Result<PollMessage, Error>) {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Polling the registry failed: {}. Retrying in {:?}",
                    e, self.retry_delay
                );
                tokio::time::sleep(self.retry_delay).await;
                return;
            }
        };

        match self.process_message(&message).await {
            Ok(()) => {
                // Ack strictly after the message took effect locally
                if let Err(e) = self.gateway.poll_ack(&message.message_id).await {
                    warn!(
                        "Failed to ack poll message {}: {}. Expecting a redelivery",
                        message.message_id, e
                    );
                }
            }
            Err(e) => {
                error!(
                    "Failed to process poll message {} for {}: {}",
                    message.message_id, message.domain_name, e
                );
                // Not acked. The registry will redeliver; pause so a
                // stuck message does not burn the loop.
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }

    async fn process_message(&self, message: &PollMessage) -> Result<(), Error> {
        debug!(
            "Poll message {} ({:?}) for {}",
            message.message_id, message.kind, message.domain_name
        );

        match message.kind {
            PollMessageKind::RenewProcessed => self.process_renew_confirmation(message).await,
            PollMessageKind::Transfer
            | PollMessageKind::StatusChanged
            | PollMessageKind::Other => {
                // Whatever the registry announced, a fresh read settles it
                self.engine
                    .synchronize(&message.domain_name, &SyncOptions::unattended())
                    .await?;
                Ok(())
            }
        }
    }

    /// Close the started renew row the confirmation belongs to.
    ///
    /// The expiry date is taken from the message payload when present,
    /// otherwise from a fresh registry read. A confirmation with no
    /// matching started row is treated as a redelivery and degrades to
    /// a plain synchronization.
    async fn process_renew_confirmation(&self, message: &PollMessage) -> Result<(), Error> {
        let payload_expiry = message
            .payload
            .get("next_expiry")
            .and_then(|value| value.as_str())
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());

        let started = self
            .engine
            .store()
            .find_started_renew(&message.domain_name)
            .await?;

        match (started, payload_expiry) {
            (Some(renew), Some(next_expiry)) => {
                self.tracker.complete_renew(renew.id, next_expiry).await?;
                Ok(())
            }
            (Some(renew), None) => {
                // No usable date in the payload. Read the registry and
                // complete from its answer.
                let domain = self
                    .engine
                    .synchronize(&message.domain_name, &SyncOptions::unattended())
                    .await?;
                match domain.expiry_date {
                    Some(next_expiry) => {
                        self.tracker.complete_renew(renew.id, next_expiry).await?;
                    }
                    None => {
                        warn!(
                            "Renewal of {} confirmed but the registry reports no expiry date",
                            message.domain_name
                        );
                    }
                }
                Ok(())
            }
            (None, _) => {
                debug!(
                    "Renewal confirmation for {} matches no started renew, synchronizing only",
                    message.domain_name
                );
                self.engine
                    .synchronize(&message.domain_name, &SyncOptions::unattended())
                    .await?;
                Ok(())
            }
        }
    }
}
