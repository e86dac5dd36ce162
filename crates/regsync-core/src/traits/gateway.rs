// # EPP Gateway Trait
//
// Defines the narrow interface to the remote registry. The back office
// never speaks EPP wire format itself; a gateway translates the handful
// of operations the engine needs (check, info, renew, poll) to whatever
// transport the deployment uses.
//
// ## Implementors
//
// - REST bridge: `regsync-gateway-rest` crate
// - Future: native EPP/TLS session, registrar-specific APIs
//
// A caller's view:
//
// ```rust,ignore
// use regsync_core::EppGateway;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let gateway = /* EppGateway implementation */;
//
//     let info = gateway.info("example.com").await?;
//     println!("{} expires {:?}", info.registry_id, info.expiry_date);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::DomainStatus;

/// Contact profile as reported by the registry.
///
/// Fields the registry did not disclose are `None`; the reconciler treats
/// them as "no information", never as "blank".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    /// Registry-assigned contact identifier
    pub registry_id: String,
    /// Full name
    pub name: Option<String>,
    /// Organization
    pub organization: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Postal address, single line
    pub address: Option<String>,
}

impl ContactInfo {
    /// A contact reference with no profile fields, registry id only
    pub fn id_only(registry_id: impl Into<String>) -> Self {
        Self {
            registry_id: registry_id.into(),
            name: None,
            organization: None,
            email: None,
            phone: None,
            address: None,
        }
    }
}

/// Authoritative snapshot of a domain returned by `info`
#[derive(Debug, Clone, PartialEq)]
pub struct DomainInfo {
    /// Registry-assigned domain identifier
    pub registry_id: String,
    /// Current status at the registry
    pub status: DomainStatus,
    /// Expiry date, if the registry disclosed it
    pub expiry_date: Option<NaiveDate>,
    /// The registrant contact; EPP always reports one
    pub registrant: ContactInfo,
    /// Admin contact, if assigned
    pub admin: Option<ContactInfo>,
    /// Billing contact, if assigned
    pub billing: Option<ContactInfo>,
    /// Tech contact, if assigned
    pub tech: Option<ContactInfo>,
    /// Delegated nameserver hostnames in registry order
    pub nameservers: Vec<String>,
}

/// Outcome of a successful renew command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewReceipt {
    /// Expiry date after the renewal
    pub next_expiry: NaiveDate,
}

/// Classification of a queued registry message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMessageKind {
    /// The registry finished processing a renewal
    RenewProcessed,
    /// The domain was transferred in or out
    Transfer,
    /// The registry changed the domain's status
    StatusChanged,
    /// Anything the listener has no special handling for
    Other,
}

impl PollMessageKind {
    /// Map a wire message type to a kind; unrecognized types become
    /// [`PollMessageKind::Other`]
    pub fn parse(message_type: &str) -> Self {
        match message_type.trim().to_ascii_lowercase().as_str() {
            "renew_processed" | "renewal_processed" => PollMessageKind::RenewProcessed,
            "transfer" | "transfer_in" | "transfer_out" => PollMessageKind::Transfer,
            "status_changed" | "status_update" => PollMessageKind::StatusChanged,
            _ => PollMessageKind::Other,
        }
    }
}

/// One message from the registry's poll queue
#[derive(Debug, Clone, PartialEq)]
pub struct PollMessage {
    /// Queue identifier used for acknowledgement
    pub message_id: String,
    /// What the message announces
    pub kind: PollMessageKind,
    /// Domain the message concerns
    pub domain_name: String,
    /// Message body as the gateway received it
    pub payload: serde_json::Value,
}

/// Trait for registry gateway implementations
///
/// This trait defines the complete surface the engine uses to talk to the
/// remote registry. Implementations translate each operation to their
/// transport and map failures onto [`EppError`](crate::error::EppError).
///
/// # Thread Safety
///
/// Implementations are shared behind `Arc` and called from several
/// tasks at once.
///
/// # Retry Policy
///
/// Gateways never retry. A failed call is reported once, classified
/// through the error taxonomy, and the synchronizer decides whether and
/// when to call again. A gateway that sleeps and retries internally would
/// defeat the engine's backoff and the scheduler's time budget.
///
/// # State
///
/// Gateways are stateless between calls apart from connection reuse. The
/// local database, the per-domain lease, and all reconciliation decisions
/// are owned by the engine.
#[async_trait]
pub trait EppGateway: Send + Sync {
    /// Check whether a domain exists at the registry
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The domain is registered
    /// - `Ok(false)`: The name is available
    /// - `Err(Error)`: The check could not be answered
    async fn check(&self, domain_name: &str) -> Result<bool, crate::Error>;

    /// Fetch the authoritative snapshot of a domain
    ///
    /// Absence is reported as a `ResponseFailed` with code 2303, not as a
    /// success, so the synchronizer can distinguish "confirmed gone" from
    /// transport trouble.
    async fn info(&self, domain_name: &str) -> Result<DomainInfo, crate::Error>;

    /// Extend a domain's registration
    ///
    /// # Parameters
    ///
    /// - `domain_name`: The domain to renew
    /// - `period_years`: Registration years to add
    async fn renew(&self, domain_name: &str, period_years: u32)
    -> Result<RenewReceipt, crate::Error>;

    /// Wait for the next message in the registry's poll queue
    ///
    /// Blocks until a message arrives. Messages stay queued until
    /// acknowledged; fetching one again before its ack is a redelivery,
    /// not an error.
    async fn poll_next(&self) -> Result<PollMessage, crate::Error>;

    /// Acknowledge a poll message, removing it from the queue
    ///
    /// Only called after the message was processed locally. An
    /// unacknowledged message is redelivered.
    async fn poll_ack(&self, message_id: &str) -> Result<(), crate::Error>;

    /// Whether this gateway serves the given zone suffix
    fn supports_zone(&self, zone: &str) -> bool;

    /// Gateway name for logging and debugging
    fn gateway_name(&self) -> &'static str;
}

/// Helper trait for constructing gateways from configuration
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    /// Create a gateway instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: The gateway section of the configuration
    ///
    /// # Returns
    ///
    /// A shared gateway trait object
    async fn create(
        &self,
        config: &crate::config::GatewayConfig,
    ) -> Result<std::sync::Arc<dyn EppGateway>, crate::Error>;
}
