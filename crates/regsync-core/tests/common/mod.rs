//! Shared fixtures for the contract tests
//!
//! A scripted gateway and small helpers so the tests can drive the
//! engine without a real registry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use regsync_core::config::{EngineConfig, GatewayConfig, RegsyncConfig, StoreConfig};
use regsync_core::error::EppError;
use regsync_core::model::{Domain, DomainStatus};
use regsync_core::store::MemoryStore;
use regsync_core::traits::{
    ContactInfo, DomainInfo, EppGateway, PollMessage, PollMessageKind, RegistryStore,
    RenewReceipt,
};
use regsync_core::{SyncEngine, SyncEvent};

/// A scripted EppGateway that tracks calls
///
/// Each domain has a queue of `info` responses, consumed front to back;
/// the last response sticks and repeats. A domain with no script answers
/// with code 2303 like a registry that never heard the name. Poll
/// messages are redelivered until acked, matching real queue semantics.
pub struct MockGateway {
    /// Scripted info responses per domain
    responses: std::sync::Mutex<HashMap<String, VecDeque<Result<DomainInfo, EppError>>>>,
    /// Sticky response for renew calls
    renew_response: std::sync::Mutex<Result<RenewReceipt, EppError>>,
    /// Pending poll messages, front is next to deliver
    poll_queue: std::sync::Mutex<VecDeque<PollMessage>>,
    /// Message ids acknowledged so far
    acked: std::sync::Mutex<Vec<String>>,
    /// Artificial latency per info call
    info_delay: std::sync::Mutex<Duration>,
    /// Call counter for info()
    info_call_count: AtomicUsize,
    /// Call counter for renew()
    renew_call_count: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(HashMap::new()),
            renew_response: std::sync::Mutex::new(Ok(RenewReceipt {
                next_expiry: date(2027, 1, 1),
            })),
            poll_queue: std::sync::Mutex::new(VecDeque::new()),
            acked: std::sync::Mutex::new(Vec::new()),
            info_delay: std::sync::Mutex::new(Duration::ZERO),
            info_call_count: AtomicUsize::new(0),
            renew_call_count: AtomicUsize::new(0),
        }
    }

    /// Queue the next info response for a domain
    pub fn script_info(&self, domain_name: &str, response: Result<DomainInfo, EppError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(domain_name.to_string())
            .or_default()
            .push_back(response);
    }

    /// Set the sticky renew response
    pub fn script_renew(&self, response: Result<RenewReceipt, EppError>) {
        *self.renew_response.lock().unwrap() = response;
    }

    /// Add artificial latency to every info call
    pub fn set_info_delay(&self, delay: Duration) {
        *self.info_delay.lock().unwrap() = delay;
    }

    /// Queue a poll message for delivery
    pub fn queue_poll_message(&self, message: PollMessage) {
        self.poll_queue.lock().unwrap().push_back(message);
    }

    /// Get the number of times info() was called
    pub fn info_call_count(&self) -> usize {
        self.info_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times renew() was called
    pub fn renew_call_count(&self) -> usize {
        self.renew_call_count.load(Ordering::SeqCst)
    }

    /// Message ids acknowledged so far, in order
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EppGateway for MockGateway {
    async fn check(&self, domain_name: &str) -> regsync_core::Result<bool> {
        Ok(self.responses.lock().unwrap().contains_key(domain_name))
    }

    async fn info(&self, domain_name: &str) -> regsync_core::Result<DomainInfo> {
        self.info_call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.info_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let mut scripts = self.responses.lock().unwrap();
            match scripts.get_mut(domain_name) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if queue.len() == 1 => queue.front().unwrap().clone(),
                _ => Err(EppError::object_does_not_exist(domain_name)),
            }
        };

        response.map_err(Into::into)
    }

    async fn renew(
        &self,
        _domain_name: &str,
        _period_years: u32,
    ) -> regsync_core::Result<RenewReceipt> {
        self.renew_call_count.fetch_add(1, Ordering::SeqCst);
        self.renew_response.lock().unwrap().clone().map_err(Into::into)
    }

    async fn poll_next(&self) -> regsync_core::Result<PollMessage> {
        loop {
            let next = self.poll_queue.lock().unwrap().front().cloned();
            if let Some(message) = next {
                return Ok(message);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn poll_ack(&self, message_id: &str) -> regsync_core::Result<()> {
        self.poll_queue
            .lock()
            .unwrap()
            .retain(|m| m.message_id != message_id);
        self.acked.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    fn supports_zone(&self, _zone: &str) -> bool {
        true
    }

    fn gateway_name(&self) -> &'static str {
        "mock"
    }
}

/// Helper to create a minimal RegsyncConfig for testing
///
/// No retries and one-second backoff floors, so tests that want retry
/// behavior opt in explicitly.
pub fn minimal_config() -> RegsyncConfig {
    RegsyncConfig {
        gateway: GatewayConfig::Custom {
            factory: "mock".to_string(),
            config: serde_json::Value::Null,
        },
        store: StoreConfig::Memory,
        zones: vec!["com".to_string(), "net".to_string()],
        engine: EngineConfig {
            max_retries: 0,
            retry_base_delay_secs: 1,
            retry_multiplier: 1.0,
            retry_max_delay_secs: 1,
            event_channel_capacity: 100,
            poll_retry_delay_secs: 1,
            quick_sync_hours: 24,
            quick_sync_budget_secs: 300,
        },
    }
}

/// Build an engine over the given doubles
pub fn engine_with(
    gateway: Arc<MockGateway>,
    store: Arc<MemoryStore>,
    config: &RegsyncConfig,
) -> (Arc<SyncEngine>, tokio::sync::mpsc::Receiver<SyncEvent>) {
    let (engine, event_rx) =
        SyncEngine::new(gateway, store, config).expect("engine construction succeeds");
    (Arc::new(engine), event_rx)
}

/// A registrant contact with a full profile
pub fn registrant(registry_id: &str, email: &str) -> ContactInfo {
    ContactInfo {
        registry_id: registry_id.to_string(),
        name: Some("Taylor Example".to_string()),
        organization: None,
        email: Some(email.to_string()),
        phone: Some("+1.5551234567".to_string()),
        address: Some("1 Main St, Springfield".to_string()),
    }
}

/// An info snapshot with the given status and registrant
pub fn domain_info(registry_id: &str, status: DomainStatus, registrant: ContactInfo) -> DomainInfo {
    DomainInfo {
        registry_id: registry_id.to_string(),
        status,
        expiry_date: Some(date(2027, 6, 1)),
        registrant,
        admin: None,
        billing: None,
        tech: None,
        nameservers: vec!["ns1.host.net".to_string(), "ns2.host.net".to_string()],
    }
}

/// A poll message with a JSON payload
pub fn poll_message(
    message_id: &str,
    kind: PollMessageKind,
    domain_name: &str,
    payload: serde_json::Value,
) -> PollMessage {
    PollMessage {
        message_id: message_id.to_string(),
        kind,
        domain_name: domain_name.to_string(),
        payload,
    }
}

/// Insert a domain row directly into the store
pub async fn seed_domain(
    store: &MemoryStore,
    name: &str,
    owner_email: &str,
    status: DomainStatus,
) -> Domain {
    let mut domain = Domain::new(name, owner_email);
    domain.status = status;
    store.put_domain(&domain).await.expect("seed succeeds");
    domain
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
