// # EPP-over-REST Bridge Gateway
//
// This crate implements `EppGateway` against a registrar's EPP bridge: a
// small HTTP service that fronts the registry's EPP session and exposes
// the commands the back office needs as JSON endpoints.
//
// ## Bridge API
//
// - Check:  GET    `/domains/:name/check`      -> `{"registered": bool}`
// - Info:   GET    `/domains/:name`            -> domain snapshot
// - Renew:  POST   `/domains/:name/renew`      -> `{"next_expiry": "YYYY-MM-DD"}`
// - Poll:   GET    `/messages/next`            -> message, or 204 when the
//                                                 long-poll window closes empty
// - Ack:    DELETE `/messages/:id`
//
// ## Error Mapping
//
// When a failed response body carries the registry's own answer as
// `{"code": <EPP result code>, "message": "..."}`, that code is passed
// through verbatim so the engine's taxonomy applies unchanged. Otherwise
// the HTTP status decides:
//
// - 404 -> result code 2303 (object does not exist)
// - 429 -> result code 2502 (transient, retryable)
// - 5xx -> result code 2500 (transient, retryable)
// - other 4xx -> `CommandFailed` (permanent, never retried)
// - transport failures -> result code 2400 (transient, retryable)
// - unparseable success bodies -> `BadResponse` (never retried)
//
// ## Architectural Constraints
//
// The gateway never retries, never sleeps, and keeps no state between
// calls beyond connection reuse. Backoff and the time budget are owned by
// the engine; a gateway that retried internally would defeat both.
//
// ## Security
//
// - The bridge token NEVER appears in logs
// - The Debug implementation redacts it
// - Construction fails fast on an empty token

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regsync_core::config::GatewayConfig;
use regsync_core::model::DomainStatus;
use regsync_core::traits::{
    ContactInfo, DomainInfo, EppGateway, GatewayFactory, PollMessage, PollMessageKind,
    RenewReceipt,
};
use regsync_core::{EppError, Error, GatewayRegistry, Result};
use serde_json::Value;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for the poll endpoint. Longer than the default so
/// the bridge's long-poll window can close with a 204 before the client
/// gives up on the connection.
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Gateway speaking to an EPP bridge over HTTP
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the gateway will:
/// - Perform all read calls (check, info, poll)
/// - Log the renew and ack calls it would have made
/// - **NOT** send them
///
/// A dry-run renew fails with `CommandFailed` rather than fabricating a
/// receipt, so no expiry date the registry never confirmed can enter the
/// local database. A dry-run ack reports success and leaves the message
/// queued.
pub struct RestGateway {
    /// Bridge base URL without a trailing slash
    base_url: String,

    /// Bearer token for the bridge
    /// ⚠️ Keep this out of logs
    api_token: String,

    /// HTTP client for bridge requests
    client: reqwest::Client,

    /// Dry-run mode: read calls go out, mutating calls are logged and skipped
    dry_run: bool,
}

// Custom Debug implementation that hides the bridge token
impl std::fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGateway")
            .field("base_url", &self.base_url)
            .field("api_token", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl RestGateway {
    /// Create a new bridge gateway
    ///
    /// # Parameters
    ///
    /// - `base_url`: Bridge base URL; a trailing slash is tolerated
    /// - `api_token`: Bearer token for the bridge API
    /// - `request_timeout`: Per-request timeout for everything but poll
    /// - `dry_run`: If true, skip the mutating renew and ack calls
    ///
    /// # Panics
    ///
    /// Panics when the token is empty. The factory validates first; this
    /// is the last line for direct constructions.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        request_timeout: Duration,
        dry_run: bool,
    ) -> Self {
        let api_token = api_token.into();
        if api_token.is_empty() {
            panic!("Bridge API token cannot be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            client,
            dry_run,
        }
    }

    /// Create a gateway in live mode with the default timeout
    pub fn new_live(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::new(base_url, api_token, DEFAULT_REQUEST_TIMEOUT, false)
    }

    /// Create a gateway in dry-run mode with the default timeout
    pub fn new_dry_run(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::new(base_url, api_token, DEFAULT_REQUEST_TIMEOUT, true)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a GET and surface transport failures as transient errors
    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)
    }

    /// Read a failed response's body and classify it
    async fn failure(&self, response: reqwest::Response, context: &str) -> Error {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        classify_failure(status, &body, context)
    }

    /// Parse a successful response body as JSON
    async fn json_body(&self, response: reqwest::Response, context: &str) -> Result<Value> {
        response.json().await.map_err(|e| {
            EppError::bad_response(format!("{}: body is not JSON: {}", context, e)).into()
        })
    }
}

#[async_trait]
impl EppGateway for RestGateway {
    async fn check(&self, domain_name: &str) -> Result<bool> {
        tracing::debug!("Checking {} at the bridge", domain_name);

        let response = self.get(&format!("domains/{}/check", domain_name)).await?;
        if !response.status().is_success() {
            return Err(self.failure(response, domain_name).await);
        }

        let json = self.json_body(response, "check").await?;
        json["registered"]
            .as_bool()
            .ok_or_else(|| EppError::bad_response("check: registered is not a boolean").into())
    }

    async fn info(&self, domain_name: &str) -> Result<DomainInfo> {
        tracing::debug!("Fetching {} from the bridge", domain_name);

        let response = self.get(&format!("domains/{}", domain_name)).await?;
        if !response.status().is_success() {
            return Err(self.failure(response, domain_name).await);
        }

        let json = self.json_body(response, "info").await?;
        parse_domain_info(&json)
    }

    async fn renew(&self, domain_name: &str, period_years: u32) -> Result<RenewReceipt> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST {} with payload: {}",
                self.url(&format!("domains/{}/renew", domain_name)),
                serde_json::json!({ "period_years": period_years })
            );
            // No receipt is fabricated: an expiry the registry never
            // answered must not reach the local database.
            return Err(EppError::command_failed(format!(
                "dry-run mode: renew for {} not sent",
                domain_name
            ))
            .into());
        }

        tracing::info!("Renewing {} for {} year(s)", domain_name, period_years);

        let response = self
            .client
            .post(self.url(&format!("domains/{}/renew", domain_name)))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "period_years": period_years }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(self.failure(response, domain_name).await);
        }

        let json = self.json_body(response, "renew").await?;
        let next_expiry = json["next_expiry"]
            .as_str()
            .ok_or_else(|| EppError::bad_response("renew: next_expiry is not a string"))?;
        Ok(RenewReceipt {
            next_expiry: parse_wire_date(next_expiry, "renew next_expiry")?,
        })
    }

    async fn poll_next(&self) -> Result<PollMessage> {
        loop {
            let response = self
                .client
                .get(self.url("messages/next"))
                .bearer_auth(&self.api_token)
                .timeout(POLL_REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(transport_error)?;

            // Empty long-poll window; ask again
            if response.status() == reqwest::StatusCode::NO_CONTENT {
                continue;
            }
            if !response.status().is_success() {
                return Err(self.failure(response, "poll").await);
            }

            let json = self.json_body(response, "poll").await?;
            return parse_poll_message(&json);
        }
    }

    async fn poll_ack(&self, message_id: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would acknowledge message {}; it stays queued",
                message_id
            );
            return Ok(());
        }

        let response = self
            .client
            .delete(self.url(&format!("messages/{}", message_id)))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        // Already gone means a previous ack landed; the queue agrees with us
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("Message {} was already acknowledged", message_id);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(self.failure(response, message_id).await);
        }

        tracing::debug!("Acknowledged message {}", message_id);
        Ok(())
    }

    fn supports_zone(&self, zone: &str) -> bool {
        // Basic validation; which zones the bridge actually serves is
        // decided by the deployment's zone list
        !zone.is_empty()
            && zone.len() <= 253
            && zone
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    }

    fn gateway_name(&self) -> &'static str {
        "rest"
    }
}

/// Map a transport-level failure onto the taxonomy.
///
/// Connection refused, DNS trouble, and client-side timeouts are all
/// transient: nothing is known about the command's fate, and a retry is
/// the right call.
fn transport_error(e: reqwest::Error) -> Error {
    EppError::response_failed(2400, format!("bridge request failed: {}", e)).into()
}

/// Classify a non-success bridge response.
///
/// A relayed registry answer in the body wins over the HTTP status; the
/// status mapping is the fallback for failures the bridge itself raised.
fn classify_failure(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let (Some(code), Some(message)) = (json["code"].as_u64(), json["message"].as_str()) {
            if (2000..=2599).contains(&code) {
                return EppError::response_failed(code as u16, message).into();
            }
        }
    }

    match status.as_u16() {
        401 | 403 => EppError::command_failed(format!(
            "authentication failed: invalid bridge token or insufficient permissions (status {})",
            status
        ))
        .into(),
        404 => EppError::object_does_not_exist(context).into(),
        429 => EppError::response_failed(
            2502,
            format!("bridge rate limit exceeded for {}: {}", context, body),
        )
        .into(),
        500..=599 => EppError::response_failed(
            2500,
            format!("bridge server error for {}: {} - {}", context, status, body),
        )
        .into(),
        _ => {
            EppError::command_failed(format!("{} failed: {} - {}", context, status, body)).into()
        }
    }
}

/// Parse a `YYYY-MM-DD` wire date
fn parse_wire_date(s: &str, context: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| EppError::bad_response(format!("{}: invalid date '{}': {}", context, s, e)).into())
}

/// Parse a domain snapshot from the bridge's info body
fn parse_domain_info(json: &Value) -> Result<DomainInfo> {
    let registry_id = json["registry_id"]
        .as_str()
        .ok_or_else(|| EppError::bad_response("info: registry_id is not a string"))?
        .to_string();

    let status_str = json["status"]
        .as_str()
        .ok_or_else(|| EppError::bad_response("info: status is not a string"))?;
    let status = DomainStatus::parse(status_str)
        .ok_or_else(|| EppError::bad_response(format!("info: unrecognized status '{}'", status_str)))?;
    // UNKNOWN is a local sentinel; a registry reporting it is broken
    if status == DomainStatus::Unknown {
        return Err(EppError::bad_response("info: registry reported status UNKNOWN").into());
    }

    let expiry_date = match json["expiry_date"].as_str() {
        Some(s) => Some(parse_wire_date(s, "info expiry_date")?),
        None => None,
    };

    let registrant = parse_contact(&json["registrant"])?
        .ok_or_else(|| EppError::bad_response("info: registrant is missing"))?;
    let admin = parse_contact(&json["admin"])?;
    let billing = parse_contact(&json["billing"])?;
    let tech = parse_contact(&json["tech"])?;

    let nameservers = match json["nameservers"].as_array() {
        Some(hosts) => hosts
            .iter()
            .map(|h| {
                h.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| EppError::bad_response("info: nameserver is not a string"))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(DomainInfo {
        registry_id,
        status,
        expiry_date,
        registrant,
        admin,
        billing,
        tech,
        nameservers,
    })
}

/// Parse an optional contact object. `null` and absent both mean the
/// registry assigned no contact for the slot.
fn parse_contact(json: &Value) -> Result<Option<ContactInfo>> {
    if json.is_null() {
        return Ok(None);
    }
    let registry_id = json["registry_id"]
        .as_str()
        .ok_or_else(|| EppError::bad_response("contact: registry_id is not a string"))?
        .to_string();

    let field = |name: &str| json[name].as_str().map(str::to_string);

    Ok(Some(ContactInfo {
        registry_id,
        name: field("name"),
        organization: field("organization"),
        email: field("email"),
        phone: field("phone"),
        address: field("address"),
    }))
}

/// Parse a queued message from the bridge's poll body
fn parse_poll_message(json: &Value) -> Result<PollMessage> {
    let message_id = json["message_id"]
        .as_str()
        .ok_or_else(|| EppError::bad_response("poll: message_id is not a string"))?
        .to_string();
    let kind = json["type"]
        .as_str()
        .map(PollMessageKind::parse)
        .unwrap_or(PollMessageKind::Other);
    let domain_name = json["domain"]
        .as_str()
        .ok_or_else(|| EppError::bad_response("poll: domain is not a string"))?
        .to_string();

    Ok(PollMessage {
        message_id,
        kind,
        domain_name,
        payload: json["payload"].clone(),
    })
}

/// Factory for creating bridge gateways
pub struct RestGatewayFactory;

#[async_trait]
impl GatewayFactory for RestGatewayFactory {
    async fn create(&self, config: &GatewayConfig) -> Result<Arc<dyn EppGateway>> {
        match config {
            GatewayConfig::Rest {
                base_url,
                api_token,
                request_timeout_secs,
                dry_run,
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("Bridge API token is required"));
                }
                if base_url.is_empty() {
                    return Err(Error::config("Bridge base URL is required"));
                }

                if *dry_run {
                    tracing::warn!(
                        "REST gateway running in DRY-RUN mode - renew and ack will not be sent"
                    );
                }

                Ok(Arc::new(RestGateway::new(
                    base_url.clone(),
                    api_token.clone(),
                    Duration::from_secs(*request_timeout_secs),
                    *dry_run,
                )))
            }
            _ => Err(Error::config("Invalid config for the REST gateway")),
        }
    }
}

/// Register the REST gateway with a registry
///
/// Call during initialization to make the gateway buildable from
/// configuration.
///
/// # Example
///
/// ```rust
/// use regsync_core::GatewayRegistry;
///
/// let registry = GatewayRegistry::new();
/// regsync_gateway_rest::register(&registry);
/// ```
pub fn register(registry: &GatewayRegistry) {
    registry.register_gateway("rest", Box::new(RestGatewayFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest_config(api_token: &str) -> GatewayConfig {
        GatewayConfig::Rest {
            base_url: "https://epp-bridge.example.net".to_string(),
            api_token: api_token.to_string(),
            request_timeout_secs: 30,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn factory_creation() {
        let factory = RestGatewayFactory;
        let gateway = factory.create(&rest_config("test_token")).await;
        assert!(gateway.is_ok());
    }

    #[tokio::test]
    async fn factory_missing_token() {
        let factory = RestGatewayFactory;
        let gateway = factory.create(&rest_config("")).await;
        assert!(matches!(gateway, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn factory_rejects_foreign_config() {
        let factory = RestGatewayFactory;
        let config = GatewayConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::Value::Null,
        };
        assert!(matches!(factory.create(&config).await, Err(Error::Config(_))));
    }

    #[test]
    #[should_panic(expected = "API token cannot be empty")]
    fn empty_token_panics() {
        RestGateway::new("https://bridge.test", "", DEFAULT_REQUEST_TIMEOUT, false);
    }

    #[test]
    fn dry_run_mode_flags() {
        let dry = RestGateway::new_dry_run("https://bridge.test", "token");
        let live = RestGateway::new_live("https://bridge.test", "token");

        assert!(dry.dry_run, "Dry-run gateway should have dry_run=true");
        assert!(!live.dry_run, "Live gateway should have dry_run=false");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let gateway = RestGateway::new_live("https://bridge.test/", "token");
        assert_eq!(gateway.url("domains/example.com"), "https://bridge.test/domains/example.com");
    }

    #[test]
    fn api_token_not_exposed_in_debug() {
        let gateway = RestGateway::new_live("https://bridge.test", "secret_token_12345");

        let debug_str = format!("{:?}", gateway);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("RestGateway"));
    }

    #[test]
    fn supports_zone_validation() {
        let gateway = RestGateway::new_live("https://bridge.test", "token");

        assert!(gateway.supports_zone("com"));
        assert!(gateway.supports_zone("co.uk"));
        assert!(!gateway.supports_zone(""));
        assert!(!gateway.supports_zone("bad zone"));
    }

    #[test]
    fn gateway_name_is_rest() {
        let gateway = RestGateway::new_live("https://bridge.test", "token");
        assert_eq!(gateway.gateway_name(), "rest");
    }

    #[tokio::test]
    async fn dry_run_renew_is_refused_not_faked() {
        let gateway = RestGateway::new_dry_run("https://bridge.test", "token");
        let result = gateway.renew("example.com", 1).await;
        assert!(
            matches!(result, Err(Error::Epp(EppError::CommandFailed(_)))),
            "no receipt may be fabricated in dry-run mode"
        );
    }

    #[tokio::test]
    async fn dry_run_ack_reports_success() {
        let gateway = RestGateway::new_dry_run("https://bridge.test", "token");
        assert!(gateway.poll_ack("m-1").await.is_ok());
    }

    #[test]
    fn http_404_is_object_missing() {
        let err = classify_failure(reqwest::StatusCode::NOT_FOUND, "", "gone.example.com");
        match err {
            Error::Epp(e) => assert!(e.is_object_missing()),
            other => panic!("expected an EPP error, got {:?}", other),
        }
    }

    #[test]
    fn http_429_and_5xx_are_transient() {
        for status in [
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            reqwest::StatusCode::BAD_GATEWAY,
        ] {
            let err = classify_failure(status, "busy", "example.com");
            assert!(err.is_retryable(), "status {} should be retryable", status);
        }
    }

    #[test]
    fn http_auth_failures_are_permanent() {
        for status in [reqwest::StatusCode::UNAUTHORIZED, reqwest::StatusCode::FORBIDDEN] {
            let err = classify_failure(status, "", "example.com");
            assert!(!err.is_retryable());
            assert!(matches!(err, Error::Epp(EppError::CommandFailed(_))));
        }
    }

    #[test]
    fn relayed_registry_code_wins_over_http_status() {
        // The bridge relays the registry's 2304 inside a 422 response
        let body = r#"{"code": 2304, "message": "Object status prohibits operation"}"#;
        let err = classify_failure(reqwest::StatusCode::UNPROCESSABLE_ENTITY, body, "example.com");
        match err {
            Error::Epp(EppError::ResponseFailed { code, message }) => {
                assert_eq!(code, 2304);
                assert_eq!(message, "Object status prohibits operation");
            }
            other => panic!("expected a relayed response failure, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_parses_completely() {
        let json = serde_json::json!({
            "registry_id": "D-1001",
            "status": "ACTIVE",
            "expiry_date": "2027-06-01",
            "registrant": {
                "registry_id": "C-2001",
                "name": "Taylor Example",
                "email": "owner@example.com"
            },
            "admin": null,
            "tech": { "registry_id": "C-2002" },
            "nameservers": ["ns1.host.net", "ns2.host.net"]
        });

        let info = parse_domain_info(&json).unwrap();
        assert_eq!(info.registry_id, "D-1001");
        assert_eq!(info.status, DomainStatus::Active);
        assert_eq!(info.expiry_date, Some(NaiveDate::from_ymd_opt(2027, 6, 1).unwrap()));
        assert_eq!(info.registrant.registry_id, "C-2001");
        assert_eq!(info.registrant.email.as_deref(), Some("owner@example.com"));
        assert!(info.admin.is_none());
        assert!(info.billing.is_none());
        assert_eq!(info.tech.as_ref().unwrap().registry_id, "C-2002");
        assert_eq!(info.nameservers, vec!["ns1.host.net", "ns2.host.net"]);
    }

    #[test]
    fn snapshot_without_registrant_is_bad_response() {
        let json = serde_json::json!({
            "registry_id": "D-1001",
            "status": "ACTIVE"
        });
        let err = parse_domain_info(&json).unwrap_err();
        assert!(matches!(err, Error::Epp(EppError::BadResponse(_))));
    }

    #[test]
    fn unknown_status_is_bad_response() {
        for status in ["UNKNOWN", "frozen"] {
            let json = serde_json::json!({
                "registry_id": "D-1001",
                "status": status,
                "registrant": { "registry_id": "C-2001" }
            });
            let err = parse_domain_info(&json).unwrap_err();
            assert!(
                matches!(err, Error::Epp(EppError::BadResponse(_))),
                "status '{}' must not parse",
                status
            );
        }
    }

    #[test]
    fn malformed_expiry_is_bad_response() {
        let json = serde_json::json!({
            "registry_id": "D-1001",
            "status": "ACTIVE",
            "expiry_date": "01/06/2027",
            "registrant": { "registry_id": "C-2001" }
        });
        let err = parse_domain_info(&json).unwrap_err();
        assert!(matches!(err, Error::Epp(EppError::BadResponse(_))));
    }

    #[test]
    fn poll_message_parses_with_unrecognized_type() {
        let json = serde_json::json!({
            "message_id": "m-42",
            "type": "zone_maintenance",
            "domain": "example.com",
            "payload": { "window": "tonight" }
        });
        let message = parse_poll_message(&json).unwrap();
        assert_eq!(message.message_id, "m-42");
        assert_eq!(message.kind, PollMessageKind::Other);
        assert_eq!(message.domain_name, "example.com");
        assert_eq!(message.payload["window"], "tonight");
    }

    #[test]
    fn registered_gateway_is_listed() {
        let registry = GatewayRegistry::new();
        register(&registry);
        assert!(registry.has_gateway("rest"));
    }
}
