//! Configuration types for the synchronization engine
//!
//! Deserialized from JSON (daemon, file-based setups) or built in code
//! (CLI, tests). `validate()` catches bad values before any component is
//! constructed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegsyncConfig {
    /// Which gateway to talk to the registry through
    pub gateway: GatewayConfig,
    /// Which store to keep local state in
    pub store: StoreConfig,
    /// Supported zone suffixes, lowercase, without leading dots
    pub zones: Vec<String>,
    /// Engine tuning knobs
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Gateway selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayConfig {
    /// EPP-over-REST bridge gateway
    Rest {
        /// Base URL of the bridge, e.g. `https://epp-bridge.example.net`
        base_url: String,
        /// Bearer token for the bridge API
        api_token: String,
        /// Per-request timeout in seconds
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
        /// When set, mutating calls are logged but not sent
        #[serde(default)]
        dry_run: bool,
    },
    /// A gateway registered under a custom factory name
    Custom {
        /// Factory name to look up in the registry
        factory: String,
        /// Opaque configuration passed to the factory
        #[serde(default)]
        config: serde_json::Value,
    },
}

/// Store selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store, state lost on restart
    Memory,
    /// JSON file store with atomic writes and a backup copy
    File {
        /// Path of the state file
        path: String,
    },
    /// A store registered under a custom factory name
    Custom {
        /// Factory name to look up in the registry
        factory: String,
        /// Opaque configuration passed to the factory
        #[serde(default)]
        config: serde_json::Value,
    },
}

/// Engine tuning knobs, all with conservative defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retries after the first attempt of a transient-failing remote call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in seconds
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
    /// Backoff multiplier applied per further retry
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    /// Ceiling on a single backoff delay, in seconds
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
    /// Capacity of the engine's event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Delay before retrying a failed poll_next, in seconds
    #[serde(default = "default_poll_retry_delay_secs")]
    pub poll_retry_delay_secs: u64,
    /// Staleness threshold for quick-sync, in hours
    #[serde(default = "default_quick_sync_hours")]
    pub quick_sync_hours: u32,
    /// Wall-clock budget for one quick-sync pass, in seconds
    #[serde(default = "default_quick_sync_budget_secs")]
    pub quick_sync_budget_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    5
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_max_delay_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_poll_retry_delay_secs() -> u64 {
    30
}

fn default_quick_sync_hours() -> u32 {
    24
}

fn default_quick_sync_budget_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            poll_retry_delay_secs: default_poll_retry_delay_secs(),
            quick_sync_hours: default_quick_sync_hours(),
            quick_sync_budget_secs: default_quick_sync_budget_secs(),
        }
    }
}

impl RegsyncConfig {
    /// Validate the configuration, returning a description of the first
    /// problem found
    pub fn validate(&self) -> Result<()> {
        match &self.gateway {
            GatewayConfig::Rest {
                base_url,
                api_token,
                request_timeout_secs,
                ..
            } => {
                if base_url.is_empty() {
                    return Err(Error::config("gateway base_url cannot be empty"));
                }
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(Error::config(
                        "gateway base_url must start with http:// or https://",
                    ));
                }
                if api_token.is_empty() {
                    return Err(Error::config("gateway api_token cannot be empty"));
                }
                if *request_timeout_secs == 0 {
                    return Err(Error::config(
                        "gateway request_timeout_secs must be at least 1",
                    ));
                }
            }
            GatewayConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("gateway factory name cannot be empty"));
                }
            }
        }

        match &self.store {
            StoreConfig::Memory => {}
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(Error::config("store path cannot be empty"));
                }
            }
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("store factory name cannot be empty"));
                }
            }
        }

        if self.zones.is_empty() {
            return Err(Error::config("at least one supported zone is required"));
        }
        for zone in &self.zones {
            if zone.is_empty() {
                return Err(Error::config("zone cannot be empty"));
            }
            if zone.starts_with('.') || zone.ends_with('.') {
                return Err(Error::config(format!(
                    "zone '{}' must not start or end with a dot",
                    zone
                )));
            }
            if zone.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(Error::config(format!("zone '{}' must be lowercase", zone)));
            }
        }

        self.engine.validate()
    }
}

impl EngineConfig {
    /// Validate the engine knobs
    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay_secs == 0 {
            return Err(Error::config("retry_base_delay_secs must be at least 1"));
        }
        if self.retry_multiplier < 1.0 {
            return Err(Error::config("retry_multiplier must be at least 1.0"));
        }
        if self.retry_max_delay_secs < self.retry_base_delay_secs {
            return Err(Error::config(
                "retry_max_delay_secs must be at least retry_base_delay_secs",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be at least 1"));
        }
        if self.poll_retry_delay_secs == 0 {
            return Err(Error::config("poll_retry_delay_secs must be at least 1"));
        }
        if self.quick_sync_budget_secs == 0 {
            return Err(Error::config("quick_sync_budget_secs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> RegsyncConfig {
        RegsyncConfig {
            gateway: GatewayConfig::Rest {
                base_url: "https://epp-bridge.example.net".to_string(),
                api_token: "token-123".to_string(),
                request_timeout_secs: default_request_timeout_secs(),
                dry_run: false,
            },
            store: StoreConfig::Memory,
            zones: vec!["com".to_string(), "co.uk".to_string()],
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn sample_config_validates() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.max_retries, 3);
        assert_eq!(engine.retry_base_delay_secs, 5);
        assert_eq!(engine.retry_max_delay_secs, 60);
        assert_eq!(engine.event_channel_capacity, 100);
        assert_eq!(engine.quick_sync_hours, 24);
    }

    #[test]
    fn gateway_config_deserializes_from_tagged_json() {
        let json = r#"{
            "type": "rest",
            "base_url": "https://epp-bridge.example.net",
            "api_token": "token-123"
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        match config {
            GatewayConfig::Rest {
                request_timeout_secs,
                dry_run,
                ..
            } => {
                assert_eq!(request_timeout_secs, 30);
                assert!(!dry_run);
            }
            other => panic!("unexpected gateway config: {:?}", other),
        }
    }

    #[test]
    fn store_config_deserializes_from_tagged_json() {
        let json = r#"{"type": "file", "path": "/var/lib/regsync/state.json"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, StoreConfig::File { .. }));

        let json = r#"{"type": "custom", "factory": "postgres"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, StoreConfig::Custom { .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = sample_config();
        config.zones.clear();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.zones = vec!["Com".to_string()];
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.engine.retry_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.gateway = GatewayConfig::Rest {
            base_url: "https://epp-bridge.example.net".to_string(),
            api_token: String::new(),
            request_timeout_secs: 30,
            dry_run: false,
        };
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.store = StoreConfig::File {
            path: String::new(),
        };
        assert!(config.validate().is_err());
    }
}
