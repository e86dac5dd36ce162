// # regsyncd - Registry Synchronization Daemon
//
// This daemon is a thin integration layer. It reads configuration,
// builds the engine's components through the factory registry, and runs
// three tasks until a shutdown signal arrives:
//
// 1. The poll listener, draining the registry's message queue
// 2. The quick-sync ticker, re-confirming stale domains on a schedule
// 3. The event logger, draining the engine's event channel
//
// All synchronization logic lives in regsync-core; the daemon holds no
// retry, reconciliation, or scheduling decisions of its own.
//
// ## Configuration
//
// regsyncd reads all of its settings from the environment:
//
// ### Gateway
// - `REGSYNC_GATEWAY_TYPE`: Gateway type (rest)
// - `REGSYNC_GATEWAY_BASE_URL`: Base URL of the EPP bridge
// - `REGSYNC_GATEWAY_API_TOKEN`: Bearer token for the bridge
// - `REGSYNC_GATEWAY_TIMEOUT_SECS`: Per-request timeout (default 30)
// - `REGSYNC_GATEWAY_DRY_RUN`: Skip mutating calls when `true`
//
// ### Store
// - `REGSYNC_STORE_TYPE`: Store type (file, memory)
// - `REGSYNC_STORE_PATH`: Path to the database file (for file store)
//
// ### Zones
// - `REGSYNC_ZONES`: Comma-separated zone suffixes, e.g. `com,net,co.uk`
//
// ### Engine
// - `REGSYNC_MAX_RETRIES`: Retries after the first attempt (default 3)
// - `REGSYNC_RETRY_BASE_DELAY_SECS`: First retry delay (default 5)
// - `REGSYNC_RETRY_MULTIPLIER`: Backoff multiplier (default 2.0)
// - `REGSYNC_RETRY_MAX_DELAY_SECS`: Backoff ceiling (default 60)
// - `REGSYNC_EVENT_CHANNEL_CAPACITY`: Event channel size (default 256)
// - `REGSYNC_POLL_RETRY_DELAY_SECS`: Pause after a poll failure (default 30)
// - `REGSYNC_QUICK_SYNC_HOURS`: Staleness threshold (default 24)
// - `REGSYNC_QUICK_SYNC_BUDGET_SECS`: Budget per pass (default 300)
// - `REGSYNC_QUICK_SYNC_INTERVAL_SECS`: Ticker period (default 3600)
//
// ### Logging
// - `REGSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Running
//
// ```bash
// export REGSYNC_GATEWAY_BASE_URL=https://epp-bridge.example.net
// export REGSYNC_GATEWAY_API_TOKEN=your_token
// export REGSYNC_ZONES=com,net
// export REGSYNC_STORE_TYPE=file
// export REGSYNC_STORE_PATH=/var/lib/regsync/registry.json
//
// regsyncd
// ```

use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use regsync_core::config::EngineConfig;
use regsync_core::{
    EppGateway, GatewayConfig, GatewayRegistry, PollListener, RegistryStore, RegsyncConfig,
    StoreConfig, SyncEngine, SyncEvent,
};
use tokio::sync::oneshot;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Process exit codes
///
/// 0 is a clean signal-driven shutdown, 1 a configuration problem
/// caught before any task started, 2 a failure at runtime.
#[derive(Debug, Clone, Copy)]
enum RegsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<RegsyncExitCode> for ExitCode {
    fn from(code: RegsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings read from the environment
struct Config {
    gateway_type: String,
    gateway_base_url: String,
    gateway_api_token: String,
    gateway_timeout_secs: Option<u64>,
    gateway_dry_run: bool,
    store_type: String,
    store_path: Option<String>,
    zones: Vec<String>,
    max_retries: Option<u32>,
    retry_base_delay_secs: Option<u64>,
    retry_multiplier: Option<f64>,
    retry_max_delay_secs: Option<u64>,
    event_channel_capacity: Option<usize>,
    poll_retry_delay_secs: Option<u64>,
    quick_sync_hours: Option<u32>,
    quick_sync_budget_secs: Option<u64>,
    quick_sync_interval_secs: u64,
    log_level: String,
}

/// Read an optional numeric variable, failing on unparseable values
/// instead of silently substituting a default
fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not valid: {} (value: '{}')", name, e, raw)),
    }
}

impl Config {
    /// Collect every `REGSYNC_*` variable
    fn from_env() -> Result<Self> {
        Ok(Self {
            gateway_type: env::var("REGSYNC_GATEWAY_TYPE").unwrap_or_else(|_| "rest".to_string()),
            gateway_base_url: env::var("REGSYNC_GATEWAY_BASE_URL").unwrap_or_default(),
            gateway_api_token: env::var("REGSYNC_GATEWAY_API_TOKEN").unwrap_or_default(),
            gateway_timeout_secs: parse_env("REGSYNC_GATEWAY_TIMEOUT_SECS")?,
            gateway_dry_run: env::var("REGSYNC_GATEWAY_DRY_RUN")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            store_type: env::var("REGSYNC_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("REGSYNC_STORE_PATH").ok(),
            zones: env::var("REGSYNC_ZONES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().trim_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            max_retries: parse_env("REGSYNC_MAX_RETRIES")?,
            retry_base_delay_secs: parse_env("REGSYNC_RETRY_BASE_DELAY_SECS")?,
            retry_multiplier: parse_env("REGSYNC_RETRY_MULTIPLIER")?,
            retry_max_delay_secs: parse_env("REGSYNC_RETRY_MAX_DELAY_SECS")?,
            event_channel_capacity: parse_env("REGSYNC_EVENT_CHANNEL_CAPACITY")?,
            poll_retry_delay_secs: parse_env("REGSYNC_POLL_RETRY_DELAY_SECS")?,
            quick_sync_hours: parse_env("REGSYNC_QUICK_SYNC_HOURS")?,
            quick_sync_budget_secs: parse_env("REGSYNC_QUICK_SYNC_BUDGET_SECS")?,
            quick_sync_interval_secs: parse_env("REGSYNC_QUICK_SYNC_INTERVAL_SECS")?
                .unwrap_or(3600),
            log_level: env::var("REGSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Check the settings before anything is built.
    ///
    /// Numeric ranges and cross-field rules are validated again by
    /// regsync-core's `RegsyncConfig::validate`; the checks here exist
    /// to produce messages that name the environment variable to fix.
    fn validate(&self) -> Result<()> {
        match self.gateway_type.as_str() {
            "rest" => {
                if self.gateway_base_url.is_empty() {
                    anyhow::bail!(
                        "REGSYNC_GATEWAY_BASE_URL is required. \
                        Set it via: export REGSYNC_GATEWAY_BASE_URL=https://epp-bridge.example.net"
                    );
                }
                if !self.gateway_base_url.starts_with("https://")
                    && !self.gateway_base_url.starts_with("http://")
                {
                    anyhow::bail!(
                        "REGSYNC_GATEWAY_BASE_URL must use HTTP or HTTPS scheme. Got: {}",
                        self.gateway_base_url
                    );
                }
                if self.gateway_base_url.starts_with("http://") {
                    warn!(
                        "REGSYNC_GATEWAY_BASE_URL uses HTTP (not HTTPS). \
                        The bridge token travels in cleartext."
                    );
                }

                if self.gateway_api_token.is_empty() {
                    anyhow::bail!(
                        "REGSYNC_GATEWAY_API_TOKEN is required. \
                        Set it via: export REGSYNC_GATEWAY_API_TOKEN=your_token"
                    );
                }

                // Catch placeholder tokens before they reach the bridge
                let token_lower = self.gateway_api_token.to_lowercase();
                if token_lower.contains("your_token")
                    || token_lower.contains("replace_me")
                    || token_lower.contains("changeme")
                    || token_lower == "token"
                {
                    anyhow::bail!(
                        "REGSYNC_GATEWAY_API_TOKEN appears to be a placeholder. \
                        Use the actual token issued for the EPP bridge."
                    );
                }
            }
            other => anyhow::bail!(
                "REGSYNC_GATEWAY_TYPE '{}' is not supported. Supported types: rest",
                other
            ),
        }

        match self.store_type.as_str() {
            "memory" => {}
            "file" => {
                let Some(path) = self.store_path.as_deref().filter(|p| !p.is_empty()) else {
                    anyhow::bail!(
                        "REGSYNC_STORE_PATH is required when REGSYNC_STORE_TYPE=file. \
                        Set it via: export REGSYNC_STORE_PATH=/var/lib/regsync/registry.json"
                    );
                };
                if let Some(parent) = std::path::Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "REGSYNC_STORE_PATH parent directory does not exist: {}. \
                        Create it first: mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
            other => anyhow::bail!(
                "REGSYNC_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        if self.zones.is_empty() {
            anyhow::bail!(
                "REGSYNC_ZONES must contain at least one zone. \
                Set it via: export REGSYNC_ZONES=com,net"
            );
        }
        for zone in &self.zones {
            if !zone
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            {
                anyhow::bail!("REGSYNC_ZONES entry contains invalid characters: '{}'", zone);
            }
        }

        if self.quick_sync_interval_secs < 60 {
            anyhow::bail!(
                "REGSYNC_QUICK_SYNC_INTERVAL_SECS must be at least 60. Got: {}",
                self.quick_sync_interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "REGSYNC_LOG_LEVEL '{}' is not one of trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    /// Assemble the library configuration, leaving unset engine knobs to
    /// their documented defaults
    fn to_core_config(&self) -> RegsyncConfig {
        let defaults = EngineConfig::default();
        RegsyncConfig {
            gateway: GatewayConfig::Rest {
                base_url: self.gateway_base_url.clone(),
                api_token: self.gateway_api_token.clone(),
                request_timeout_secs: self.gateway_timeout_secs.unwrap_or(30),
                dry_run: self.gateway_dry_run,
            },
            store: match self.store_type.as_str() {
                "memory" => StoreConfig::Memory,
                _ => StoreConfig::File {
                    path: self.store_path.clone().unwrap_or_default(),
                },
            },
            zones: self.zones.clone(),
            engine: EngineConfig {
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                retry_base_delay_secs: self
                    .retry_base_delay_secs
                    .unwrap_or(defaults.retry_base_delay_secs),
                retry_multiplier: self.retry_multiplier.unwrap_or(defaults.retry_multiplier),
                retry_max_delay_secs: self
                    .retry_max_delay_secs
                    .unwrap_or(defaults.retry_max_delay_secs),
                event_channel_capacity: self
                    .event_channel_capacity
                    .unwrap_or(defaults.event_channel_capacity),
                poll_retry_delay_secs: self
                    .poll_retry_delay_secs
                    .unwrap_or(defaults.poll_retry_delay_secs),
                quick_sync_hours: self.quick_sync_hours.unwrap_or(defaults.quick_sync_hours),
                quick_sync_budget_secs: self
                    .quick_sync_budget_secs
                    .unwrap_or(defaults.quick_sync_budget_secs),
            },
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("regsyncd: {}", e);
            return RegsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing before validation so warnings have somewhere to go
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("regsyncd: cannot install tracing subscriber: {}", e);
        return RegsyncExitCode::ConfigError.into();
    }

    if let Err(e) = config.validate() {
        eprintln!("regsyncd: invalid configuration: {}", e);
        return RegsyncExitCode::ConfigError.into();
    }

    info!("Starting regsyncd daemon");
    info!("Configuration loaded: {} zone(s)", config.zones.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Cannot build the tokio runtime: {}", e);
            return RegsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Fatal: {}", e);
            RegsyncExitCode::RuntimeError
        } else {
            RegsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire the components together and run until a signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let core_config = config.to_core_config();
    core_config.validate()?;

    // Build components through the factory registry
    let registry = GatewayRegistry::new();
    regsync_core::registry::register_builtin_stores(&registry);

    #[cfg(feature = "rest")]
    {
        info!("Registering REST bridge gateway");
        regsync_gateway_rest::register(&registry);
    }

    let gateway = registry.create_gateway(&core_config.gateway).await?;
    let store = registry.create_store(&core_config.store).await?;
    info!(
        "Components ready: gateway '{}', store '{}'",
        gateway.gateway_name(),
        config.store_type
    );

    let (engine, event_rx) = SyncEngine::new(gateway.clone(), store.clone(), &core_config)?;
    let engine = Arc::new(engine);

    // Event logger: drains the engine's channel for the operator's log
    let mut events = ReceiverStream::new(event_rx);
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            log_event(&event);
        }
    });

    // Poll listener: drains the registry's message queue
    let (poll_shutdown_tx, poll_shutdown_rx) = oneshot::channel();
    let listener = PollListener::new(
        gateway.clone(),
        engine.clone(),
        Duration::from_secs(core_config.engine.poll_retry_delay_secs),
    );
    let poll_task = tokio::spawn(async move {
        listener.run_with_shutdown(poll_shutdown_rx).await;
    });
    info!("Poll listener started");

    // Quick-sync ticker: re-confirms stale domains on a schedule
    let (tick_shutdown_tx, mut tick_shutdown_rx) = oneshot::channel::<()>();
    let tick_engine = engine.clone();
    let tick_store = store.clone();
    let stale_hours = core_config.engine.quick_sync_hours;
    let budget = Duration::from_secs(core_config.engine.quick_sync_budget_secs);
    let interval = Duration::from_secs(config.quick_sync_interval_secs);
    let tick_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup does not
        // race a full pass against the poll backlog
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let domains = match tick_store.list_domains().await {
                        Ok(domains) => domains,
                        Err(e) => {
                            error!("Quick-sync pass could not list domains: {}", e);
                            continue;
                        }
                    };
                    match tick_engine.quick_sync(&domains, stale_hours, budget).await {
                        Ok(report) => info!(
                            "Quick-sync pass: {}/{} synchronized, {} failed, {} over budget",
                            report.synced, report.selected, report.failed,
                            report.skipped_over_budget
                        ),
                        Err(e) => error!("Quick-sync pass failed: {}", e),
                    }
                }
                _ = &mut tick_shutdown_rx => break,
            }
        }
    });
    info!(
        "Quick-sync ticker started: every {}s, staleness {}h, budget {}s",
        config.quick_sync_interval_secs, stale_hours, budget.as_secs()
    );

    // Wait for shutdown signal
    let signal_name = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal_name);

    // Stop the workers, then the event logger once the engine is gone
    let _ = poll_shutdown_tx.send(());
    let _ = tick_shutdown_tx.send(());
    let _ = poll_task.await;
    let _ = tick_task.await;
    drop(engine);
    let _ = event_task.await;

    store.flush().await?;
    info!("Store flushed; shutdown complete");

    Ok(())
}

/// Write one engine event to the log
fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::SyncStarted { domain_name } => {
            info!("sync started: {}", domain_name);
        }
        SyncEvent::SyncCompleted {
            domain_name,
            status,
        } => {
            info!("sync completed: {} ({})", domain_name, status);
        }
        SyncEvent::DomainDeleted { domain_name, soft } => {
            info!(
                "domain deleted: {} ({})",
                domain_name,
                if *soft { "soft" } else { "hard" }
            );
        }
        SyncEvent::SyncFailed { domain_name, error } => {
            warn!("sync failed: {}: {}", domain_name, error);
        }
        SyncEvent::StatusChanged {
            domain_name,
            from,
            to,
        } => {
            info!("status changed: {} {} -> {}", domain_name, from, to);
        }
        SyncEvent::RenewStarted {
            domain_name,
            renew_id,
        } => {
            info!("renew started: {} (renew {})", domain_name, renew_id);
        }
        SyncEvent::RenewProcessed {
            domain_name,
            renew_id,
        } => {
            info!("renew processed: {} (renew {})", domain_name, renew_id);
        }
        SyncEvent::BatchCompleted {
            selected,
            synced,
            failed,
            skipped_over_budget,
        } => {
            info!(
                "quick-sync batch: {}/{} synchronized, {} failed, {} over budget",
                synced, selected, failed, skipped_over_budget
            );
        }
    }
}

/// Wait for SIGTERM or SIGINT and resolve to the signal's name
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("cannot install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("cannot install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Non-Unix fallback: CTRL-C only
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("cannot wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
