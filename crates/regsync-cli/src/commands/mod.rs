//! CLI command implementations.

pub mod check;
pub mod import;
pub mod list;
pub mod quick_sync;
pub mod renew;
pub mod sync;

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regsync_core::config::EngineConfig;
use regsync_core::registry::register_builtin_stores;
use regsync_core::{
    EppGateway, FileStore, GatewayConfig, GatewayRegistry, RegistryStore, RegsyncConfig,
    StoreConfig, SyncEngine,
};

/// Open the domain database named on the command line
pub(crate) async fn open_store(path: &Path) -> Result<Arc<dyn RegistryStore>> {
    let store = FileStore::new(path)
        .await
        .with_context(|| format!("cannot open store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Assemble the library configuration for the online commands.
///
/// The bridge coordinates come from the environment so tokens never
/// appear in shell history.
pub(crate) fn core_config(store_path: &Path, zones: &[String]) -> Result<RegsyncConfig> {
    let base_url = env::var("REGSYNC_GATEWAY_BASE_URL")
        .context("REGSYNC_GATEWAY_BASE_URL is required for this command")?;
    let api_token = env::var("REGSYNC_GATEWAY_API_TOKEN")
        .context("REGSYNC_GATEWAY_API_TOKEN is required for this command")?;
    let dry_run = env::var("REGSYNC_GATEWAY_DRY_RUN")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    Ok(RegsyncConfig {
        gateway: GatewayConfig::Rest {
            base_url,
            api_token,
            request_timeout_secs: 30,
            dry_run,
        },
        store: StoreConfig::File {
            path: store_path.display().to_string(),
        },
        zones: zones.to_vec(),
        engine: EngineConfig::default(),
    })
}

/// Build just the gateway, for commands that never touch the store
pub(crate) async fn build_gateway(
    store_path: &Path,
    zones: &[String],
) -> Result<Arc<dyn EppGateway>> {
    let config = core_config(store_path, zones)?;
    config.validate()?;

    let registry = GatewayRegistry::new();
    regsync_gateway_rest::register(&registry);
    Ok(registry.create_gateway(&config.gateway).await?)
}

/// Build the engine and store for the online commands
pub(crate) async fn build_engine(
    store_path: &Path,
    zones: &[String],
) -> Result<(Arc<SyncEngine>, Arc<dyn RegistryStore>)> {
    let config = core_config(store_path, zones)?;
    config.validate()?;

    let registry = GatewayRegistry::new();
    register_builtin_stores(&registry);
    regsync_gateway_rest::register(&registry);

    let gateway = registry.create_gateway(&config.gateway).await?;
    let store = registry.create_store(&config.store).await?;

    // The CLI reads outcomes from return values; the event channel is
    // for the daemon's logger and stays unconsumed here
    let (engine, _events) = SyncEngine::new(gateway, store.clone(), &config)?;
    Ok((Arc::new(engine), store))
}
