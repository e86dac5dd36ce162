//! Quick-sync command implementation.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use regsync_core::RegistryStore;

/// Runs the quick-sync command.
pub async fn run(store_path: &Path, zones: &[String], hours: u32, budget_secs: u64) -> Result<()> {
    let (engine, store) = super::build_engine(store_path, zones).await?;

    let domains = store.list_domains().await?;
    let report = engine
        .quick_sync(&domains, hours, Duration::from_secs(budget_secs))
        .await?;

    println!("selected:     {}", report.selected);
    println!("synchronized: {}", report.synced);
    println!("failed:       {}", report.failed);
    println!("over budget:  {}", report.skipped_over_budget);

    Ok(())
}
