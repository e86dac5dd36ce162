//! Renew command implementation.

use std::path::Path;

use anyhow::Result;
use regsync_core::RenewTracker;

/// Runs the renew command.
pub async fn run(
    store_path: &Path,
    zones: &[String],
    domain: &str,
    owner: &str,
    order: u64,
    years: u32,
    restore_order: Option<u64>,
) -> Result<()> {
    let (engine, _store) = super::build_engine(store_path, zones).await?;

    let tracker = RenewTracker::new(engine);
    let renew = tracker
        .submit_renew(domain, owner, order, restore_order, years)
        .await?;

    println!("renew {} for {}: {}", renew.id, renew.domain_name, renew.status);
    if let Some(date) = renew.previous_expiry {
        println!("  previous expiry: {}", date);
    }
    if let Some(date) = renew.next_expiry {
        println!("  next expiry:     {}", date);
    }

    Ok(())
}
