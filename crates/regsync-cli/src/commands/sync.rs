//! Sync command implementation.

use std::path::Path;

use anyhow::Result;
use regsync_core::SyncOptions;

/// Runs the sync command.
pub async fn run(
    store_path: &Path,
    zones: &[String],
    domain: &str,
    rewrite_contacts: bool,
    allow_owner_change: bool,
    allow_new_owner: bool,
    hard_delete: bool,
) -> Result<()> {
    let (engine, _store) = super::build_engine(store_path, zones).await?;

    let options = SyncOptions::interactive()
        .rewrite_contacts(rewrite_contacts)
        .change_owner_allowed(allow_owner_change)
        .create_new_owner_allowed(allow_new_owner)
        .soft_delete(!hard_delete);

    let row = engine.synchronize(domain, &options).await?;

    println!("{}", row.name);
    println!("  status:      {}", row.status);
    println!("  owner:       {}", row.owner_email);
    println!("  registry id: {}", row.registry_id.as_deref().unwrap_or("-"));
    println!(
        "  expires:     {}",
        row.expiry_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(at) = row.deleted_at {
        println!("  deleted at:  {}", at);
    }

    Ok(())
}
