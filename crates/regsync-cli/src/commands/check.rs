//! Check command implementation.

use std::path::Path;

use anyhow::Result;
use regsync_core::EppGateway;
use regsync_core::model::{matching_zone, normalize_domain_name};

/// Runs the check command.
pub async fn run(store_path: &Path, zones: &[String], domain: &str) -> Result<()> {
    let name = normalize_domain_name(domain)?;
    if matching_zone(&name, zones).is_none() {
        anyhow::bail!("{} is not under a configured zone", name);
    }

    let gateway = super::build_gateway(store_path, zones).await?;
    if gateway.check(&name).await? {
        println!("{} is registered", name);
    } else {
        println!("{} is available", name);
    }

    Ok(())
}
