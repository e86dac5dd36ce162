//! List command implementation.

use std::path::Path;

use anyhow::Result;
use regsync_core::RegistryStore;
use regsync_core::model::DomainStatus;

/// Runs the list command.
pub async fn run(store_path: &Path, status: Option<&str>, format: &str) -> Result<()> {
    let store = super::open_store(store_path).await?;

    let domains = match status {
        Some(raw) => {
            let status = DomainStatus::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("Unknown status '{}'", raw))?;
            store.list_domains_by_status(status).await?
        }
        None => store.list_domains().await?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&domains)?),
        "text" => {
            for domain in &domains {
                let expires = domain
                    .expiry_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let hosts: Vec<&str> = domain.active_nameservers().collect();
                let marker = if domain.deleted_at.is_some() {
                    " [deleted]"
                } else {
                    ""
                };
                println!(
                    "{:<40} {:<14} {:<30} expires {} ns [{}]{}",
                    domain.name,
                    domain.status,
                    domain.owner_email,
                    expires,
                    hosts.join(", "),
                    marker
                );
            }
            println!("{} domain(s)", domains.len());
        }
        other => anyhow::bail!("Unknown format '{}'. Valid formats: text, json", other),
    }

    Ok(())
}
