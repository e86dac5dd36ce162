//! Import command implementation.

use std::path::Path;

use anyhow::Result;
use regsync_core::CsvImporter;

/// Runs the import command.
pub async fn run(store_path: &Path, zones: &[String], file: &Path, dry_run: bool) -> Result<()> {
    let store = super::open_store(store_path).await?;

    let importer = CsvImporter::new(store, zones.to_vec());
    let report = importer.load_from_csv(file, dry_run).await?;

    println!(
        "{} row(s) processed{}",
        report.processed,
        if dry_run { " (dry run)" } else { "" }
    );

    if !report.is_clean() {
        for error in &report.errors {
            eprintln!("line {}: {}", error.line, error.message);
        }
        anyhow::bail!("{} row(s) rejected", report.errors.len());
    }

    Ok(())
}
