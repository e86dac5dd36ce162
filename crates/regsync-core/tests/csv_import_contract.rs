//! Architectural Contract Test: CSV Import Round-Trip
//!
//! This test drives the importer over a fixed two-row export and checks
//! the exact rows it produces, dry-run emptiness, and re-run stability.
//!
//! Constraints verified:
//! - Dry-run reports the full work without committing anything
//! - A live run creates exactly the domains and accounts the file names
//! - Nameserver slots keep their order and blank padding
//! - Re-importing the same file changes nothing
//!
//! If this test fails, onboarding a registrar export is no longer safe
//! to preview or to repeat.

mod common;

use std::sync::Arc;

use common::*;
use regsync_core::model::DomainStatus;
use regsync_core::store::MemoryStore;
use regsync_core::traits::RegistryStore;
use regsync_core::CsvImporter;

const EXPORT: &str = "\
# back-office export, two customer domains
fanpage.example.com,com,owner-one@agency.example,C-R1,C-A1,C-B1,C-T1,facebook.com,google.com
videos.example.net,net,owner-two@agency.example,C-R2,C-A2,C-B2,C-T2,facebook.com,google.com
";

fn export_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("export.csv");
    std::fs::write(&path, EXPORT).unwrap();
    path
}

fn importer(store: &Arc<MemoryStore>) -> CsvImporter {
    CsvImporter::new(store.clone(), vec!["com".to_string(), "net".to_string()])
}

#[tokio::test]
async fn dry_run_reports_the_work_and_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = export_file(&dir);
    let store = Arc::new(MemoryStore::new());

    let report = importer(&store)
        .load_from_csv(&path, true)
        .await
        .expect("dry run completes");

    assert_eq!(report.processed, 2);
    assert!(report.is_clean());
    assert!(store.is_empty().await, "dry run must leave every table empty");
    assert!(store.list_domains().await.unwrap().is_empty());
    assert!(store.list_accounts().await.unwrap().is_empty());
}

#[tokio::test]
async fn live_import_creates_the_exact_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = export_file(&dir);
    let store = Arc::new(MemoryStore::new());

    let report = importer(&store)
        .load_from_csv(&path, false)
        .await
        .expect("import completes");
    assert_eq!(report.processed, 2);
    assert!(report.is_clean());

    let domains = store.list_domains().await.unwrap();
    assert_eq!(domains.len(), 2);
    for domain in &domains {
        assert_eq!(
            domain.nameservers,
            [
                "facebook.com".to_string(),
                "google.com".to_string(),
                String::new(),
                String::new(),
            ],
            "slot order with blank padding"
        );
        assert_eq!(domain.status, DomainStatus::Inactive);
        assert!(domain.last_synced_at.is_none(), "confirmation is quick-sync's job");
        assert!(domain.registry_id.is_none());
    }

    let accounts = store.list_accounts().await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert!(store.find_account("owner-one@agency.example").await.unwrap().is_some());
    assert!(store.find_account("owner-two@agency.example").await.unwrap().is_some());

    // Four placeholder contacts per row, profiles to be filled by sync
    let contacts = store.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 8);
    assert!(contacts.iter().all(|c| c.name.is_empty() && c.email.is_empty()));

    let fanpage = store.find_domain("fanpage.example.com").await.unwrap().unwrap();
    assert_eq!(fanpage.owner_email, "owner-one@agency.example");
    assert_eq!(fanpage.registrant_id.as_deref(), Some("C-R1"));
    assert_eq!(fanpage.tech_id.as_deref(), Some("C-T1"));
}

#[tokio::test]
async fn reimporting_the_same_file_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = export_file(&dir);
    let store = Arc::new(MemoryStore::new());

    let first = importer(&store).load_from_csv(&path, false).await.unwrap();
    assert_eq!(first.processed, 2);

    let second = importer(&store).load_from_csv(&path, false).await.unwrap();
    assert_eq!(second.processed, 0, "an unchanged file is a no-op");
    assert!(second.is_clean());

    assert_eq!(store.list_domains().await.unwrap().len(), 2);
    assert_eq!(store.list_accounts().await.unwrap().len(), 2);
    assert_eq!(store.list_contacts().await.unwrap().len(), 8);
}
