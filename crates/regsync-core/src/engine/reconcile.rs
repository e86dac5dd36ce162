//! Entity reconciliation
//!
//! Idempotent upserts for the entities a domain references, keyed by
//! natural key: registry id for contacts, hostname for nameservers,
//! email for owner accounts. Running the same reconciliation twice never
//! duplicates a row, which is what makes poll redelivery safe.
//!
//! Owner resolution is gated: moving a domain to a different account, or
//! fabricating an account the back office has never seen, requires the
//! caller's explicit authorization and fails with an integrity error
//! otherwise.

use tracing::debug;

use super::SyncOptions;
use crate::error::{Error, Result};
use crate::model::{Account, Contact, Domain, NameServer};
use crate::traits::{ContactInfo, DomainInfo, RegistryStore};

/// Outcome of reconciling one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Row did not exist and was created
    Created,
    /// Row existed and at least one attribute was written
    Updated,
    /// Row existed and nothing needed to change
    Unchanged,
}

impl Reconciled {
    /// Whether the row was created by this reconciliation
    pub fn created(&self) -> bool {
        matches!(self, Reconciled::Created)
    }
}

/// Decide which account owns the domain after this sync.
///
/// The remote opinion is the registrant's email address. A differing
/// remote owner moves the domain only under `change_owner_allowed`; an
/// owner the back office has no account for is created only under
/// `create_new_owner_allowed`. When the registry discloses no email,
/// the local owner stands.
pub(crate) async fn resolve_owner(
    store: &dyn RegistryStore,
    domain_name: &str,
    existing: Option<&Domain>,
    info: &DomainInfo,
    options: &SyncOptions,
) -> Result<String> {
    let local_owner = existing
        .map(|d| d.owner_email.clone())
        .filter(|e| !e.is_empty());
    let remote_owner = info
        .registrant
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    match (local_owner, remote_owner) {
        (Some(local), None) => Ok(local),
        (Some(local), Some(remote)) if local == remote => Ok(local),
        (Some(local), Some(remote)) => {
            if !options.change_owner_allowed {
                return Err(Error::OwnershipChangeDenied {
                    domain: domain_name.to_string(),
                    current: local,
                    remote,
                });
            }
            adopt_owner(store, domain_name, remote, options).await
        }
        (None, Some(remote)) => adopt_owner(store, domain_name, remote, options).await,
        (None, None) => Ok(String::new()),
    }
}

/// Attach the domain to `email`, creating the account if authorized
async fn adopt_owner(
    store: &dyn RegistryStore,
    domain_name: &str,
    email: String,
    options: &SyncOptions,
) -> Result<String> {
    if store.find_account(&email).await?.is_none() {
        if !options.create_new_owner_allowed {
            return Err(Error::UnknownOwner {
                domain: domain_name.to_string(),
                email,
            });
        }
        let (_, outcome) = reconcile_account(store, &email).await?;
        debug!(
            "Owner account {} for {}: {:?}",
            email, domain_name, outcome
        );
    }
    Ok(email)
}

/// Ensure an account row exists for `email`
pub(crate) async fn reconcile_account(
    store: &dyn RegistryStore,
    email: &str,
) -> Result<(Account, Reconciled)> {
    match store.find_account(email).await? {
        Some(account) => Ok((account, Reconciled::Unchanged)),
        None => {
            let account = Account::new(email);
            store.put_account(&account).await?;
            Ok((account, Reconciled::Created))
        }
    }
}

/// Upsert a contact row from a registry-reported profile.
///
/// A missing row is created from whatever fields the registry disclosed.
/// An existing row is touched according to the options:
/// `rewrite_contacts` overwrites provided fields unconditionally,
/// `refresh_contacts` fills only fields that are locally blank, and with
/// neither flag the profile is left alone.
pub(crate) async fn reconcile_contact(
    store: &dyn RegistryStore,
    info: &ContactInfo,
    options: &SyncOptions,
) -> Result<(Contact, Reconciled)> {
    match store.find_contact(&info.registry_id).await? {
        None => {
            let contact = contact_from_info(info);
            store.put_contact(&contact).await?;
            Ok((contact, Reconciled::Created))
        }
        Some(mut contact) => {
            let changed = if options.rewrite_contacts {
                merge_profile(&mut contact, info, false)
            } else if options.refresh_contacts {
                merge_profile(&mut contact, info, true)
            } else {
                false
            };
            if changed {
                store.put_contact(&contact).await?;
                Ok((contact, Reconciled::Updated))
            } else {
                Ok((contact, Reconciled::Unchanged))
            }
        }
    }
}

/// Ensure nameserver rows exist for every delegated host.
///
/// Hosts are shared between domains and are never deleted here; a domain
/// dropping a host says nothing about the host itself.
pub(crate) async fn reconcile_nameservers(
    store: &dyn RegistryStore,
    hosts: &[String],
) -> Result<()> {
    for host in hosts {
        let hostname = host.trim().to_lowercase();
        if hostname.is_empty() {
            continue;
        }
        if store.find_nameserver(&hostname).await?.is_none() {
            store.put_nameserver(&NameServer::new(&hostname)).await?;
        }
    }
    Ok(())
}

fn contact_from_info(info: &ContactInfo) -> Contact {
    Contact {
        registry_id: info.registry_id.clone(),
        name: info.name.clone().unwrap_or_default(),
        organization: info.organization.clone().unwrap_or_default(),
        email: info.email.clone().unwrap_or_default(),
        phone: info.phone.clone().unwrap_or_default(),
        address: info.address.clone().unwrap_or_default(),
    }
}

/// Write provided profile fields into the row. With `only_if_blank` the
/// write is limited to locally-blank fields. Returns whether anything
/// changed.
fn merge_profile(contact: &mut Contact, info: &ContactInfo, only_if_blank: bool) -> bool {
    let mut changed = false;
    changed |= apply_field(&mut contact.name, info.name.as_ref(), only_if_blank);
    changed |= apply_field(
        &mut contact.organization,
        info.organization.as_ref(),
        only_if_blank,
    );
    changed |= apply_field(&mut contact.email, info.email.as_ref(), only_if_blank);
    changed |= apply_field(&mut contact.phone, info.phone.as_ref(), only_if_blank);
    changed |= apply_field(&mut contact.address, info.address.as_ref(), only_if_blank);
    changed
}

fn apply_field(field: &mut String, value: Option<&String>, only_if_blank: bool) -> bool {
    match value {
        Some(v) if !v.is_empty() && (!only_if_blank || field.is_empty()) && field != v => {
            *field = v.clone();
            true
        }
        _ => false,
    }
}
