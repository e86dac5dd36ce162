//! Core traits for the synchronization engine
//!
//! This module defines the abstract interfaces the engine is wired from.
//!
//! - [`EppGateway`]: Narrow interface to the remote registry
//! - [`RegistryStore`]: Transactional local storage plus the per-domain lease

pub mod gateway;
pub mod store;

pub use gateway::{
    ContactInfo, DomainInfo, EppGateway, GatewayFactory, PollMessage, PollMessageKind,
    RenewReceipt,
};
pub use store::{DomainLease, NewRenew, RegistryStore, StoreFactory};
