//! Terraform Provider for Cisco FMC
//!
//! This provider implements the Terraform Plugin Protocol for managing
//! Firewall Management Center objects and policies. Collections of child
//! objects are reconciled in bulk by the [`bulk`] engine.

pub mod bulk;
pub mod client;
pub mod config;
pub mod data_sources;
pub mod import;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod version;

pub use provider::FmcProvider;
