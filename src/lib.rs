//! remoteStorage-compatible versioned document store.
//!
//! Documents live as plain files under a base directory that mirrors the
//! path hierarchy; versions live in a SQLite ledger. The coordinator in
//! [`services::storage`] ties the two together with cascading version
//! bumps and RFC-7232-style conditional semantics.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
