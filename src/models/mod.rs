//! Core value types for the remoteStorage engine.
//!
//! `StoragePath` addresses everything; `Version` and `MetaRecord` form the
//! ledger side; `FolderListing` is the computed folder view. None of these
//! perform I/O.

pub mod folder;
pub mod meta;
pub mod path;
pub mod version;
