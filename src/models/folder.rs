//! The folder-description document served for folder GETs.
//!
//! Folders are never stored; a listing is computed from the filesystem
//! children joined with their ledger rows, then serialized in the exact
//! shape remoteStorage clients expect:
//!
//! ```json
//! {"@context":"http://remotestorage.io/spec/folder-description","items":{
//!   "a.txt": {"Content-Length": 3, "ETag": "2:cafef00d", "Content-Type": "text/plain"},
//!   "deep/": {}
//! }}
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

pub const FOLDER_DESCRIPTION_CONTEXT: &str = "http://remotestorage.io/spec/folder-description";

#[derive(Serialize, Debug)]
pub struct FolderListing {
    #[serde(rename = "@context")]
    pub context: &'static str,

    /// Child name (trailing `/` for subfolders) to entry.
    pub items: BTreeMap<String, FolderItem>,
}

impl FolderListing {
    pub fn new() -> Self {
        Self {
            context: FOLDER_DESCRIPTION_CONTEXT,
            items: BTreeMap::new(),
        }
    }
}

impl Default for FolderListing {
    fn default() -> Self {
        Self::new()
    }
}

/// Subfolder entries are empty objects; clients descend to learn more.
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum FolderItem {
    Document {
        #[serde(rename = "Content-Length")]
        content_length: i64,
        #[serde(rename = "ETag")]
        etag: String,
        #[serde(rename = "Content-Type")]
        content_type: String,
    },
    Folder {},
}
