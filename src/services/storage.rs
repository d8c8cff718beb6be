//! The storage coordinator: the only component that touches both the
//! document store and the metadata ledger.
//!
//! Every mutation follows the same order: check conditions against the
//! ledger, move bytes on disk, then apply the whole ledger cascade as one
//! transaction. The filesystem step cannot join that transaction, so a
//! crash between the two can leave a document written but unversioned (or,
//! on delete, unlinked but still versioned); the read path tolerates both
//! states and the next successful write repairs them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tracing::{debug, warn};

use crate::errors::{StorageError, StorageResult};
use crate::models::{
    folder::{FolderItem, FolderListing},
    path::StoragePath,
    version::Version,
};
use crate::services::{
    document_store::{DocumentStore, FolderEntry},
    meta_store::MetaStore,
};

/// Outcome of a conditional document read.
#[derive(Debug)]
pub enum DocumentGet {
    NotModified {
        etag: String,
    },
    Found {
        etag: String,
        content_type: Option<String>,
        length: u64,
        updated_at: DateTime<Utc>,
        file: File,
    },
}

/// Outcome of a conditional folder read.
pub enum FolderGet {
    NotModified { etag: String },
    Listing { etag: String, listing: FolderListing },
}

#[derive(Clone)]
pub struct RemoteStorage {
    documents: DocumentStore,
    metadata: MetaStore,
}

impl RemoteStorage {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            documents: DocumentStore::new(base_path),
            metadata: MetaStore::new(db),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn metadata(&self) -> &MetaStore {
        &self.metadata
    }

    /// Store a document, cascading a version bump to every ancestor folder.
    ///
    /// `path` must be a document path. `if_match` is the set of acceptable
    /// current versions (or `*` for "any"); `if_none_match` containing `*`
    /// makes this a create-only write. Returns the version after the write.
    pub async fn put_document<S>(
        &self,
        path: &StoragePath,
        content_type: Option<&str>,
        body: S,
        if_match: Option<&[String]>,
        if_none_match: Option<&[String]>,
    ) -> StorageResult<Version>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let current = self.metadata.get(path).await?;
        let current_etag = current.as_ref().map(|r| r.version().to_string());

        if let Some(tags) = if_match {
            match &current_etag {
                Some(etag) if matches(tags, etag) => {}
                _ => return Err(StorageError::VersionMismatch(path.to_string())),
            }
        }
        if let Some(tags) = if_none_match {
            if tags.iter().any(|t| t == "*") && current.is_some() {
                return Err(StorageError::AlreadyExists(path.to_string()));
            }
        }

        let folders = self.documents.write(path, body).await?;
        self.metadata
            .record_write(path, content_type, &folders)
            .await?;

        let record = self.metadata.get(path).await?.ok_or_else(|| {
            StorageError::InvariantViolation {
                path: path.to_string(),
                detail: "row missing immediately after write".into(),
            }
        })?;
        Ok(record.version())
    }

    /// Delete a document, dropping ledger rows for every path that
    /// disappeared and bumping the ancestors that survived.
    ///
    /// `if_match` is checked before existence: a conditional delete of a
    /// missing document reports a mismatch, not not-found. Returns the
    /// version the document had before the delete.
    pub async fn delete_document(
        &self,
        path: &StoragePath,
        if_match: Option<&[String]>,
    ) -> StorageResult<Version> {
        let current = self.metadata.get(path).await?;
        let current_etag = current.as_ref().map(|r| r.version().to_string());

        if let Some(tags) = if_match {
            match &current_etag {
                Some(etag) if matches(tags, etag) => {}
                _ => return Err(StorageError::VersionMismatch(path.to_string())),
            }
        }
        let Some(record) = current else {
            return Err(StorageError::NotFound(path.to_string()));
        };

        let removed = self.documents.delete(path).await?;
        let removed_keys: HashSet<&str> = removed.iter().map(|p| p.as_str()).collect();
        let survivors: Vec<StoragePath> = path
            .folder_tree_to_user_root()
            .into_iter()
            .filter(|folder| !removed_keys.contains(folder.as_str()))
            .collect();

        self.metadata.record_delete(&removed, &survivors).await?;
        Ok(record.version())
    }

    /// Read a document: ledger first (absence is not-found), then a
    /// streaming handle to the payload.
    pub async fn get_document(
        &self,
        path: &StoragePath,
        if_none_match: Option<&[String]>,
    ) -> StorageResult<DocumentGet> {
        let Some(record) = self.metadata.get(path).await? else {
            return Err(StorageError::NotFound(path.to_string()));
        };
        let etag = record.version().to_string();

        if let Some(tags) = if_none_match {
            if matches(tags, &etag) {
                return Ok(DocumentGet::NotModified { etag });
            }
        }

        let (file, length) = self.documents.open(path).await.inspect_err(|err| {
            if matches!(err, StorageError::NotFound(_)) {
                warn!("ledger row exists but payload is missing for {}", path);
            }
        })?;

        Ok(DocumentGet::Found {
            etag,
            content_type: record.content_type,
            length,
            updated_at: record.updated_at,
            file,
        })
    }

    /// Compute a folder listing. Folders with no ledger row report the
    /// shared empty-folder version; documents with no ledger row do not
    /// exist yet and stay out of the listing.
    pub async fn get_folder(
        &self,
        path: &StoragePath,
        if_none_match: Option<&[String]>,
    ) -> StorageResult<FolderGet> {
        let record = self.metadata.get(path).await?;
        let exists = record.is_some();
        let etag = match record {
            Some(record) => record.version().to_string(),
            None => Version::empty().to_string(),
        };

        if let Some(tags) = if_none_match {
            if tags.iter().any(|t| (t == "*" && exists) || t == &etag) {
                return Ok(FolderGet::NotModified { etag });
            }
        }

        let children = self.documents.list_folder(path).await?;
        let mut listing = FolderListing::new();
        for (name, entry) in children {
            match entry {
                FolderEntry::Folder => {
                    listing.items.insert(name, FolderItem::Folder {});
                }
                FolderEntry::Document { size } => {
                    let Ok(child) = path.child(&name) else {
                        debug!("skipping unaddressable file {:?} in {}", name, path);
                        continue;
                    };
                    match self.metadata.get(&child).await? {
                        Some(meta) => {
                            listing.items.insert(
                                name,
                                FolderItem::Document {
                                    content_length: size,
                                    etag: meta.version().to_string(),
                                    content_type: meta
                                        .content_type
                                        .unwrap_or_else(|| "application/octet-stream".into()),
                                },
                            );
                        }
                        None => {
                            debug!("skipping unversioned file {}", child);
                        }
                    }
                }
            }
        }

        Ok(FolderGet::Listing { etag, listing })
    }

    /// Recursive folder size, formatted for display. Not part of the
    /// protocol surface.
    pub async fn folder_size_human(&self, path: &StoragePath) -> StorageResult<String> {
        let bytes = self.documents.folder_size(path).await?;
        Ok(human_size(bytes))
    }
}

/// Does any supplied tag accept this version? `*` accepts anything that
/// exists; callers only invoke this with an existing version in hand.
fn matches(tags: &[String], etag: &str) -> bool {
    tags.iter().any(|t| t == "*" || t == etag)
}

/// Binary-threshold display size: two decimals for GB/MB, whole kB below.
pub fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{} kB", bytes / KIB)
    }
}
