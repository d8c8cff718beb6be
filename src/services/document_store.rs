//! Filesystem-backed document payloads.
//!
//! The on-disk layout mirrors the path hierarchy exactly:
//! `base_path/<userId>/<module...>/<name>`. Files and directories share one
//! namespace, so a name can never be both a document and a folder; the
//! conflict checks in `write` enforce that before any byte lands on disk.
//! Versions live elsewhere (the metadata ledger); this store only moves
//! bytes and directories.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{StorageError, StorageResult};
use crate::models::path::StoragePath;

/// In-flight uploads are written under this prefix and renamed into place;
/// listings and size scans never report them.
const TMP_PREFIX: &str = ".tmp-";

/// One child of a folder, as seen on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderEntry {
    Folder,
    Document { size: i64 },
}

#[derive(Clone)]
pub struct DocumentStore {
    base_path: PathBuf,
}

impl DocumentStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Physical location of a path. Does not check for existence.
    fn disk_path(&self, path: &StoragePath) -> PathBuf {
        let mut disk = self.base_path.clone();
        for segment in path.segments() {
            disk.push(segment);
        }
        disk
    }

    /// True iff the path resolves to a regular file.
    pub async fn exists(&self, path: &StoragePath) -> StorageResult<bool> {
        match fs::metadata(self.disk_path(path)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Open a document for streaming reads. Returns the handle and its
    /// current byte length.
    pub async fn open(&self, path: &StoragePath) -> StorageResult<(File, u64)> {
        let disk = self.disk_path(path);
        let file = File::open(&disk).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        let length = file.metadata().await?.len();
        Ok((file, length))
    }

    /// Stream a document to disk.
    ///
    /// Fails with a conflict before touching anything if an ancestor
    /// segment already exists as a document, or if the target itself is
    /// currently a directory. Bytes go to a temp sibling first and are
    /// renamed into place, so concurrent readers never observe a partial
    /// write.
    ///
    /// Returns the ancestor folders of the document, user root downward.
    /// Created here or already present, the caller cascades versions over
    /// all of them either way.
    pub async fn write<S>(&self, path: &StoragePath, stream: S) -> StorageResult<Vec<StoragePath>>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let folders = path.folder_tree_from_user_root();
        for folder in &folders {
            match fs::metadata(self.disk_path(folder)).await {
                Ok(meta) if meta.is_file() => {
                    return Err(StorageError::Conflict {
                        path: folder.to_string(),
                        reason: "ancestor segment is a document".into(),
                    });
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        let file_path = self.disk_path(path);
        match fs::metadata(&file_path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(StorageError::Conflict {
                    path: path.to_string(),
                    reason: "path is a folder".into(),
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "document path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut written: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            written += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        debug!("wrote {} bytes to {}", written, path);
        Ok(folders)
    }

    /// Remove a document and prune ancestor directories that became empty.
    ///
    /// Returns every path that disappeared, the document first, then each
    /// emptied ancestor walking upward. Stops at the first non-empty
    /// ancestor; the user root itself is pruned when it empties out.
    /// A payload file already missing is tolerated so ledger cleanup can
    /// still run after a crash between the two stores.
    pub async fn delete(&self, path: &StoragePath) -> StorageResult<Vec<StoragePath>> {
        let file_path = self.disk_path(path);
        match fs::remove_file(&file_path).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload for {} already missing", path);
            }
            Err(err) => return Err(err.into()),
        }

        let mut removed = vec![path.clone()];
        for folder in path.folder_tree_to_user_root() {
            match fs::remove_dir(self.disk_path(&folder)).await {
                Ok(_) => removed.push(folder),
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune folder {}: {}", folder, err);
                    break;
                }
            }
        }

        Ok(removed)
    }

    /// Non-recursive folder listing. Subfolder names carry a trailing `/`.
    /// An absent directory yields an empty map, not an error.
    pub async fn list_folder(
        &self,
        path: &StoragePath,
    ) -> StorageResult<BTreeMap<String, FolderEntry>> {
        let mut entries = BTreeMap::new();
        let mut dir = match fs::read_dir(self.disk_path(path)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TMP_PREFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                entries.insert(format!("{}/", name), FolderEntry::Folder);
            } else {
                entries.insert(
                    name,
                    FolderEntry::Document {
                        size: meta.len() as i64,
                    },
                );
            }
        }

        Ok(entries)
    }

    /// Total bytes of every descendant document; 0 when the folder does
    /// not exist.
    pub async fn folder_size(&self, path: &StoragePath) -> StorageResult<u64> {
        let mut total: u64 = 0;
        let mut pending = vec![self.disk_path(path)];

        while let Some(dir_path) = pending.pop() {
            let mut dir = match fs::read_dir(&dir_path).await {
                Ok(dir) => dir,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }

        Ok(total)
    }
}
