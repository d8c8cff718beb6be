//! End-to-end coordinator tests: real files under a temp dir, real ledger
//! in an in-memory SQLite database.

use bytes::Bytes;
use futures::stream;
use sqlx::sqlite::SqlitePoolOptions;
use std::io;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use remote_store::errors::StorageError;
use remote_store::models::folder::FolderItem;
use remote_store::models::path::StoragePath;
use remote_store::models::version::Version;
use remote_store::services::storage::{DocumentGet, FolderGet, RemoteStorage};

async fn storage() -> (RemoteStorage, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    let storage = RemoteStorage::new(db, dir.path());
    storage.metadata().migrate().await.unwrap();
    (storage, dir)
}

fn path(raw: &str) -> StoragePath {
    StoragePath::parse(raw).unwrap()
}

fn body(content: &str) -> impl futures::Stream<Item = io::Result<Bytes>> + Send {
    stream::iter(vec![Ok(Bytes::from(content.to_string()))])
}

async fn put(storage: &RemoteStorage, raw: &str, content: &str) -> Version {
    storage
        .put_document(&path(raw), Some("text/plain"), body(content), None, None)
        .await
        .unwrap()
}

/// Read a document fully, returning (content, etag).
async fn read_document(storage: &RemoteStorage, raw: &str) -> (String, String) {
    match storage.get_document(&path(raw), None).await.unwrap() {
        DocumentGet::Found { etag, mut file, .. } => {
            let mut buf = String::new();
            file.read_to_string(&mut buf).await.unwrap();
            (buf, etag)
        }
        DocumentGet::NotModified { .. } => panic!("unconditional get returned not-modified"),
    }
}

async fn folder_etag(storage: &RemoteStorage, raw: &str) -> String {
    match storage.get_folder(&path(raw), None).await.unwrap() {
        FolderGet::Listing { etag, .. } => etag,
        FolderGet::NotModified { .. } => panic!("unconditional get returned not-modified"),
    }
}

#[tokio::test]
async fn put_then_get_roundtrip() {
    let (storage, _dir) = storage().await;

    let version = put(&storage, "/alice/notes/a.txt", "hi").await;
    assert_eq!(version.sequence, 1);
    assert!(version.to_string().starts_with("1:"));

    let (content, etag) = read_document(&storage, "/alice/notes/a.txt").await;
    assert_eq!(content, "hi");
    assert_eq!(etag, version.to_string());

    match storage
        .get_document(&path("/alice/notes/a.txt"), None)
        .await
        .unwrap()
    {
        DocumentGet::Found {
            content_type,
            length,
            ..
        } => {
            assert_eq!(content_type.as_deref(), Some("text/plain"));
            assert_eq!(length, 2);
        }
        _ => panic!("expected document"),
    }
}

#[tokio::test]
async fn second_put_bumps_sequence_and_listing() {
    let (storage, _dir) = storage().await;

    let v1 = put(&storage, "/alice/notes/a.txt", "hi").await;
    let v2 = put(&storage, "/alice/notes/a.txt", "bye").await;
    assert_eq!(v2.sequence, 2);
    assert_ne!(v1.to_string(), v2.to_string());

    match storage.get_folder(&path("/alice/notes/"), None).await.unwrap() {
        FolderGet::Listing { listing, .. } => {
            match listing.items.get("a.txt").expect("a.txt listed") {
                FolderItem::Document {
                    content_length,
                    etag,
                    content_type,
                } => {
                    assert_eq!(*content_length, 3);
                    assert_eq!(etag, &v2.to_string());
                    assert_eq!(content_type, "text/plain");
                }
                FolderItem::Folder {} => panic!("a.txt listed as folder"),
            }
        }
        _ => panic!("expected listing"),
    }
}

#[tokio::test]
async fn delete_returns_prior_version_and_empties_tree() {
    let (storage, _dir) = storage().await;

    let v = put(&storage, "/alice/notes/a.txt", "hi").await;
    let prior = storage
        .delete_document(&path("/alice/notes/a.txt"), None)
        .await
        .unwrap();
    assert_eq!(prior.to_string(), v.to_string());

    let err = storage
        .get_document(&path("/alice/notes/a.txt"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));

    // both folders emptied out, so they report the shared empty version
    match storage.get_folder(&path("/alice/notes/"), None).await.unwrap() {
        FolderGet::Listing { etag, listing } => {
            assert!(listing.items.is_empty());
            assert_eq!(etag, Version::empty().to_string());
        }
        _ => panic!("expected listing"),
    }
    assert_eq!(
        folder_etag(&storage, "/alice/").await,
        Version::empty().to_string()
    );
}

#[tokio::test]
async fn create_only_put_rejects_existing() {
    let (storage, _dir) = storage().await;

    let v1 = put(&storage, "/alice/notes/a.txt", "hi").await;
    let err = storage
        .put_document(
            &path("/alice/notes/a.txt"),
            Some("text/plain"),
            body("other"),
            None,
            Some(&["*".to_string()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)));

    // no mutation happened
    let (content, etag) = read_document(&storage, "/alice/notes/a.txt").await;
    assert_eq!(content, "hi");
    assert_eq!(etag, v1.to_string());
}

#[tokio::test]
async fn create_only_put_succeeds_when_absent() {
    let (storage, _dir) = storage().await;

    let version = storage
        .put_document(
            &path("/alice/notes/a.txt"),
            Some("text/plain"),
            body("hi"),
            None,
            Some(&["*".to_string()]),
        )
        .await
        .unwrap();
    assert_eq!(version.sequence, 1);
}

#[tokio::test]
async fn stale_if_match_rejected_without_mutation() {
    let (storage, _dir) = storage().await;

    let v1 = put(&storage, "/alice/notes/a.txt", "hi").await;
    let err = storage
        .put_document(
            &path("/alice/notes/a.txt"),
            Some("text/plain"),
            body("other"),
            Some(&["0:12345678".to_string()]),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::VersionMismatch(_)));

    let (content, etag) = read_document(&storage, "/alice/notes/a.txt").await;
    assert_eq!(content, "hi");
    assert_eq!(etag, v1.to_string());
}

#[tokio::test]
async fn matching_if_match_accepted() {
    let (storage, _dir) = storage().await;

    let v1 = put(&storage, "/alice/notes/a.txt", "hi").await;
    let v2 = storage
        .put_document(
            &path("/alice/notes/a.txt"),
            Some("text/plain"),
            body("bye"),
            Some(&[v1.to_string()]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(v2.sequence, 2);

    let prior = storage
        .delete_document(&path("/alice/notes/a.txt"), Some(&[v2.to_string()]))
        .await
        .unwrap();
    assert_eq!(prior.to_string(), v2.to_string());
}

#[tokio::test]
async fn document_in_place_of_folder_conflicts() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/pub/x.txt", "file").await;

    // treating x.txt as a folder must fail and leave it untouched
    let err = storage
        .put_document(
            &path("/alice/pub/x.txt/y.txt"),
            Some("text/plain"),
            body("nested"),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));

    let (content, _) = read_document(&storage, "/alice/pub/x.txt").await;
    assert_eq!(content, "file");

    // and the ledger never saw y.txt
    let err = storage
        .get_document(&path("/alice/pub/x.txt/y.txt"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn folder_in_place_of_document_conflicts() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/pub/x.txt", "file").await;

    // "/alice/pub" names the directory that now exists on disk
    let err = storage
        .put_document(&path("/alice/pub"), Some("text/plain"), body("clash"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
}

#[tokio::test]
async fn write_cascades_to_every_ancestor() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/notes/deep/a.txt", "one").await;
    let root1 = folder_etag(&storage, "/alice/").await;
    let notes1 = folder_etag(&storage, "/alice/notes/").await;
    let deep1 = folder_etag(&storage, "/alice/notes/deep/").await;

    put(&storage, "/alice/notes/deep/a.txt", "two").await;
    assert_ne!(folder_etag(&storage, "/alice/").await, root1);
    assert_ne!(folder_etag(&storage, "/alice/notes/").await, notes1);
    assert_ne!(folder_etag(&storage, "/alice/notes/deep/").await, deep1);
}

#[tokio::test]
async fn delete_cascades_and_prunes() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/notes/a.txt", "aaa").await;
    put(&storage, "/alice/notes/b.txt", "bbb").await;
    let notes_before = folder_etag(&storage, "/alice/notes/").await;
    let root_before = folder_etag(&storage, "/alice/").await;

    storage
        .delete_document(&path("/alice/notes/a.txt"), None)
        .await
        .unwrap();

    // folder still exists (b.txt remains) but its version was bumped
    let notes_after = folder_etag(&storage, "/alice/notes/").await;
    assert_ne!(notes_after, notes_before);
    assert_ne!(notes_after, Version::empty().to_string());
    assert_ne!(folder_etag(&storage, "/alice/").await, root_before);

    storage
        .delete_document(&path("/alice/notes/b.txt"), None)
        .await
        .unwrap();

    // last child removed: the whole chain vanished
    assert_eq!(
        folder_etag(&storage, "/alice/notes/").await,
        Version::empty().to_string()
    );
    assert_eq!(
        folder_etag(&storage, "/alice/").await,
        Version::empty().to_string()
    );
}

#[tokio::test]
async fn empty_folder_etag_is_shared() {
    let (storage, _dir) = storage().await;

    let a = folder_etag(&storage, "/zed/nothing/").await;
    let b = folder_etag(&storage, "/kim/other/deeper/").await;
    assert_eq!(a, b);
    assert_eq!(a, Version::empty().to_string());
}

#[tokio::test]
async fn conditional_get_not_modified() {
    let (storage, _dir) = storage().await;

    let v = put(&storage, "/alice/notes/a.txt", "hi").await;
    match storage
        .get_document(
            &path("/alice/notes/a.txt"),
            Some(&[v.to_string()]),
        )
        .await
        .unwrap()
    {
        DocumentGet::NotModified { etag } => assert_eq!(etag, v.to_string()),
        _ => panic!("expected not-modified"),
    }

    let folder_version = folder_etag(&storage, "/alice/notes/").await;
    match storage
        .get_folder(&path("/alice/notes/"), Some(&[folder_version.clone()]))
        .await
        .unwrap()
    {
        FolderGet::NotModified { etag } => assert_eq!(etag, folder_version),
        _ => panic!("expected not-modified"),
    }

    // the empty-folder constant is conditional-cacheable too
    match storage
        .get_folder(
            &path("/nobody/here/"),
            Some(&[Version::empty().to_string()]),
        )
        .await
        .unwrap()
    {
        FolderGet::NotModified { .. } => {}
        _ => panic!("expected not-modified"),
    }
}

#[tokio::test]
async fn if_match_checked_before_existence() {
    let (storage, _dir) = storage().await;

    // conditional delete of a missing document reports mismatch, not 404
    let err = storage
        .delete_document(
            &path("/alice/notes/ghost.txt"),
            Some(&["1:deadbeef".to_string()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::VersionMismatch(_)));

    // unconditional delete of the same path is a plain not-found
    let err = storage
        .delete_document(&path("/alice/notes/ghost.txt"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn recreate_after_delete_gets_distinct_version() {
    let (storage, _dir) = storage().await;

    let first = put(&storage, "/alice/notes/a.txt", "hi").await;
    storage
        .delete_document(&path("/alice/notes/a.txt"), None)
        .await
        .unwrap();
    let second = put(&storage, "/alice/notes/a.txt", "hi").await;

    // sequence restarts at 1 but the version string never repeats
    assert_eq!(second.sequence, 1);
    assert_ne!(first.to_string(), second.to_string());
}

#[tokio::test]
async fn listing_shows_subfolders_as_empty_objects() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/notes/b.txt", "bbb").await;
    put(&storage, "/alice/notes/deep/a.txt", "aaa").await;

    match storage.get_folder(&path("/alice/notes/"), None).await.unwrap() {
        FolderGet::Listing { listing, .. } => {
            assert!(matches!(
                listing.items.get("deep/"),
                Some(FolderItem::Folder {})
            ));
            assert!(matches!(
                listing.items.get("b.txt"),
                Some(FolderItem::Document { .. })
            ));
            assert_eq!(listing.items.len(), 2);
        }
        _ => panic!("expected listing"),
    }
}

#[tokio::test]
async fn folder_size_counts_descendants() {
    let (storage, _dir) = storage().await;

    put(&storage, "/alice/notes/a.txt", "aaa").await;
    put(&storage, "/alice/notes/deep/b.txt", "bbbbb").await;
    put(&storage, "/alice/pics/c.bin", "cc").await;

    let total = storage
        .documents()
        .folder_size(&path("/alice/"))
        .await
        .unwrap();
    assert_eq!(total, 10);

    assert_eq!(
        storage.folder_size_human(&path("/alice/")).await.unwrap(),
        "0 kB"
    );
    assert_eq!(
        storage
            .folder_size_human(&path("/nobody/"))
            .await
            .unwrap(),
        "0 kB"
    );
}

#[tokio::test]
async fn ledger_delete_of_missing_row_fails_loudly() {
    let (storage, _dir) = storage().await;

    let err = storage
        .metadata()
        .delete(&path("/alice/notes/ghost.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvariantViolation { .. }));
}

#[tokio::test]
async fn ledger_upsert_inserts_then_increments() {
    let (storage, _dir) = storage().await;
    let p = path("/alice/notes/a.txt");

    storage.metadata().upsert(&p, Some("text/plain")).await.unwrap();
    let first = storage.metadata().get(&p).await.unwrap().unwrap();
    assert_eq!(first.sequence, 1);

    storage.metadata().upsert(&p, Some("text/plain")).await.unwrap();
    let second = storage.metadata().get(&p).await.unwrap().unwrap();
    assert_eq!(second.sequence, 2);
    assert_ne!(first.nonce, second.nonce);
    assert_eq!(second.content_type.as_deref(), Some("text/plain"));
}
