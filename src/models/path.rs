//! Validated remoteStorage path addressing.
//!
//! Every request addresses either a document (`/alice/notes/a.txt`) or a
//! folder (`/alice/notes/`). A trailing slash is the only thing that
//! distinguishes the two. Paths are parsed fresh from the request string on
//! every operation and never persisted.

use std::fmt;
use thiserror::Error;

/// Reasons a raw path string is rejected before reaching storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path must start with `/`")]
    NoLeadingSlash,
    #[error("path must not contain `..`")]
    Traversal,
    #[error("path must not contain empty segments")]
    EmptySegment,
    #[error("path has no user segment")]
    MissingUser,
}

/// A parsed, validated storage address.
///
/// Invariants held after `parse`:
/// - begins with `/`, contains no `..` and no `//`
/// - has at least a `/user/` segment
/// - `is_folder()` and `is_document()` are mutually exclusive, decided by
///   the trailing slash
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoragePath {
    raw: String,
    segments: Vec<String>,
    is_folder: bool,
}

impl StoragePath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if !raw.starts_with('/') {
            return Err(PathError::NoLeadingSlash);
        }
        if raw.contains("..") {
            return Err(PathError::Traversal);
        }
        if raw.contains("//") {
            return Err(PathError::EmptySegment);
        }
        if raw.split('/').count() < 3 {
            return Err(PathError::MissingUser);
        }

        let is_folder = raw.ends_with('/');
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            segments,
            is_folder,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path segments with the empty leading/trailing parts removed.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Owner of the tree this path lives in (second `/`-delimited segment).
    pub fn user_id(&self) -> &str {
        &self.segments[0]
    }

    /// True when the path is under the user's `public/` subtree.
    pub fn is_public(&self) -> bool {
        self.segments.get(1).map(String::as_str) == Some("public")
    }

    /// The module scoping this path: first segment after the optional
    /// `public` marker. `None` at the user root (or public root), which has
    /// no module.
    pub fn module_name(&self) -> Option<&str> {
        let idx = if self.is_public() { 2 } else { 1 };
        self.segments.get(idx).map(String::as_str)
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn is_document(&self) -> bool {
        !self.is_folder
    }

    /// The folder this path lives in: self for folders, the nearest
    /// enclosing folder for documents.
    pub fn folder_path(&self) -> StoragePath {
        if self.is_folder {
            self.clone()
        } else {
            self.prefix_folder(self.segments.len() - 1)
        }
    }

    /// Ancestor folders from the immediate parent up to and including the
    /// user root. Empty for the user root itself.
    pub fn folder_tree_to_user_root(&self) -> Vec<StoragePath> {
        (1..self.segments.len())
            .rev()
            .map(|k| self.prefix_folder(k))
            .collect()
    }

    /// Same ancestors, user root first.
    pub fn folder_tree_from_user_root(&self) -> Vec<StoragePath> {
        (1..self.segments.len())
            .map(|k| self.prefix_folder(k))
            .collect()
    }

    /// Resolve a child of a folder by its listing name. Names ending in `/`
    /// resolve to subfolders.
    pub fn child(&self, name: &str) -> Result<StoragePath, PathError> {
        debug_assert!(self.is_folder);
        StoragePath::parse(&format!("{}{}", self.raw, name))
    }

    fn prefix_folder(&self, depth: usize) -> StoragePath {
        let mut raw = String::from("/");
        for segment in &self.segments[..depth] {
            raw.push_str(segment);
            raw.push('/');
        }
        StoragePath {
            raw,
            segments: self.segments[..depth].to_vec(),
            is_folder: true,
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
