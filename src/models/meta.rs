//! Ledger rows keyed by path string.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::version::Version;

/// One metadata row. A row exists if and only if the path exists from the
/// protocol's point of view.
#[derive(Clone, FromRow, Debug)]
pub struct MetaRecord {
    /// The full path string this row belongs to.
    pub path: String,

    /// Write counter, starts at 1.
    pub sequence: i64,

    /// Hex entropy regenerated on every write.
    pub nonce: String,

    /// MIME type for documents; NULL for folders.
    pub content_type: Option<String>,

    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
}

impl MetaRecord {
    pub fn version(&self) -> Version {
        Version {
            sequence: self.sequence.max(0) as u64,
            nonce: self.nonce.clone(),
        }
    }
}
