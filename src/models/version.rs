//! Per-path version tokens.

use std::fmt;
use uuid::Uuid;

/// An opaque version for one path, rendered as `"<sequence>:<hex-nonce>"`.
///
/// The sequence increments by one on every write to the path; the nonce is
/// regenerated on every write so two versions never alias even when their
/// sequence numbers collide (racing writers, delete+recreate cycles).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub sequence: u64,
    pub nonce: String,
}

impl Version {
    /// The version reported for folders that do not exist. Identical for
    /// every path so empty-folder responses are cacheable.
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            nonce: "00000000".to_string(),
        }
    }

    /// Eight lowercase hex chars of fresh entropy.
    pub fn fresh_nonce() -> String {
        let id = Uuid::new_v4();
        let b = id.as_bytes();
        format!("{:02x}{:02x}{:02x}{:02x}", b[0], b[1], b[2], b[3])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sequence, self.nonce)
    }
}
