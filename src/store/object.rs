//! Object model for the content-addressed store
//!
//! Three object kinds live in the store: file contents, trees (one
//! directory level) and commits. Every object is named by the SHA-256 of
//! its canonical bytes.

use crate::checksum::Digest;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;

/// Mode recorded for regular files without any execute bit
pub const MODE_FILE: u32 = 0o644;
/// Mode recorded for executable regular files and directories
pub const MODE_EXEC: u32 = 0o755;

/// Name of a stored object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Hash canonical object bytes into an id
    pub fn hash(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shortened hex for log output
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|_| CacheError::InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.to_hex()
    }
}

/// Kind of a stored object, used as the on-disk file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Tree,
    Commit,
}

impl ObjectKind {
    /// File extension for objects of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    /// Parse from an object file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "file" => Some(Self::File),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Canonical mode for a filesystem entry; only the execute bit survives
pub fn canonical_mode(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            return MODE_EXEC;
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;
    MODE_FILE
}

/// Id of a file object with the given mode and content.
///
/// The mode is part of the id so one stored object can be hard-linked
/// anywhere that content appears with that mode.
pub fn file_object_id(mode: u32, content: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(format!("file\0{:o}\0", mode).as_bytes());
    hasher.update(content);
    ObjectId(hasher.finalize().into())
}

/// One entry of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeEntry {
    File { name: String, mode: u32, id: ObjectId },
    Dir { name: String, id: ObjectId },
    Symlink { name: String, target: String },
}

impl TreeEntry {
    /// Entry name within its directory
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Dir { name, .. } | Self::Symlink { name, .. } => name,
        }
    }
}

/// One directory level, entries sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, sorting entries into canonical order
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Self { entries }
    }

    /// Canonical bytes hashed into the tree's id
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A snapshot record with an optional parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Previous commit in this lineage
    pub parent: Option<ObjectId>,
    /// Input checksum this snapshot was built from
    pub subject: Digest,
    /// Free-form description
    pub body: String,
    /// Root tree
    pub tree: ObjectId,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    /// Canonical bytes hashed into the commit's id
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
