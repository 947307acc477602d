//! Data model for the cached folder/file catalog (spec.md §3).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Opaque identifier for a folder or file in the remote store.
///
/// Folder keys are 11 characters; file keys are 11 or 15. The sentinel
/// `"root"` (and the remote's own `"myfiles"` convention, per spec.md §6.2)
/// both designate the account root and are accepted without length checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(pub String);

impl Key {
    pub const ROOT: &'static str = "root";

    /// Validate and wrap a key string (spec.md §3 Folder/File invariants).
    pub fn parse(raw: impl Into<String>) -> CoreResult<Self> {
        let raw = raw.into();
        if raw == Self::ROOT || raw == "myfiles" || raw.len() == 11 || raw.len() == 15 {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidArg(format!("malformed key: {raw:?}")))
        }
    }

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT || self.0 == "myfiles"
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix-epoch timestamp, matching the precision the remote API reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Self(secs as i64)
    }

    pub const EPOCH: Timestamp = Timestamp(0);
}

/// Folder record (spec.md §3 "Folder").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub key: Key,
    pub name: String,
    pub parent: Option<Key>,
    pub revision: u64,
    pub children_folders: Vec<Key>,
    pub children_files: Vec<Key>,
    pub created: Timestamp,
    pub modified: Timestamp,
}

impl Folder {
    pub fn root() -> Self {
        Self {
            key: Key::root(),
            name: String::new(),
            parent: None,
            revision: 0,
            children_folders: Vec::new(),
            children_files: Vec::new(),
            created: Timestamp::EPOCH,
            modified: Timestamp::EPOCH,
        }
    }
}

/// File record (spec.md §3 "File").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub key: Key,
    pub name: String,
    /// Hex digest, >= 32 chars; may be SHA-256 (64 chars) or legacy MD5 (32 chars).
    pub hash: String,
    pub size: u64,
    pub mtime: Timestamp,
    pub revision: u64,
    pub parent: Key,
}

/// POSIX-shaped attribute record filled by `FolderTree::getattr`.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub is_dir: bool,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub mtime: Timestamp,
    pub uid: u32,
    pub gid: u32,
}

impl Stat {
    pub fn for_folder(uid: u32, gid: u32, modified: Timestamp) -> Self {
        Self { is_dir: true, mode: 0o755, nlink: 1, size: 0, mtime: modified, uid, gid }
    }

    pub fn for_file(uid: u32, gid: u32, size: u64, mtime: Timestamp) -> Self {
        Self { is_dir: false, mode: 0o644, nlink: 1, size, mtime, uid, gid }
    }

    /// Synthetic entry for a `LOCAL_NEW` staged create not yet in the catalog
    /// (spec.md §4.5).
    pub fn synthetic_new_file(uid: u32, gid: u32) -> Self {
        Self { is_dir: false, mode: 0o644, nlink: 1, size: 0, mtime: Timestamp::now(), uid, gid }
    }
}

/// The kind of a resolved catalog entry, used by `readdir`/`getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File,
}

/// Split an absolute path into its parent directory and final component.
/// `/a/b/c` -> `("/a/b", "c")`; `/c` -> `("/", "c")`.
pub fn split_path(path: &str) -> CoreResult<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CoreError::InvalidArg("path has no parent".into()));
    }
    match trimmed.rfind('/') {
        Some(0) => Ok(("/".to_string(), trimmed[1..].to_string())),
        Some(idx) => Ok((trimmed[..idx].to_string(), trimmed[idx + 1..].to_string())),
        None => Err(CoreError::InvalidArg(format!("not an absolute path: {path:?}"))),
    }
}
