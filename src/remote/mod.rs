//! `RemoteClient`: the opaque collaborator described in spec.md §6.2.
//!
//! Only the contract is in scope here: authentication, request signing and
//! retry policy belong to the transport, not the catalog core.

pub mod http;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::Key;

/// A single change record from the remote's change journal (spec.md §4.1
/// "Synchronization algorithm").
#[derive(Debug, Clone)]
pub enum ChangeRecord {
    FolderCreated { key: Key, parent: Key, name: String, revision: u64 },
    FolderRenamed { key: Key, name: String, revision: u64 },
    FolderMoved { key: Key, new_parent: Key, revision: u64 },
    FolderDeleted { key: Key },
    FileCreated { key: Key, parent: Key, name: String, hash: String, size: u64, revision: u64 },
    FileUpdated { key: Key, hash: String, size: u64, revision: u64 },
    FileRenamed { key: Key, name: String, revision: u64 },
    FileMoved { key: Key, new_parent: Key, revision: u64 },
    FileDeleted { key: Key },
    /// Counter wrap or epoch change: the catalog must be flushed and
    /// refetched wholesale (spec.md §4.1).
    ResetRequired,
}

/// Ordered change journal returned by `device_changes`.
pub struct Journal {
    pub records: Vec<ChangeRecord>,
    pub latest_revision: u64,
}

/// Metadata for a single folder entry returned by `folder_get_content`.
#[derive(Debug, Clone)]
pub struct FolderContentEntry {
    pub key: Key,
    pub name: String,
    pub revision: u64,
}

/// Metadata for a single file entry returned by `folder_get_content`.
#[derive(Debug, Clone)]
pub struct FileContentEntry {
    pub key: Key,
    pub name: String,
    pub hash: String,
    pub size: u64,
    pub revision: u64,
}

/// Metadata returned by `file_get_info`, including the short-lived
/// direct-link used to download bytes.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub hash: String,
    pub size: u64,
    pub revision: u64,
    pub direct_link: String,
}

/// Poll status of an in-flight upload (spec.md §6.2). Terminal success is
/// numeric 99, per the remote API's compatibility constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadStatus(pub u32);

impl UploadStatus {
    pub const SUCCESS: u32 = 99;

    pub fn is_success(self) -> bool {
        self.0 == Self::SUCCESS
    }
}

/// The remote HTTP object-store API, as consumed by the catalog core
/// (spec.md §6.2). Implementations own authentication and retry policy.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn folder_create(&self, parent: Option<&Key>, name: &str) -> CoreResult<Key>;

    async fn folder_delete(&self, key: &Key) -> CoreResult<()>;

    async fn file_delete(&self, key: &Key) -> CoreResult<()>;

    async fn device_changes(&self, since_revision: u64) -> CoreResult<Journal>;

    async fn folder_get_content(
        &self,
        key: &Key,
    ) -> CoreResult<(Vec<FolderContentEntry>, Vec<FileContentEntry>)>;

    async fn file_get_info(&self, key: &Key) -> CoreResult<FileInfo>;

    async fn download(&self, url: &str, dest: &mut tokio::fs::File) -> CoreResult<()>;

    async fn upload_simple(
        &self,
        parent: &Key,
        src: &mut tokio::fs::File,
        name: &str,
    ) -> CoreResult<String>;

    async fn upload_patch(&self, existing: &Key, src: &mut tokio::fs::File) -> CoreResult<String>;

    async fn upload_poll(&self, upload_key: &str) -> CoreResult<(UploadStatus, Option<String>)>;

    /// Stable identity of the authenticated account, used to validate the
    /// persisted catalog at startup (spec.md §6.3).
    async fn account_id(&self) -> CoreResult<String>;
}
