//! `FolderTree`: the synchronization engine and sole owner of the catalog
//! lock (spec.md §4.1, §5). Every operation that touches the in-memory
//! catalog or the open-handle census goes through here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::fs::File as TokioFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::handle::{OpenCensus, Role};
use crate::model::{split_path, EntryKind, File, Folder, Key, Stat, Timestamp};
use crate::persistence::{self, Snapshot};
use crate::remote::{ChangeRecord, Journal, RemoteClient};

use super::store::TreeStore;

/// Minimum interval between two opportunistic (non-forced) syncs
/// (SPEC_FULL.md §4.1 "Synchronization algorithm").
const UPDATE_DEBOUNCE: Duration = Duration::from_secs(2);

struct Inner {
    store: TreeStore,
    census: OpenCensus,
    revision: u64,
    last_update: Option<Instant>,
    /// Change records skipped because their path was held open, keyed by
    /// the entity's key. Applied once the last handle on the path releases
    /// (spec.md section 4.1 point 4: updates must not refresh a path that
    /// is currently open).
    pending_updates: HashMap<Key, ChangeRecord>,
}

/// The catalog plus its exclusion bookkeeping, guarded as one group per
/// spec.md §5 ("catalog and the open multisets as a single logical group").
pub struct FolderTree {
    remote: Arc<dyn RemoteClient>,
    staging_dir: PathBuf,
    account_id: String,
    inner: RwLock<Inner>,
    /// Staged file kept open for the lifetime of an active handle on a
    /// path, so concurrent readers of the same path share one download
    /// instead of re-fetching (SPEC_FULL.md §6.4). Keyed separately from
    /// `Inner` since it never needs to be held across the catalog lock.
    masters: Mutex<HashMap<String, TokioFile>>,
}

fn effective_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid take no arguments and cannot fail.
    unsafe { (libc::getuid(), libc::getgid()) }
}

impl FolderTree {
    pub fn new(remote: Arc<dyn RemoteClient>, staging_dir: PathBuf, account_id: String) -> Self {
        Self {
            remote,
            staging_dir,
            account_id,
            inner: RwLock::new(Inner {
                store: TreeStore::new(),
                census: OpenCensus::new(),
                revision: 0,
                last_update: None,
                pending_updates: HashMap::new(),
            }),
            masters: Mutex::new(HashMap::new()),
        }
    }

    /// Load a persisted catalog, falling back to a full bootstrap when no
    /// usable snapshot exists (spec.md §6.3).
    pub async fn load_or_bootstrap(&self, cache_path: &Path) -> CoreResult<()> {
        match persistence::load(cache_path, &self.account_id).await {
            Ok(Some(snapshot)) => {
                info!(revision = snapshot.revision, "loaded persisted catalog");
                let mut inner = self.inner.write().await;
                inner.store = TreeStore::from_parts(snapshot.folders, snapshot.files);
                inner.revision = snapshot.revision;
                Ok(())
            }
            Ok(None) => {
                info!("no usable persisted catalog, bootstrapping from remote");
                self.bootstrap().await
            }
            Err(e) => {
                warn!(error = %e, "persisted catalog unreadable, bootstrapping from remote");
                self.bootstrap().await
            }
        }
    }

    pub async fn store_to(&self, cache_path: &Path) -> CoreResult<()> {
        let (revision, folders, files) = {
            let inner = self.inner.read().await;
            let (folders, files) = inner.store.snapshot();
            (inner.revision, folders, files)
        };
        let snapshot = Snapshot { account_id: self.account_id.clone(), revision, folders, files };
        persistence::save(cache_path, &snapshot)
            .await
            .map_err(|e| CoreError::CorruptIo(e.to_string()))
    }

    /// Wholesale refetch of the entire folder tree from the remote root
    /// (spec.md §4.1: used for the initial catalog and whenever a
    /// `ResetRequired` record is seen). Performs no remote I/O while holding
    /// the catalog lock (spec.md §5).
    pub async fn bootstrap(&self) -> CoreResult<()> {
        let mut store = TreeStore::new();
        let mut queue = vec![Key::root()];
        while let Some(folder_key) = queue.pop() {
            let (folders, files) = self.remote.folder_get_content(&folder_key).await?;
            for entry in folders {
                store.insert_folder(Folder {
                    key: entry.key.clone(),
                    name: entry.name,
                    parent: Some(folder_key.clone()),
                    revision: entry.revision,
                    children_folders: Vec::new(),
                    children_files: Vec::new(),
                    created: Timestamp::now(),
                    modified: Timestamp::now(),
                });
                queue.push(entry.key);
            }
            for entry in files {
                store.insert_file(File {
                    key: entry.key,
                    name: entry.name,
                    hash: entry.hash,
                    size: entry.size,
                    mtime: Timestamp::now(),
                    revision: entry.revision,
                    parent: folder_key.clone(),
                });
            }
        }
        let mut inner = self.inner.write().await;
        inner.store = store;
        inner.last_update = Some(Instant::now());
        Ok(())
    }

    /// Pull and apply the device's change journal. A `force` sync always
    /// hits the remote; a non-forced sync is debounced (spec.md §4.1, §4.5
    /// "getattr triggers a non-forced update").
    pub async fn update(&self, force: bool) -> CoreResult<()> {
        if !force {
            let inner = self.inner.read().await;
            if let Some(last) = inner.last_update {
                if last.elapsed() < UPDATE_DEBOUNCE {
                    return Ok(());
                }
            }
        }

        let since = self.inner.read().await.revision;
        let journal = self.remote.device_changes(since).await?;
        self.apply_journal(journal).await
    }

    async fn apply_journal(&self, journal: Journal) -> CoreResult<()> {
        let mut needs_reset = false;
        {
            let mut inner = self.inner.write().await;
            for record in journal.records {
                if matches!(record, ChangeRecord::ResetRequired) {
                    needs_reset = true;
                    continue;
                }
                apply_record(&mut inner, record);
            }
            if !needs_reset {
                inner.revision = journal.latest_revision;
            }
            inner.last_update = Some(Instant::now());
        }
        if needs_reset {
            debug!("journal reported a reset, refetching catalog wholesale");
            self.bootstrap().await?;
            let mut inner = self.inner.write().await;
            inner.revision = journal.latest_revision;
        }
        Ok(())
    }

    pub async fn getattr(&self, path: &str) -> CoreResult<Stat> {
        let inner = self.inner.read().await;
        let (uid, gid) = effective_ids();
        if let Some((key, kind)) = inner.store.resolve(path) {
            return match kind {
                EntryKind::Folder => {
                    let folder = inner
                        .store
                        .folder(&key)
                        .ok_or_else(|| CoreError::CorruptIo("folder vanished mid-resolve".into()))?;
                    Ok(Stat::for_folder(uid, gid, folder.modified))
                }
                EntryKind::File => {
                    let file = inner
                        .store
                        .file(&key)
                        .ok_or_else(|| CoreError::CorruptIo("file vanished mid-resolve".into()))?;
                    Ok(Stat::for_file(uid, gid, file.size, file.mtime))
                }
            };
        }
        // Not in the catalog yet: may be a LOCAL_NEW staged create, visible
        // only to its own handle as a synthetic zero-byte file (spec.md §4.5).
        if matches!(inner.census.writable_role(path), Some(Role::LocalNew)) {
            return Ok(Stat::synthetic_new_file(uid, gid));
        }
        Err(CoreError::NotFound)
    }

    pub async fn readdir(&self, path: &str) -> CoreResult<Vec<(String, EntryKind)>> {
        let inner = self.inner.read().await;
        let (key, kind) = inner.store.resolve(path).ok_or(CoreError::NotFound)?;
        if kind != EntryKind::Folder {
            return Err(CoreError::InvalidArg(format!("{path}: not a directory")));
        }
        let (folders, files) = inner
            .store
            .children(&key)
            .ok_or_else(|| CoreError::CorruptIo("directory vanished mid-resolve".into()))?;
        let mut entries = vec![(".".to_string(), EntryKind::Folder), ("..".to_string(), EntryKind::Folder)];
        for child in folders {
            if let Some(f) = inner.store.folder(child) {
                entries.push((f.name.clone(), EntryKind::Folder));
            }
        }
        for child in files {
            if let Some(f) = inner.store.file(child) {
                entries.push((f.name.clone(), EntryKind::File));
            }
        }
        Ok(entries)
    }

    /// Resolve a path to a folder key, used when a caller needs to address
    /// a directory by key rather than by path (spec.md §4.1).
    pub async fn path_get_key(&self, path: &str) -> CoreResult<Key> {
        let inner = self.inner.read().await;
        inner.store.resolve_folder(path).ok_or(CoreError::NotFound)
    }

    async fn resolve_parent(&self, parent_path: &str) -> CoreResult<Option<Key>> {
        if parent_path.is_empty() || parent_path == "/" {
            return Ok(None);
        }
        let inner = self.inner.read().await;
        Ok(Some(inner.store.resolve_folder(parent_path).ok_or(CoreError::NotFound)?))
    }

    /// Register the open (exclusion rules already enforced by the caller
    /// against the census) and hand back a seekable staged fd, downloading
    /// content on first open of a path (spec.md §4.2, §6.4).
    pub async fn open_file(&self, path: &str, may_refresh: bool) -> CoreResult<TokioFile> {
        let mut masters = self.masters.lock().await;
        if let Some(master) = masters.get(path) {
            return master.try_clone().await.map_err(|e| CoreError::CorruptIo(e.to_string()));
        }

        let staged = tempfile::tempfile_in(&self.staging_dir)
            .map_err(|e| CoreError::CorruptIo(format!("staging dir: {e}")))?;
        let mut staged = TokioFile::from_std(staged);

        if may_refresh {
            let key = {
                let inner = self.inner.read().await;
                match inner.store.resolve(path) {
                    Some((key, EntryKind::File)) => key,
                    _ => return Err(CoreError::NotFound),
                }
            };
            let info = self.remote.file_get_info(&key).await?;
            self.remote.download(&info.direct_link, &mut staged).await?;
            staged
                .seek(std::io::SeekFrom::Start(0))
                .await
                .map_err(|e| CoreError::CorruptIo(e.to_string()))?;
        }

        let clone = staged.try_clone().await.map_err(|e| CoreError::CorruptIo(e.to_string()))?;
        masters.insert(path.to_string(), staged);
        Ok(clone)
    }

    /// Allocate a fresh, unnamed staging file for a `create()` of a path
    /// that does not yet exist remotely. Not tracked in `masters`: a
    /// `LOCAL_NEW` handle is exclusive, so no second reader can ever race
    /// it (spec.md §4.2 invariant 3).
    pub async fn tmp_open(&self) -> CoreResult<TokioFile> {
        let staged = tempfile::tempfile_in(&self.staging_dir)
            .map_err(|e| CoreError::CorruptIo(format!("staging dir: {e}")))?;
        Ok(TokioFile::from_std(staged))
    }

    /// Upload the staged content of an existing file if it actually
    /// changed, eliding the call when the hash matches the cached remote
    /// hash (spec.md §4.3 "Patch elision").
    pub async fn upload_patch(&self, path: &str) -> CoreResult<()> {
        let key = {
            let inner = self.inner.read().await;
            match inner.store.resolve(path) {
                Some((key, EntryKind::File)) => key,
                _ => return Err(CoreError::NotFound),
            }
        };

        let mut masters = self.masters.lock().await;
        let staged = masters
            .get_mut(path)
            .ok_or_else(|| CoreError::CorruptIo(format!("{path}: no staged file at release")))?;
        let digest = hash_file(staged).await?;

        let cached_hash = {
            let inner = self.inner.read().await;
            inner.store.file(&key).map(|f| f.hash.clone())
        };
        if cached_hash.as_deref() == Some(digest.as_str()) {
            debug!(path, "staged content unchanged, eliding upload");
            return Ok(());
        }

        let upload_key = self.remote.upload_patch(&key, staged).await?;
        drop(masters);
        self.poll_upload(&upload_key).await
    }

    /// Upload a brand-new `LOCAL_NEW` file to its resolved parent folder.
    pub async fn finalize_local_new(&self, path: &str, staged: &mut TokioFile) -> CoreResult<()> {
        let (parent_path, name) = split_path(path)?;
        let parent_key = self.resolve_parent(&parent_path).await?;
        staged
            .seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| CoreError::CorruptIo(e.to_string()))?;
        let parent = parent_key.unwrap_or_else(Key::root);
        let upload_key = self.remote.upload_simple(&parent, staged, &name).await?;
        self.poll_upload(&upload_key).await
    }

    async fn poll_upload(&self, upload_key: &str) -> CoreResult<()> {
        loop {
            let (status, file_error) = self.remote.upload_poll(upload_key).await?;
            if status.is_success() {
                return Ok(());
            }
            if let Some(message) = file_error {
                return Err(CoreError::AccessDenied(format!("upload rejected: {message}")));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Single entry point for releasing a handle: finalizes any pending
    /// upload, decrements the census, reaps the path's staging master, and
    /// re-applies a deferred delete if this was the last handle on the path
    /// (spec.md §4.2 "Release semantics", SPEC_FULL.md §4 Open Question on
    /// deferred deletion). Census and staging resources are released
    /// unconditionally, even when the upload itself failed.
    pub async fn release(&self, path: &str, role: Role, mut staged: TokioFile) -> CoreResult<()> {
        let upload_result = match role {
            Role::Readonly => Ok(()),
            Role::WritableExisting => self.upload_patch(path).await,
            Role::LocalNew => self.finalize_local_new(path, &mut staged).await,
        };
        drop(staged);

        {
            let mut inner = self.inner.write().await;
            inner.census.release(path, role);
            if !inner.census.is_open(path) {
                if let Some((key, kind)) = inner.store.resolve(path) {
                    if inner.store.take_pending_delete(&key) {
                        match kind {
                            EntryKind::Folder => inner.store.remove_folder(&key),
                            EntryKind::File => inner.store.remove_file(&key),
                        }
                    } else if let Some(record) = inner.pending_updates.remove(&key) {
                        apply_record(&mut inner, record);
                    }
                }
            }
        }
        self.masters.lock().await.remove(path);

        if upload_result.is_ok() {
            // Best-effort: pick up our own change (and anyone else's)
            // promptly, but a failure here must not fail the release.
            if let Err(e) = self.update(true).await {
                warn!(error = %e, path, "post-release sync failed");
            }
        }
        upload_result
    }

    pub async fn mkdir(&self, path: &str) -> CoreResult<()> {
        let (parent_path, name) = split_path(path)?;
        let parent = self.resolve_parent(&parent_path).await?;
        self.remote.folder_create(parent.as_ref(), &name).await?;
        self.update(true).await
    }

    pub async fn rmdir(&self, path: &str) -> CoreResult<()> {
        let inner = self.inner.read().await;
        let key = inner.store.resolve_folder(path).ok_or(CoreError::NotFound)?;
        drop(inner);
        self.remote.folder_delete(&key).await?;
        self.update(true).await
    }

    pub async fn unlink(&self, path: &str) -> CoreResult<()> {
        let inner = self.inner.read().await;
        let key = match inner.store.resolve(path) {
            Some((key, EntryKind::File)) => key,
            Some((_, EntryKind::Folder)) => {
                return Err(CoreError::InvalidArg(format!("{path}: is a directory")))
            }
            None => return Err(CoreError::NotFound),
        };
        drop(inner);
        self.remote.file_delete(&key).await?;
        self.update(true).await
    }

    /// Register a readonly open against the census, enforcing exclusion
    /// against any outstanding writable handle (spec.md §4.2 rule 1/2).
    pub async fn try_open_readonly(&self, path: &str) -> CoreResult<()> {
        self.inner.write().await.census.try_open_readonly(path)
    }

    pub async fn try_open_writable(&self, path: &str, role: Role) -> CoreResult<()> {
        self.inner.write().await.census.try_open_writable(path, role)
    }

    /// Roll back a census registration when staging a file failed after
    /// `try_open_readonly`/`try_open_writable` already succeeded; no staged
    /// fd or pending-delete state exists yet, so a plain census release is
    /// enough (unlike the full `release` path).
    pub async fn release_census_only(&self, path: &str, role: Role) {
        self.inner.write().await.census.release(path, role);
    }
}

async fn hash_file(file: &mut TokioFile) -> CoreResult<String> {
    file.seek(std::io::SeekFrom::Start(0)).await.map_err(|e| CoreError::CorruptIo(e.to_string()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| CoreError::CorruptIo(e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    file.seek(std::io::SeekFrom::Start(0)).await.map_err(|e| CoreError::CorruptIo(e.to_string()))?;
    Ok(hex::encode(hasher.finalize()))
}

fn apply_record(inner: &mut Inner, record: ChangeRecord) {
    match record {
        ChangeRecord::ResetRequired => unreachable!("handled by the caller"),
        ChangeRecord::FolderDeleted { key } => {
            let held_open = inner.store.folder_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.store.mark_pending_delete(key);
            } else {
                inner.store.remove_folder(&key);
            }
        }
        ChangeRecord::FileDeleted { key } => {
            let held_open = inner.store.file_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.store.mark_pending_delete(key);
            } else {
                inner.store.remove_file(&key);
            }
        }
        ChangeRecord::FolderCreated { key, parent, name, revision } => {
            if inner.store.folder(&key).map(|f| f.revision).unwrap_or(0) < revision {
                inner.store.insert_folder(Folder {
                    key,
                    name,
                    parent: Some(parent),
                    revision,
                    children_folders: Vec::new(),
                    children_files: Vec::new(),
                    created: Timestamp::now(),
                    modified: Timestamp::now(),
                });
            }
        }
        ChangeRecord::FileCreated { key, parent, name, hash, size, revision } => {
            if inner.store.file(&key).map(|f| f.revision).unwrap_or(0) < revision {
                inner.store.insert_file(File {
                    key,
                    name,
                    hash,
                    size,
                    mtime: Timestamp::now(),
                    revision,
                    parent,
                });
            }
        }
        ChangeRecord::FileUpdated { key, hash, size, revision } => {
            let held_open = inner.store.file_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.pending_updates.insert(key.clone(), ChangeRecord::FileUpdated { key, hash, size, revision });
                return;
            }
            if let Some(file) = inner.store.file_mut(&key) {
                if file.revision < revision {
                    file.hash = hash;
                    file.size = size;
                    file.revision = revision;
                    file.mtime = Timestamp::now();
                }
            }
        }
        ChangeRecord::FolderRenamed { key, name, revision } => {
            let held_open = inner.store.folder_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.pending_updates.insert(key.clone(), ChangeRecord::FolderRenamed { key, name, revision });
                return;
            }
            if let Some(folder) = inner.store.folder_mut(&key) {
                if folder.revision < revision {
                    folder.name = name;
                    folder.revision = revision;
                }
            }
        }
        ChangeRecord::FileRenamed { key, name, revision } => {
            let held_open = inner.store.file_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.pending_updates.insert(key.clone(), ChangeRecord::FileRenamed { key, name, revision });
                return;
            }
            if let Some(file) = inner.store.file_mut(&key) {
                if file.revision < revision {
                    file.name = name;
                    file.revision = revision;
                }
            }
        }
        ChangeRecord::FolderMoved { key, new_parent, revision } => {
            let held_open = inner.store.folder_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.pending_updates.insert(key.clone(), ChangeRecord::FolderMoved { key, new_parent, revision });
                return;
            }
            if inner.store.folder(&key).map(|f| f.revision).unwrap_or(0) < revision {
                inner.store.reparent_folder(&key, new_parent);
                if let Some(folder) = inner.store.folder_mut(&key) {
                    folder.revision = revision;
                }
            }
        }
        ChangeRecord::FileMoved { key, new_parent, revision } => {
            let held_open = inner.store.file_path(&key).is_some_and(|p| inner.census.is_open(&p));
            if held_open {
                inner.pending_updates.insert(key.clone(), ChangeRecord::FileMoved { key, new_parent, revision });
                return;
            }
            if inner.store.file(&key).map(|f| f.revision).unwrap_or(0) < revision {
                inner.store.reparent_file(&key, new_parent);
                if let Some(file) = inner.store.file_mut(&key) {
                    file.revision = revision;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FileContentEntry, FileInfo, FolderContentEntry, UploadStatus};
    use async_trait::async_trait;
    use tokio::sync::Mutex as TokioMutex;

    struct StubRemote {
        content: HashMap<String, (Vec<FolderContentEntry>, Vec<FileContentEntry>)>,
        poll_status: TokioMutex<u32>,
    }

    #[async_trait]
    impl RemoteClient for StubRemote {
        async fn folder_create(&self, _parent: Option<&Key>, _name: &str) -> CoreResult<Key> {
            Key::parse("aaaaaaaaaaa")
        }
        async fn folder_delete(&self, _key: &Key) -> CoreResult<()> {
            Ok(())
        }
        async fn file_delete(&self, _key: &Key) -> CoreResult<()> {
            Ok(())
        }
        async fn device_changes(&self, since: u64) -> CoreResult<Journal> {
            Ok(Journal { records: Vec::new(), latest_revision: since })
        }
        async fn folder_get_content(
            &self,
            key: &Key,
        ) -> CoreResult<(Vec<FolderContentEntry>, Vec<FileContentEntry>)> {
            Ok(self.content.get(&key.0).cloned().unwrap_or_default())
        }
        async fn file_get_info(&self, _key: &Key) -> CoreResult<FileInfo> {
            Ok(FileInfo { hash: "x".repeat(32), size: 0, revision: 1, direct_link: String::new() })
        }
        async fn download(&self, _url: &str, _dest: &mut TokioFile) -> CoreResult<()> {
            Ok(())
        }
        async fn upload_simple(
            &self,
            _parent: &Key,
            _src: &mut TokioFile,
            _name: &str,
        ) -> CoreResult<String> {
            Ok("up-1".to_string())
        }
        async fn upload_patch(&self, _existing: &Key, _src: &mut TokioFile) -> CoreResult<String> {
            Ok("up-1".to_string())
        }
        async fn upload_poll(&self, _upload_key: &str) -> CoreResult<(UploadStatus, Option<String>)> {
            let status = *self.poll_status.lock().await;
            Ok((UploadStatus(status), None))
        }
        async fn account_id(&self) -> CoreResult<String> {
            Ok("acct".to_string())
        }
    }

    fn tree_with(remote: StubRemote, staging: &Path) -> FolderTree {
        FolderTree::new(Arc::new(remote), staging.to_path_buf(), "acct".to_string())
    }

    #[tokio::test]
    async fn bootstrap_populates_root_listing() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = HashMap::new();
        content.insert(
            Key::ROOT.to_string(),
            (
                vec![],
                vec![FileContentEntry {
                    key: Key("abcdefghijk".into()),
                    name: "readme.txt".into(),
                    hash: "h".repeat(32),
                    size: 10,
                    revision: 1,
                }],
            ),
        );
        let remote = StubRemote { content, poll_status: TokioMutex::new(99) };
        let tree = tree_with(remote, dir.path());
        tree.bootstrap().await.unwrap();

        let entries = tree.readdir("/").await.unwrap();
        assert!(entries.iter().any(|(name, kind)| name == "readme.txt" && *kind == EntryKind::File));
    }

    #[tokio::test]
    async fn getattr_reports_synthetic_local_new() {
        let dir = tempfile::tempdir().unwrap();
        let remote = StubRemote { content: HashMap::new(), poll_status: TokioMutex::new(99) };
        let tree = tree_with(remote, dir.path());
        tree.try_open_writable("/new.txt", Role::LocalNew).await.unwrap();

        let stat = tree.getattr("/new.txt").await.unwrap();
        assert_eq!(stat.size, 0);
        assert!(!stat.is_dir);
    }

    #[tokio::test]
    async fn getattr_on_unknown_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let remote = StubRemote { content: HashMap::new(), poll_status: TokioMutex::new(99) };
        let tree = tree_with(remote, dir.path());
        assert_eq!(tree.getattr("/nope").await.unwrap_err(), CoreError::NotFound);
    }
}
