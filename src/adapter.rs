//! `VfsAdapter` bridges `fuser`'s synchronous kernel callbacks into the
//! async `FolderTree`/`OpenHandle` core via `tokio::runtime::Handle::block_on`
//! (grounded in the `fuser` + `reqwest` + `tokio::runtime::Runtime` pattern
//! used by comparable remote-filesystem clients in this corpus).
//!
//! `fuser` addresses everything by inode; the core addresses everything by
//! absolute path (spec.md §6.1's abstract surface). `VfsAdapter` owns the
//! inode<->path table that reconciles the two; `FolderTree` never sees an
//! inode.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{error, warn};

use crate::catalog::FolderTree;
use crate::handle::{HandleTable, OpenHandle, Role};
use crate::model::{split_path, EntryKind, Stat};

/// Kernel attribute-cache TTL. Kept short since the remote's authoritative
/// state changes out-of-band and `getattr` is our only opportunistic sync
/// point (spec.md §4.5).
const ATTR_TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

struct InodeTable {
    next_ino: u64,
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
}

impl InodeTable {
    fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert("/".to_string(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, "/".to_string());
        Self { next_ino: ROOT_INO + 1, path_to_ino, ino_to_path }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.ino_to_path.get(&ino).cloned()
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.path_to_ino.insert(path.to_string(), ino);
        self.ino_to_path.insert(ino, path.to_string());
        ino
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn to_file_attr(ino: u64, stat: &Stat) -> FileAttr {
    let time = UNIX_EPOCH + Duration::from_secs(stat.mtime.0.max(0) as u64);
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: time,
        mtime: time,
        ctime: time,
        crtime: time,
        kind: if stat.is_dir { FileType::Directory } else { FileType::RegularFile },
        perm: (stat.mode & 0o777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

pub struct VfsAdapter {
    tree: Arc<FolderTree>,
    runtime: tokio::runtime::Handle,
    handles: Mutex<HandleTable>,
    inodes: Mutex<InodeTable>,
    cache_path: PathBuf,
}

impl VfsAdapter {
    pub fn new(tree: Arc<FolderTree>, runtime: tokio::runtime::Handle, cache_path: PathBuf) -> Self {
        Self {
            tree,
            runtime,
            handles: Mutex::new(HandleTable::new()),
            inodes: Mutex::new(InodeTable::new()),
            cache_path,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.lock().unwrap().path_of(ino)
    }

    fn entry_ino(&self, path: &str) -> u64 {
        self.inodes.lock().unwrap().ino_for(path)
    }
}

fn os_str_to_name(name: &OsStr) -> Option<&str> {
    name.to_str()
}

impl Filesystem for VfsAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = os_str_to_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = join_path(&parent_path, name);
        match self.runtime.block_on(self.tree.getattr(&path)) {
            Ok(stat) => {
                let ino = self.entry_ino(&path);
                reply.entry(&ATTR_TTL, &to_file_attr(ino, &stat), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self.runtime.block_on(async {
            // getattr is the only opportunistic sync point (spec.md §4.5).
            if let Err(e) = self.tree.update(false).await {
                warn!(error = %e, "opportunistic sync failed");
            }
            self.tree.getattr(&path).await
        });
        match result {
            Ok(stat) => reply.attr(&ATTR_TTL, &to_file_attr(ino, &stat)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let parent_path = split_path(&path).map(|(p, _)| p).unwrap_or_else(|_| "/".to_string());
        let entries = match self.runtime.block_on(self.tree.readdir(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        for (i, (name, kind)) in entries.into_iter().enumerate().skip(offset as usize) {
            let child_path = match name.as_str() {
                "." => path.clone(),
                ".." => parent_path.clone(),
                _ => join_path(&path, &name),
            };
            let child_ino = self.entry_ino(&child_path);
            let file_type = match kind {
                EntryKind::Folder => FileType::Directory,
                EntryKind::File => FileType::RegularFile,
            };
            if reply.add(child_ino, (i + 1) as i64, file_type, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = os_str_to_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = join_path(&parent_path, name);
        let result = self.runtime.block_on(async {
            self.tree.mkdir(&path).await?;
            self.tree.getattr(&path).await
        });
        match result {
            Ok(stat) => {
                let ino = self.entry_ino(&path);
                reply.entry(&ATTR_TTL, &to_file_attr(ino, &stat), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = os_str_to_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = join_path(&parent_path, name);
        match self.runtime.block_on(self.tree.rmdir(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = os_str_to_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = join_path(&parent_path, name);
        match self.runtime.block_on(self.tree.unlink(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let role = if flags & libc::O_ACCMODE == libc::O_RDONLY {
            Role::Readonly
        } else {
            Role::WritableExisting
        };
        let tree = &self.tree;
        let result = self.runtime.block_on(async {
            match role {
                Role::Readonly => tree.try_open_readonly(&path).await?,
                _ => tree.try_open_writable(&path, role).await?,
            }
            match tree.open_file(&path, true).await {
                Ok(staged) => Ok(staged),
                Err(e) => {
                    tree.release_census_only(&path, role).await;
                    Err(e)
                }
            }
        });
        match result {
            Ok(staged) => {
                let id = self.handles.lock().unwrap().insert(OpenHandle {
                    path,
                    role,
                    staged,
                });
                reply.opened(id, 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = os_str_to_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = join_path(&parent_path, name);
        let tree = &self.tree;
        let result = self.runtime.block_on(async {
            tree.try_open_writable(&path, Role::LocalNew).await?;
            match tree.tmp_open().await {
                Ok(staged) => Ok(staged),
                Err(e) => {
                    tree.release_census_only(&path, Role::LocalNew).await;
                    Err(e)
                }
            }
        });
        match result {
            Ok(staged) => {
                let stat = self
                    .runtime
                    .block_on(self.tree.getattr(&path))
                    .unwrap_or_else(|_| Stat::synthetic_new_file(stat_uid(), stat_gid()));
                let ino = self.entry_ino(&path);
                let id = self.handles.lock().unwrap().insert(OpenHandle {
                    path,
                    role: Role::LocalNew,
                    staged,
                });
                reply.created(&ATTR_TTL, &to_file_attr(ino, &stat), 0, id, 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut handles = self.handles.lock().unwrap();
        let Some(handle) = handles.get_mut(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let result = self.runtime.block_on(async {
            handle.staged.seek(std::io::SeekFrom::Start(offset as u64)).await?;
            handle.staged.read(&mut buf).await
        });
        match result {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => {
                error!(error = %e, "staged read failed");
                reply.error(libc::EIO);
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut handles = self.handles.lock().unwrap();
        let Some(handle) = handles.get_mut(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let result = self.runtime.block_on(async {
            handle.staged.seek(std::io::SeekFrom::Start(offset as u64)).await?;
            handle.staged.write_all(data).await
        });
        match result {
            Ok(()) => reply.written(data.len() as u32),
            Err(e) => {
                error!(error = %e, "staged write failed");
                reply.error(libc::EIO);
            }
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok()
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let handle = self.handles.lock().unwrap().take(fh);
        let path = handle.path.clone();
        match self.runtime.block_on(self.tree.release(&handle.path, handle.role, handle.staged)) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!(error = %e, path, "release-time upload failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn destroy(&mut self) {
        if let Err(e) = self.runtime.block_on(self.tree.store_to(&self.cache_path)) {
            error!(error = %e, "failed to persist catalog on unmount");
        }
    }
}

fn stat_uid() -> u32 {
    unsafe { libc::getuid() }
}

fn stat_gid() -> u32 {
    unsafe { libc::getgid() }
}
