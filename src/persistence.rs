//! Directory-cache file format (spec.md §6.3, SPEC_FULL.md §6.3).
//!
//! Layout: magic `CMNT`, a u16 format version, the account id (length-
//! prefixed), the device revision the snapshot was taken at, then a
//! bincode-encoded `(Vec<Folder>, Vec<File>)`. A mismatch on magic, version
//! or account id means the cache cannot be trusted and the caller should
//! fall back to a full bootstrap rather than load it.

use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::model::{File, Folder};

const MAGIC: &[u8; 4] = b"CMNT";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug)]
pub struct Snapshot {
    pub account_id: String,
    pub revision: u64,
    pub folders: Vec<Folder>,
    pub files: Vec<File>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("cache format not recognized")]
    BadMagic,
    #[error("cache format version {0} unsupported")]
    UnsupportedVersion(u16),
}

pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let account_bytes = snapshot.account_id.as_bytes();
    buf.extend_from_slice(&(account_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(account_bytes);
    buf.extend_from_slice(&snapshot.revision.to_le_bytes());
    bincode::serialize_into(&mut buf, &(&snapshot.folders, &snapshot.files))?;

    let tmp_path = path.with_extension("tmp");
    let mut tmp = fs::File::create(&tmp_path).await?;
    tmp.write_all(&buf).await?;
    tmp.sync_all().await?;
    drop(tmp);
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Load a snapshot and check it against the currently authenticated
/// account. Returns `Ok(None)` (not an error) when the file is absent;
/// the caller bootstraps from scratch in that case.
pub async fn load(
    path: &Path,
    expected_account_id: &str,
) -> Result<Option<Snapshot>, PersistenceError> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let too_short = || PersistenceError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated cache file"));

    let magic = bytes.get(0..4).ok_or_else(too_short)?;
    if magic != MAGIC {
        return Err(PersistenceError::BadMagic);
    }
    let version = u16::from_le_bytes(bytes.get(4..6).ok_or_else(too_short)?.try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }
    let account_len =
        u32::from_le_bytes(bytes.get(6..10).ok_or_else(too_short)?.try_into().unwrap()) as usize;
    let mut offset = 10;
    let account_bytes = bytes.get(offset..offset + account_len).ok_or_else(too_short)?;
    let account_id = String::from_utf8(account_bytes.to_vec())
        .map_err(|e| PersistenceError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    offset += account_len;

    let revision = u64::from_le_bytes(bytes.get(offset..offset + 8).ok_or_else(too_short)?.try_into().unwrap());
    offset += 8;

    let (folders, files): (Vec<Folder>, Vec<File>) = bincode::deserialize(&bytes[offset..])?;

    if account_id != expected_account_id {
        tracing::warn!(
            cached = %account_id,
            current = %expected_account_id,
            "persisted catalog belongs to a different account, discarding"
        );
        return Ok(None);
    }

    Ok(Some(Snapshot { account_id, revision, folders, files }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Key;

    #[tokio::test]
    async fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.bin");
        let snapshot = Snapshot {
            account_id: "acct-1".to_string(),
            revision: 42,
            folders: vec![Folder::root()],
            files: vec![File {
                key: Key("abcdefghijk".into()),
                name: "f.txt".into(),
                hash: "deadbeef".repeat(8),
                size: 128,
                mtime: crate::model::Timestamp::EPOCH,
                revision: 1,
                parent: Key::root(),
            }],
        };
        save(&path, &snapshot).await.unwrap();
        let loaded = load(&path, "acct-1").await.unwrap().expect("present");
        assert_eq!(loaded.revision, 42);
        assert_eq!(loaded.files.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_account_falls_back_to_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.bin");
        let snapshot = Snapshot {
            account_id: "acct-1".to_string(),
            revision: 1,
            folders: vec![Folder::root()],
            files: vec![],
        };
        save(&path, &snapshot).await.unwrap();
        let loaded = load(&path, "acct-2").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.bin");
        let loaded = load(&path, "acct-1").await.unwrap();
        assert!(loaded.is_none());
    }
}
