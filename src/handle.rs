//! Open-handle manager (spec.md §4.2): per-path exclusion rules and the
//! staged-file lifecycle of a single open/create.

use std::collections::HashMap;

use tokio::fs::File as TokioFile;

use crate::error::{fatal_invariant, CoreError, CoreResult};

/// Role of an open handle, determining release behaviour (spec.md §3
/// "StagingEntry", §4.2 "Release semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Readonly,
    WritableExisting,
    LocalNew,
}

/// A single open handle: staged fd, originating path, and role. Owned
/// exclusively by whichever caller holds the opaque token returned from
/// `open`/`create` (spec.md §9 "Ownership of staged files": single-owner
/// transfer, not reference counting).
pub struct OpenHandle {
    pub path: String,
    pub role: Role,
    pub staged: TokioFile,
}

/// Opaque token identifying one live `OpenHandle`, handed to the host on
/// `open`/`create` and surrendered on `release`.
pub type HandleId = u64;

/// Tracks, for every path, how many readonly handles and how many writable
/// handles are currently open (spec.md §3 "OpenCensus"). The ordered
/// per-path multiset described in spec.md §9 ("`stringv_mem` ... a
/// hash-multiset is the modern equivalent") collapses here to a plain
/// count, since only the count, not individual membership, is ever
/// queried by the exclusion rules.
#[derive(Debug, Default)]
pub struct OpenCensus {
    readonly_open: HashMap<String, u32>,
    /// At most one entry per path (spec.md §3 invariant); the value records
    /// the role so `getattr` can detect a `LOCAL_NEW` staged create without
    /// a second lookup.
    writable_open: HashMap<String, Role>,
}

impl OpenCensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readonly_count(&self, path: &str) -> u32 {
        self.readonly_open.get(path).copied().unwrap_or(0)
    }

    pub fn writable_role(&self, path: &str) -> Option<Role> {
        self.writable_open.get(path).copied()
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.readonly_count(path) > 0 || self.writable_open.contains_key(path)
    }

    /// Attempt to register a readonly open. Always succeeds per spec.md
    /// §4.2 rule 1 (a file may be opened read-only any number of times),
    /// *unless* a writable handle is already outstanding (rule 2 is
    /// symmetric: a writable handle excludes new opens of any mode).
    pub fn try_open_readonly(&mut self, path: &str) -> CoreResult<()> {
        if self.writable_open.contains_key(path) {
            return Err(CoreError::AccessDenied(format!(
                "{path}: writable handle already open"
            )));
        }
        *self.readonly_open.entry(path.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Attempt to register a writable open. Succeeds only if no handle, of
    /// any mode, is currently open on the path (spec.md §4.2 rule 2).
    pub fn try_open_writable(&mut self, path: &str, role: Role) -> CoreResult<()> {
        debug_assert!(matches!(role, Role::WritableExisting | Role::LocalNew));
        if self.is_open(path) {
            return Err(CoreError::AccessDenied(format!("{path}: already open")));
        }
        self.writable_open.insert(path.to_string(), role);
        Ok(())
    }

    /// Release one handle of the given role. The multiset is decremented
    /// unconditionally; even on a release-time error the path must not be
    /// left permanently locked (spec.md §4.2 "Release semantics").
    pub fn release(&mut self, path: &str, role: Role) {
        match role {
            Role::Readonly => {
                let Some(count) = self.readonly_open.get_mut(path) else {
                    fatal_invariant("readonly release with no matching open");
                };
                *count -= 1;
                if *count == 0 {
                    self.readonly_open.remove(path);
                }
            }
            Role::WritableExisting | Role::LocalNew => {
                if self.writable_open.remove(path).is_none() {
                    fatal_invariant("writable release with no matching open");
                }
            }
        }
    }
}

/// Maps the opaque `HandleId` the host sees to the `OpenHandle` it
/// addresses. Owned by the adapter, not the catalog lock: the table itself
/// has no exclusion semantics of its own (spec.md §9 "single-owner
/// transfer").
#[derive(Default)]
pub struct HandleTable {
    next_id: HandleId,
    open: HashMap<HandleId, OpenHandle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self { next_id: 1, open: HashMap::new() }
    }

    pub fn insert(&mut self, handle: OpenHandle) -> HandleId {
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(id, handle);
        id
    }

    pub fn get(&self, id: HandleId) -> Option<&OpenHandle> {
        self.open.get(&id)
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut OpenHandle> {
        self.open.get_mut(&id)
    }

    /// Remove and return the handle for `release`. A missing id is a fatal
    /// protocol violation by the host (spec.md §7).
    pub fn take(&mut self, id: HandleId) -> OpenHandle {
        self.open.remove(&id).unwrap_or_else(|| fatal_invariant("release of unknown handle id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_readonly_allowed() {
        let mut census = OpenCensus::new();
        census.try_open_readonly("/f").unwrap();
        census.try_open_readonly("/f").unwrap();
        assert_eq!(census.readonly_count("/f"), 2);
    }

    #[test]
    fn writable_excludes_further_opens() {
        let mut census = OpenCensus::new();
        census.try_open_writable("/f", Role::WritableExisting).unwrap();
        assert!(census.try_open_readonly("/f").is_err());
        assert!(census.try_open_writable("/f", Role::WritableExisting).is_err());
    }

    #[test]
    fn readonly_excludes_writable() {
        let mut census = OpenCensus::new();
        census.try_open_readonly("/f").unwrap();
        assert!(census.try_open_writable("/f", Role::WritableExisting).is_err());
    }

    #[test]
    fn release_reopens_path() {
        let mut census = OpenCensus::new();
        census.try_open_writable("/f", Role::WritableExisting).unwrap();
        census.release("/f", Role::WritableExisting);
        assert!(census.try_open_readonly("/f").is_ok());
    }

    #[test]
    fn writable_role_recorded_for_local_new() {
        let mut census = OpenCensus::new();
        census.try_open_writable("/g", Role::LocalNew).unwrap();
        assert_eq!(census.writable_role("/g"), Some(Role::LocalNew));
    }
}
