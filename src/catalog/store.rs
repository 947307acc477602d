//! `TreeStore`: the in-memory catalog of folders and files, keyed by
//! remote ID (spec.md §3, design note "Catalog cycles": "represent it as a
//! flat table keyed by folder-key with parent-key and child-key lists, not
//! as a pointer graph").

use std::collections::{HashMap, HashSet};

use crate::model::{EntryKind, File, Folder, Key};

/// Flat, serializable catalog of all known folders and files.
#[derive(Debug, Default)]
pub struct TreeStore {
    folders: HashMap<Key, Folder>,
    files: HashMap<Key, File>,
    /// Deletion records deferred because the path was held open when the
    /// journal reported it (spec.md §9 Open Questions).
    pending_deletes: HashSet<Key>,
}

impl TreeStore {
    pub fn new() -> Self {
        let mut folders = HashMap::new();
        folders.insert(Key::root(), Folder::root());
        Self { folders, files: HashMap::new(), pending_deletes: HashSet::new() }
    }

    pub fn from_parts(folders: Vec<Folder>, files: Vec<File>) -> Self {
        let mut store = Self {
            folders: folders.into_iter().map(|f| (f.key.clone(), f)).collect(),
            files: files.into_iter().map(|f| (f.key.clone(), f)).collect(),
            pending_deletes: HashSet::new(),
        };
        store.folders.entry(Key::root()).or_insert_with(Folder::root);
        store
    }

    pub fn into_parts(self) -> (Vec<Folder>, Vec<File>) {
        (self.folders.into_values().collect(), self.files.into_values().collect())
    }

    pub fn folder(&self, key: &Key) -> Option<&Folder> {
        self.folders.get(key)
    }

    pub fn folder_mut(&mut self, key: &Key) -> Option<&mut Folder> {
        self.folders.get_mut(key)
    }

    pub fn file(&self, key: &Key) -> Option<&File> {
        self.files.get(key)
    }

    pub fn file_mut(&mut self, key: &Key) -> Option<&mut File> {
        self.files.get_mut(key)
    }

    /// Resolve a single path component within `parent`, returning the
    /// child's key and kind.
    pub fn lookup_child(&self, parent: &Key, name: &str) -> Option<(Key, EntryKind)> {
        let folder = self.folders.get(parent)?;
        for child_key in &folder.children_folders {
            if self.folders.get(child_key).map(|f| f.name.as_str()) == Some(name) {
                return Some((child_key.clone(), EntryKind::Folder));
            }
        }
        for child_key in &folder.children_files {
            if self.files.get(child_key).map(|f| f.name.as_str()) == Some(name) {
                return Some((child_key.clone(), EntryKind::File));
            }
        }
        None
    }

    /// Resolve an absolute, slash-separated path (spec.md §3 "Path
    /// resolution"). Returns `None` for "not found", distinct from any
    /// I/O error the caller may separately surface.
    pub fn resolve(&self, path: &str) -> Option<(Key, EntryKind)> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some((Key::root(), EntryKind::Folder));
        }
        let mut current = Key::root();
        let components: Vec<&str> = trimmed.split('/').collect();
        for (i, name) in components.iter().enumerate() {
            let (key, kind) = self.lookup_child(&current, name)?;
            let is_last = i + 1 == components.len();
            if is_last {
                return Some((key, kind));
            }
            match kind {
                EntryKind::Folder => current = key,
                EntryKind::File => return None,
            }
        }
        None
    }

    /// Resolve only folder paths (used by `path_get_key`).
    pub fn resolve_folder(&self, path: &str) -> Option<Key> {
        match self.resolve(path)? {
            (key, EntryKind::Folder) => Some(key),
            _ => None,
        }
    }

    /// Reconstruct the absolute path of a folder by walking its parent
    /// chain. Used when journal replay must check whether an entity's
    /// current path is held open (spec.md §4.1).
    pub fn folder_path(&self, key: &Key) -> Option<String> {
        if key.is_root() {
            return Some("/".to_string());
        }
        let mut components = Vec::new();
        let mut current = self.folders.get(key)?;
        loop {
            components.push(current.name.clone());
            match &current.parent {
                Some(parent_key) if !parent_key.is_root() => {
                    current = self.folders.get(parent_key)?;
                }
                _ => break,
            }
        }
        components.reverse();
        Some(format!("/{}", components.join("/")))
    }

    /// Reconstruct the absolute path of a file.
    pub fn file_path(&self, key: &Key) -> Option<String> {
        let file = self.files.get(key)?;
        let parent_path = self.folder_path(&file.parent)?;
        if parent_path == "/" {
            Some(format!("/{}", file.name))
        } else {
            Some(format!("{parent_path}/{}", file.name))
        }
    }

    pub fn children(&self, folder: &Key) -> Option<(&[Key], &[Key])> {
        self.folders.get(folder).map(|f| (f.children_folders.as_slice(), f.children_files.as_slice()))
    }

    pub fn insert_folder(&mut self, folder: Folder) {
        if let Some(parent) = folder.parent.clone() {
            if let Some(p) = self.folders.get_mut(&parent) {
                if !p.children_folders.contains(&folder.key) {
                    p.children_folders.push(folder.key.clone());
                }
            }
        }
        self.folders.insert(folder.key.clone(), folder);
    }

    pub fn insert_file(&mut self, file: File) {
        if let Some(p) = self.folders.get_mut(&file.parent) {
            if !p.children_files.contains(&file.key) {
                p.children_files.push(file.key.clone());
            }
        }
        self.files.insert(file.key.clone(), file);
    }

    pub fn remove_folder(&mut self, key: &Key) {
        if let Some(folder) = self.folders.remove(key) {
            if let Some(parent) = folder.parent {
                if let Some(p) = self.folders.get_mut(&parent) {
                    p.children_folders.retain(|k| k != key);
                }
            }
        }
    }

    pub fn remove_file(&mut self, key: &Key) {
        if let Some(file) = self.files.remove(key) {
            if let Some(p) = self.folders.get_mut(&file.parent) {
                p.children_files.retain(|k| k != key);
            }
        }
    }

    /// Detach a folder from its current parent and attach it under
    /// `new_parent`, preserving its children and name (journal replay of a
    /// move record).
    pub fn reparent_folder(&mut self, key: &Key, new_parent: Key) {
        if let Some(folder) = self.folders.get(key) {
            if let Some(old_parent) = folder.parent.clone() {
                if let Some(p) = self.folders.get_mut(&old_parent) {
                    p.children_folders.retain(|k| k != key);
                }
            }
        }
        if let Some(p) = self.folders.get_mut(&new_parent) {
            if !p.children_folders.contains(key) {
                p.children_folders.push(key.clone());
            }
        }
        if let Some(folder) = self.folders.get_mut(key) {
            folder.parent = Some(new_parent);
        }
    }

    /// Detach a file from its current parent and attach it under
    /// `new_parent` (journal replay of a move record).
    pub fn reparent_file(&mut self, key: &Key, new_parent: Key) {
        if let Some(file) = self.files.get(key) {
            let old_parent = file.parent.clone();
            if let Some(p) = self.folders.get_mut(&old_parent) {
                p.children_files.retain(|k| k != key);
            }
        }
        if let Some(p) = self.folders.get_mut(&new_parent) {
            if !p.children_files.contains(key) {
                p.children_files.push(key.clone());
            }
        }
        if let Some(file) = self.files.get_mut(key) {
            file.parent = new_parent;
        }
    }

    /// Clone out the full set of records, for persistence (spec.md §6.3).
    pub fn snapshot(&self) -> (Vec<Folder>, Vec<File>) {
        (self.folders.values().cloned().collect(), self.files.values().cloned().collect())
    }

    pub fn mark_pending_delete(&mut self, key: Key) {
        self.pending_deletes.insert(key);
    }

    pub fn take_pending_delete(&mut self, key: &Key) -> bool {
        self.pending_deletes.remove(key)
    }

    pub fn is_pending_delete(&self, key: &Key) -> bool {
        self.pending_deletes.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn folder(key: &str, parent: &str, name: &str) -> Folder {
        Folder {
            key: Key(key.into()),
            name: name.into(),
            parent: Some(Key(parent.into())),
            revision: 1,
            children_folders: Vec::new(),
            children_files: Vec::new(),
            created: Timestamp::EPOCH,
            modified: Timestamp::EPOCH,
        }
    }

    #[test]
    fn resolves_nested_path() {
        let mut store = TreeStore::new();
        store.insert_folder(folder("aaaaaaaaaaa", "root", "a"));
        store.insert_folder(Folder {
            key: Key("bbbbbbbbbbb".into()),
            name: "b".into(),
            parent: Some(Key("aaaaaaaaaaa".into())),
            revision: 1,
            children_folders: Vec::new(),
            children_files: Vec::new(),
            created: Timestamp::EPOCH,
            modified: Timestamp::EPOCH,
        });

        let resolved = store.resolve("/a/b");
        assert_eq!(resolved, Some((Key("bbbbbbbbbbb".into()), EntryKind::Folder)));
    }

    #[test]
    fn missing_path_is_none() {
        let store = TreeStore::new();
        assert_eq!(store.resolve("/nope"), None);
    }
}
