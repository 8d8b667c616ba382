//! Path identity and tombstone registry.
//!
//! Every handle constructed for a canonical path holds the same [`EntryId`].
//! The entry stores the path's *current* location and an optional deletion
//! [`Witness`]. Renames update the entry in place, so every handle sharing it
//! observes the new location without re-registration.
//!
//! ## Invariants
//!
//! - At most one indexed entry per canonical path; `resolve` is idempotent
//! - Entries are never freed before [`Registry::clear`]; detached entries keep
//!   their tombstone so stale handles keep failing
//! - An entry displaced by a relocation forwards to the entry that took its
//!   place, unless it carries a tombstone
//!
//! All operations are in-memory bookkeeping and cannot fail.

use crate::path;
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable key of an identity/tombstone record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// Diagnostic token recorded when a path is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    serial: u64,
    at: SystemTime,
    op: &'static str,
    location: &'static Location<'static>,
}

impl Witness {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn at(&self) -> SystemTime {
        self.at
    }

    /// Operation that produced the tombstone (`delete`, `commit`, `rollback`).
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// Call site of the public operation that deleted the path.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        write!(
            f,
            "deleted by {} at {} [#{} @{}]",
            self.op, self.location, self.serial, secs
        )
    }
}

#[derive(Debug)]
struct Entry {
    path: String,
    tombstone: Option<Witness>,
    forward: Option<EntryId>,
}

/// Arena of identity/tombstone records addressed by [`EntryId`].
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: HashMap<String, EntryId>,
    next_serial: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry registered for `path`, creating a live one if needed.
    pub fn resolve(&mut self, path: &str) -> EntryId {
        if let Some(&id) = self.index.get(path) {
            return id;
        }

        let id = EntryId(self.entries.len());
        self.entries.push(Entry {
            path: path.to_string(),
            tombstone: None,
            forward: None,
        });
        self.index.insert(path.to_string(), id);
        log::debug!("Registered identity for {}", path);
        id
    }

    /// Returns the entry currently indexed under `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<EntryId> {
        self.index.get(path).copied()
    }

    /// Follows forwarding links to the entry that currently represents `id`.
    fn find(&self, mut id: EntryId) -> EntryId {
        while let Some(next) = self.entries[id.0].forward {
            id = next;
        }
        id
    }

    fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[self.find(id).0]
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        let id = self.find(id);
        &mut self.entries[id.0]
    }

    /// Current path of the identity (or [`path::DELETED`]).
    pub fn path(&self, id: EntryId) -> &str {
        &self.entry(id).path
    }

    pub fn tombstone(&self, id: EntryId) -> Option<&Witness> {
        self.entry(id).tombstone.as_ref()
    }

    /// Returns `true` if two ids refer to the same identity.
    pub fn same(&self, a: EntryId, b: EntryId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Creates a witness for a deletion performed at `location`.
    pub fn witness(&mut self, op: &'static str, location: &'static Location<'static>) -> Witness {
        self.next_serial += 1;
        Witness {
            serial: self.next_serial,
            at: SystemTime::now(),
            op,
            location,
        }
    }

    /// Moves the entry registered under `old_path` to `new_path`.
    pub fn relocate(&mut self, old_path: &str, new_path: &str) {
        if old_path == new_path {
            return;
        }
        if let Some(id) = self.index.remove(old_path) {
            self.place(id, new_path.to_string());
        }
    }

    /// Relocates `old_prefix` and every registered path below it in one pass.
    pub fn relocate_subtree(&mut self, old_prefix: &str, new_prefix: &str) {
        if old_prefix == new_prefix {
            return;
        }

        let moved: Vec<(EntryId, String)> = self
            .index
            .iter()
            .filter_map(|(key, &id)| {
                path::rebase(key, old_prefix, new_prefix).map(|target| (id, target))
            })
            .collect();

        for (id, _) in &moved {
            let key = self.entries[id.0].path.clone();
            self.index.remove(&key);
        }
        for (id, target) in moved {
            self.place(id, target);
        }
    }

    /// Indexes `id` under `target`, displacing whatever was there.
    fn place(&mut self, id: EntryId, target: String) {
        if let Some(displaced) = self.index.insert(target.clone(), id) {
            if displaced != id && self.entries[displaced.0].tombstone.is_none() {
                log::debug!("Merging displaced identity at {}", target);
                self.entries[displaced.0].forward = Some(id);
            }
        }
        log::debug!("Relocated {} → {}", self.entries[id.0].path, target);
        self.entries[id.0].path = target;
    }

    /// Tombstones `path` and, for directories, every registered descendant.
    ///
    /// Missing entries are created on demand. Returns the ids that were live
    /// before the call.
    pub fn mark_deleted(&mut self, path: &str, witness: &Witness) -> Vec<EntryId> {
        self.resolve(path);

        let mut marked = Vec::new();
        for id in self.covered(path) {
            let entry = &mut self.entries[id.0];
            if entry.tombstone.is_none() {
                entry.tombstone = Some(witness.clone());
                marked.push(id);
            }
        }
        marked
    }

    /// Tombstone of the nearest indexed ancestor directory of `path`, if any.
    pub fn tombstoned_ancestor(&self, path: &str) -> Option<&Witness> {
        let mut current = path::parent(path);
        while let Some(dir) = current {
            if let Some(&id) = self.index.get(dir) {
                if let Some(witness) = self.entry(id).tombstone.as_ref() {
                    return Some(witness);
                }
            }
            current = path::parent(dir);
        }
        None
    }

    /// Live registered entries strictly below directory `path`.
    pub fn live_descendants(&self, path: &str) -> Vec<EntryId> {
        if !path::is_dir(path) {
            return Vec::new();
        }
        self.covered(path)
            .into_iter()
            .filter(|id| {
                let entry = &self.entries[id.0];
                entry.path != path && entry.tombstone.is_none()
            })
            .collect()
    }

    /// Indexed ids at `path` and (for directories) below it.
    fn covered(&self, path: &str) -> Vec<EntryId> {
        if path::is_dir(path) {
            self.index
                .iter()
                .filter(|(key, _)| key.starts_with(path))
                .map(|(_, &id)| id)
                .collect()
        } else {
            self.index.get(path).copied().into_iter().collect()
        }
    }

    /// Empties the tombstone registered under `path`.
    pub fn clear_tombstone(&mut self, path: &str) {
        if let Some(id) = self.lookup(path) {
            self.clear_entry(id);
        }
    }

    pub fn clear_entry(&mut self, id: EntryId) {
        self.entry_mut(id).tombstone = None;
    }

    /// Removes `path` and its descendants from the index.
    ///
    /// The entries keep their tombstones, so the next `resolve` for the same
    /// path starts a fresh identity while stale handles keep failing.
    pub fn detach(&mut self, path: &str) {
        for id in self.covered(path) {
            let key = self.entries[id.0].path.clone();
            self.index.remove(&key);
        }
    }

    /// Tombstones and detaches `id`, moving its path to [`path::DELETED`].
    ///
    /// Used when a creation is undone.
    pub fn retire(&mut self, id: EntryId, witness: &Witness) {
        let id = self.find(id);
        let current = self.entries[id.0].path.clone();
        if current == path::DELETED {
            return;
        }

        if self.index.get(&current) == Some(&id) {
            for covered in self.covered(&current) {
                let key = self.entries[covered.0].path.clone();
                self.index.remove(&key);
                let entry = &mut self.entries[covered.0];
                entry.tombstone.get_or_insert_with(|| witness.clone());
                entry.path = path::DELETED.to_string();
            }
        }

        let entry = &mut self.entries[id.0];
        entry.tombstone.get_or_insert_with(|| witness.clone());
        entry.path = path::DELETED.to_string();
        log::debug!("Retired identity formerly at {}", current);
    }

    /// Revives `id` at its current path, undoing a deferred delete.
    ///
    /// Retired identities stay dead.
    pub fn restore(&mut self, id: EntryId) {
        let id = self.find(id);
        let current = self.entries[id.0].path.clone();
        if current == path::DELETED {
            return;
        }
        self.index.entry(current).or_insert(id);
        self.entries[id.0].tombstone = None;
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Forgets every identity. Existing handles are left pointing at
    /// tombstoned entries.
    pub fn clear(&mut self, witness: &Witness) {
        for entry in &mut self.entries {
            entry.tombstone.get_or_insert_with(|| witness.clone());
            entry.forward = None;
        }
        self.index.clear();
    }
}
