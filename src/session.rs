//! Transaction manager and subsystem context.
//!
//! A [`Session`] owns a storage backend, the identity/tombstone
//! [`Registry`] and the [`Journal`]. Handles obtained from it call back into
//! the `record_*` hooks whenever they mutate storage, so the session knows how
//! to undo (and for deletes, how to finish) each operation.
//!
//! ## Execution Guarantees
//!
//! - **Single transaction**: `begin` while open fails with `AlreadyOpen`
//! - **Ordering**: undo entries are replayed LIFO on rollback; pending
//!   deletes are replayed LIFO on commit
//! - **Deferred deletes**: deleting inside a transaction only tombstones the
//!   identity; the physical delete happens at commit
//! - **Partial failure**: replay stops at the first storage error, leaving the
//!   failing entry and everything before it in the log. Calling `commit` or
//!   `rollback` again retries the remainder.
//!
//! Not safe under concurrent use: a session is `!Send` and must stay on one thread.
//!
//! ## Example
//!
//! ```no_run
//! # use txfs::{MemoryStorage, Session};
//! # fn example() -> txfs::Result<()> {
//! let session = Session::new(MemoryStorage::new());
//! session.begin()?;
//!
//! let file = session.file("/a/x.txt")?;
//! file.create(b"hi")?;
//! file.append(b"!")?;
//!
//! session.rollback()?; // `/a/x.txt` is gone again
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TxError};
use crate::handle::{Directory, File};
use crate::journal::{Journal, PendingDelete, Target, Undo};
use crate::path;
use crate::registry::{EntryId, Registry, Witness};
use crate::storage::Storage;

use std::cell::RefCell;
use std::panic::Location;
use std::rc::Rc;

struct Inner {
    storage: Box<dyn Storage>,
    registry: RefCell<Registry>,
    journal: RefCell<Journal>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let journal = self.journal.get_mut();
        if journal.is_open() {
            let (undo, pending) = journal.depth();
            log::warn!(
                "Session dropped with an open transaction ({} undo, {} pending deletes)",
                undo,
                pending
            );
        }
    }
}

/// Shared subsystem context. Cloning yields another reference to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("identities", &self.inner.registry.borrow().len())
            .finish()
    }
}

impl Session {
    /// Creates a session over `storage` with a closed transaction state.
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                storage: Box::new(storage),
                registry: RefCell::new(Registry::new()),
                journal: RefCell::new(Journal::new()),
            }),
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Returns a handle for the file at `path`.
    pub fn file(&self, path: &str) -> Result<File> {
        let path = path::canonicalize(path)?;
        if path::is_dir(&path) {
            return Err(TxError::KindMismatch(
                path,
                "file paths cannot end with '/'".to_string(),
            ));
        }
        let id = self.attach(&path)?;
        Ok(File::new(self.clone(), id))
    }

    /// Returns a handle for the directory at `path`.
    pub fn dir(&self, path: &str) -> Result<Directory> {
        let path = path::canonicalize_dir(path)?;
        let id = self.attach(&path)?;
        Ok(Directory::new(self.clone(), id))
    }

    /// Resolves the identity for `path`, wiping a stale tombstone.
    ///
    /// A tombstone is stale when the object exists again and no transaction
    /// is open to explain it.
    fn attach(&self, path: &str) -> Result<EntryId> {
        let (id, tombstoned) = {
            let mut registry = self.inner.registry.borrow_mut();
            let id = registry.resolve(path);
            (id, registry.tombstone(id).is_some())
        };

        if tombstoned && !self.is_open() && self.exists(path)? {
            log::debug!("Clearing stale tombstone for {}", path);
            self.inner.registry.borrow_mut().clear_entry(id);
        }
        Ok(id)
    }

    pub(crate) fn exists(&self, path: &str) -> Result<bool> {
        if path == path::DELETED {
            return Ok(false);
        }
        self.storage()
            .exists(path)
            .map_err(|e| TxError::storage("exists", path, e))
    }

    /// Current path of an identity.
    pub(crate) fn path_of(&self, id: EntryId) -> String {
        self.inner.registry.borrow().path(id).to_string()
    }

    pub(crate) fn tombstone_of(&self, id: EntryId) -> Option<Witness> {
        self.inner.registry.borrow().tombstone(id).cloned()
    }

    pub(crate) fn same_identity(&self, a: EntryId, b: EntryId) -> bool {
        self.inner.registry.borrow().same(a, b)
    }

    pub(crate) fn witness(&self, op: &'static str, location: &'static Location<'static>) -> Witness {
        self.inner.registry.borrow_mut().witness(op, location)
    }

    /// Physically deletes a file or directory tree.
    fn remove(&self, path: &str) -> Result<()> {
        let result = if path::is_dir(path) {
            self.storage().delete_tree(path)
        } else {
            self.storage().delete(path)
        };
        result.map_err(|e| TxError::storage("delete", path, e))
    }

    /// Deletes immediately, outside of any transaction.
    pub(crate) fn delete_now(&self, path: &str, witness: &Witness) -> Result<()> {
        self.remove(path)?;
        let mut registry = self.inner.registry.borrow_mut();
        registry.mark_deleted(path, witness);
        registry.detach(path);
        log::debug!("Deleted {}", path);
        Ok(())
    }

    /// Tombstones an identity whose physical delete waits for commit.
    pub(crate) fn delete_deferred(&self, id: EntryId, path: &str, witness: &Witness) {
        let cascaded = self.inner.registry.borrow().live_descendants(path);
        self.record_delete(id, path, cascaded);
        self.inner.registry.borrow_mut().mark_deleted(path, witness);
    }

    /// Rejects a create, rename or duplicate target that lies below a
    /// directory pending delete or below a directory placeholder.
    ///
    /// Commit removes those trees whole, so nothing new may appear in them.
    pub(crate) fn ensure_target_free(&self, path: &str) -> Result<()> {
        let deleted = self
            .inner
            .registry
            .borrow()
            .tombstoned_ancestor(path)
            .cloned();
        if let Some(witness) = deleted {
            return Err(TxError::AlreadyDeleted {
                path: path.to_string(),
                witness,
            });
        }

        let reserved = self.inner.journal.borrow().placeholder_above(path);
        if let Some(dir) = reserved {
            log::debug!("{} is reserved by the placeholder at {}", path, dir);
            return Err(TxError::AlreadyExists(dir));
        }
        Ok(())
    }

    pub(crate) fn relocate(&self, from: &str, to: &str) {
        let mut registry = self.inner.registry.borrow_mut();
        if path::is_dir(from) {
            registry.relocate_subtree(from, to);
        } else {
            registry.relocate(from, to);
        }
    }
}

// Transaction manager
impl Session {
    /// Opens a transaction.
    pub fn begin(&self) -> Result<()> {
        self.inner.journal.borrow_mut().begin()?;
        log::info!("Transaction started");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.journal.borrow().is_open()
    }

    /// Number of (undo, pending-delete) entries in the open transaction.
    pub fn depth(&self) -> (usize, usize) {
        self.inner.journal.borrow().depth()
    }

    /// Undoing a creation means deleting what was created.
    pub(crate) fn record_create(&self, id: EntryId) {
        self.inner
            .journal
            .borrow_mut()
            .push_undo(Undo::Delete(Target::Entry(id)));
    }

    pub(crate) fn record_duplicate(&self, path: &str) {
        self.inner
            .journal
            .borrow_mut()
            .push_undo(Undo::Delete(Target::Path(path.to_string())));
    }

    /// Rollback truncates exactly `len` trailing bytes.
    ///
    /// Prior content is not captured; nothing else may append to the same
    /// path while the transaction is open.
    pub(crate) fn record_append(&self, id: EntryId, len: u64) {
        let path = self.path_of(id);
        self.inner
            .journal
            .borrow_mut()
            .push_undo(Undo::Append { path, len });
    }

    /// Captures the full prior content of the file. Must run before the write.
    ///
    /// Memory cost grows with file size.
    pub(crate) fn record_write(&self, id: EntryId) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let path = self.path_of(id);
        let prior = self
            .storage()
            .read(&path)
            .map_err(|e| TxError::storage("read", &path, e))?;
        self.inner
            .journal
            .borrow_mut()
            .push_undo(Undo::Write { path, prior });
        Ok(())
    }

    /// Logs a completed rename and reserves the freed name with a placeholder.
    ///
    /// The placeholder is removed at commit. A directory's placeholder is an
    /// empty directory.
    pub(crate) fn record_rename(&self, from: &str, to: &str) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        self.inner.journal.borrow_mut().push_undo(Undo::Rename {
            from: from.to_string(),
            to: to.to_string(),
        });

        let placed = if path::is_dir(from) {
            self.storage().create_dir(from)
        } else {
            self.storage().write(from, b"")
        };
        placed.map_err(|e| TxError::storage("placeholder", from, e))?;

        self.inner
            .journal
            .borrow_mut()
            .push_pending(PendingDelete::Path(from.to_string()));
        Ok(())
    }

    pub(crate) fn record_delete(&self, id: EntryId, path: &str, cascaded: Vec<EntryId>) {
        self.inner
            .journal
            .borrow_mut()
            .push_pending(PendingDelete::Entry {
                id,
                path: path.to_string(),
                cascaded,
            });
    }

    /// Performs every deferred delete, newest first, and closes the transaction.
    #[track_caller]
    pub fn commit(&self) -> Result<()> {
        if !self.is_open() {
            return Err(TxError::NoTransaction);
        }

        let witness = self.witness("commit", Location::caller());
        let (_, pending) = self.depth();
        log::debug!("Committing {} pending deletes", pending);

        loop {
            let next = self.inner.journal.borrow_mut().pop_pending();
            let Some(entry) = next else { break };

            if let Err(e) = self.finish_delete(&entry, &witness) {
                log::error!("Commit stopped: {}", e);
                self.inner.journal.borrow_mut().push_pending(entry);
                return Err(e);
            }
        }

        self.inner.journal.borrow_mut().close();
        log::info!("Transaction committed");
        Ok(())
    }

    fn finish_delete(&self, entry: &PendingDelete, witness: &Witness) -> Result<()> {
        let path = match entry {
            PendingDelete::Entry { id, .. } => self.path_of(*id),
            PendingDelete::Path(path) => path.clone(),
        };

        if !self.exists(&path)? {
            log::debug!("Already gone, skipping delete of {}", path);
        } else {
            self.remove(&path)?;
            log::debug!("Deleted {}", path);
        }

        // Anything still registered at or below the path is gone now
        let mut registry = self.inner.registry.borrow_mut();
        registry.mark_deleted(&path, witness);
        registry.detach(&path);
        Ok(())
    }

    /// Reverts the open transaction. A no-op while closed.
    #[track_caller]
    pub fn rollback(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let witness = self.witness("rollback", Location::caller());
        let (undo, _) = self.depth();
        log::warn!("Rolling back {} operations...", undo);

        loop {
            let next = self.inner.journal.borrow_mut().pop_undo();
            let Some(entry) = next else { break };

            if let Err(e) = self.revert(&entry, &witness) {
                log::error!("Rollback stopped: {}", e);
                self.inner.journal.borrow_mut().push_undo(entry);
                return Err(e);
            }
        }

        loop {
            let next = self.inner.journal.borrow_mut().pop_pending();
            let Some(entry) = next else { break };
            self.cancel_delete(entry);
        }

        self.inner.journal.borrow_mut().close();
        log::info!("Rollback completed");
        Ok(())
    }

    fn revert(&self, entry: &Undo, witness: &Witness) -> Result<()> {
        match entry {
            Undo::Append { path, len } => self
                .storage()
                .truncate_tail(path, *len)
                .map_err(|e| TxError::storage("truncate", path, e)),
            Undo::Write { path, prior } => self
                .storage()
                .write(path, prior)
                .map_err(|e| TxError::storage("write", path, e)),
            Undo::Delete(target) => self.unmake(target, witness),
            Undo::Rename { from, to } => {
                if self.exists(from)? {
                    log::debug!("Removing placeholder at {}", from);
                    self.remove(from)?;
                }
                self.storage()
                    .rename(to, from)
                    .map_err(|e| TxError::storage("rename", to, e))?;
                self.relocate(to, from);
                Ok(())
            }
        }
    }

    /// Undoes a creation or duplication.
    fn unmake(&self, target: &Target, witness: &Witness) -> Result<()> {
        let (path, id) = match target {
            Target::Entry(id) => (self.path_of(*id), Some(*id)),
            Target::Path(path) => {
                let id = self.inner.registry.borrow().lookup(path);
                (path.clone(), id)
            }
        };

        if self.exists(&path)? {
            self.remove(&path)?;
        } else {
            log::debug!("Already gone, skipping undo of {}", path);
        }

        if let Some(id) = id {
            self.inner.registry.borrow_mut().retire(id, witness);
        }
        Ok(())
    }

    /// Revives an identity whose delete was scheduled but never committed.
    fn cancel_delete(&self, entry: PendingDelete) {
        match entry {
            PendingDelete::Entry { id, path, cascaded } => {
                let mut registry = self.inner.registry.borrow_mut();
                registry.restore(id);
                for child in cascaded {
                    registry.restore(child);
                }
                log::debug!("Cancelled delete of {}", path);
            }
            PendingDelete::Path(path) => {
                log::debug!("Dropped placeholder delete for {}", path);
            }
        }
    }

    /// Rolls back, then forgets every transaction entry and identity.
    ///
    /// Meant for test isolation and full subsystem resets. Returns the
    /// rollback error, if any, after clearing.
    #[track_caller]
    pub fn reset(&self) -> Result<()> {
        let location = Location::caller();
        let result = self.rollback();
        if let Err(e) = &result {
            log::error!("Reset discarded a failed rollback: {}", e);
        }

        self.inner.journal.borrow_mut().close();
        let witness = self.witness("reset", location);
        self.inner.registry.borrow_mut().clear(&witness);
        result
    }
}
