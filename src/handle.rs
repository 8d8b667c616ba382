//! File and directory handles.
//!
//! Handles are the only way to mutate storage through a [`Session`]. Every
//! mutating operation runs in the same order:
//!
//! 1. Fail with `AlreadyDeleted` if the identity carries a tombstone
//! 2. Perform the physical effect (or defer it, for deletes in a transaction)
//! 3. Call the matching `record_*` hook
//! 4. Update the registry (relocate after a rename, tombstone after a delete)
//!
//! Only [`File::path`], [`File::is_deleted`], [`File::deleted_by`] and
//! [`File::exists`] (and their directory counterparts) work on deleted handles.

use crate::error::{Result, TxError};
use crate::path;
use crate::registry::{EntryId, Witness};
use crate::session::Session;
use crate::storage::Metadata;

use std::panic::Location;

/// State shared by file and directory handles.
#[derive(Debug, Clone)]
struct Node {
    session: Session,
    id: EntryId,
}

impl Node {
    fn path(&self) -> String {
        self.session.path_of(self.id)
    }

    fn ensure_live(&self) -> Result<String> {
        match self.session.tombstone_of(self.id) {
            Some(witness) => Err(TxError::AlreadyDeleted {
                path: self.path(),
                witness,
            }),
            None => Ok(self.path()),
        }
    }

    /// Live and physically present.
    fn ensure_present(&self) -> Result<String> {
        let path = self.ensure_live()?;
        if !self.session.exists(&path)? {
            return Err(TxError::Missing(path));
        }
        Ok(path)
    }

    fn exists(&self) -> Result<bool> {
        self.session.exists(&self.path())
    }

    fn metadata(&self) -> Result<Metadata> {
        let path = self.ensure_present()?;
        self.session
            .storage()
            .metadata(&path)
            .map_err(|e| TxError::storage("metadata", &path, e))
    }

    /// Validates a rename or duplicate target.
    fn check_target(&self, from: &str, to: &str) -> Result<()> {
        if path::is_dir(from) && to.starts_with(from) {
            return Err(TxError::IntoOwnSubtree {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if self.session.exists(to)? {
            return Err(TxError::AlreadyExists(to.to_string()));
        }
        self.session.ensure_target_free(to)
    }

    fn rename(&self, to: String) -> Result<()> {
        let from = self.ensure_present()?;
        if from == to {
            return Ok(());
        }
        self.check_target(&from, &to)?;

        self.session
            .storage()
            .rename(&from, &to)
            .map_err(|e| TxError::storage("rename", &from, e))?;

        let recorded = self.session.record_rename(&from, &to);
        self.session.relocate(&from, &to);
        log::debug!("Renamed {} → {}", from, to);
        recorded
    }

    fn duplicate(&self, to: &str) -> Result<()> {
        let from = self.ensure_present()?;
        if from == to {
            return Err(TxError::AlreadyExists(to.to_string()));
        }
        self.check_target(&from, to)?;

        self.session
            .storage()
            .copy(&from, to)
            .map_err(|e| TxError::storage("copy", &from, e))?;

        self.session.record_duplicate(to);
        log::debug!("Duplicated {} → {}", from, to);
        Ok(())
    }

    fn delete(&self, witness: Witness) -> Result<()> {
        let path = self.ensure_present()?;
        if path == "/" {
            return Err(TxError::InvalidPath(
                path,
                "cannot delete the storage root".to_string(),
            ));
        }
        if self.session.is_open() {
            self.session.delete_deferred(self.id, &path, &witness);
            log::debug!("Scheduled delete of {}", path);
            Ok(())
        } else {
            self.session.delete_now(&path, &witness)
        }
    }
}

/// Handle to a file.
///
/// Handles for the same path share one identity: a rename through any of
/// them is visible to all.
#[derive(Debug, Clone)]
pub struct File {
    node: Node,
}

impl File {
    pub(crate) fn new(session: Session, id: EntryId) -> Self {
        Self {
            node: Node { session, id },
        }
    }

    /// Current path (or [`path::DELETED`] after a rolled-back creation).
    pub fn path(&self) -> String {
        self.node.path()
    }

    pub fn is_deleted(&self) -> bool {
        self.node.session.tombstone_of(self.node.id).is_some()
    }

    /// Witness recorded when the file was deleted.
    pub fn deleted_by(&self) -> Option<Witness> {
        self.node.session.tombstone_of(self.node.id)
    }

    /// Returns `true` if two handles share an identity.
    pub fn same_as(&self, other: &File) -> bool {
        self.node.session.same_identity(self.node.id, other.node.id)
    }

    pub fn exists(&self) -> Result<bool> {
        self.node.exists()
    }

    /// Creates the file with `contents`. Fails if anything exists at the path.
    pub fn create(&self, contents: &[u8]) -> Result<()> {
        let path = self.node.ensure_live()?;
        if self.node.session.exists(&path)? {
            return Err(TxError::AlreadyExists(path));
        }
        self.node.session.ensure_target_free(&path)?;

        self.node
            .session
            .storage()
            .write(&path, contents)
            .map_err(|e| TxError::storage("write", &path, e))?;
        self.node.session.record_create(self.node.id);
        log::debug!("Created {}", path);
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        let path = self.node.ensure_present()?;
        self.node
            .session
            .storage()
            .read(&path)
            .map_err(|e| TxError::storage("read", &path, e))
    }

    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read()?;
        String::from_utf8(bytes).map_err(|e| {
            TxError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Replaces the file's contents.
    pub fn write(&self, contents: &[u8]) -> Result<()> {
        let path = self.node.ensure_present()?;
        self.node.session.record_write(self.node.id)?;

        self.node
            .session
            .storage()
            .write(&path, contents)
            .map_err(|e| TxError::storage("write", &path, e))?;
        log::debug!("Wrote {} bytes to {}", contents.len(), path);
        Ok(())
    }

    /// Appends to the file. Rollback truncates exactly the appended bytes.
    pub fn append(&self, contents: &[u8]) -> Result<()> {
        let path = self.node.ensure_present()?;
        let mut reader = contents;
        let appended = self
            .node
            .session
            .storage()
            .append_stream(&path, &mut reader)
            .map_err(|e| TxError::storage("append", &path, e))?;

        self.node.session.record_append(self.node.id, appended);
        log::debug!("Appended {} bytes to {}", appended, path);
        Ok(())
    }

    /// Moves the file. Every handle sharing its identity follows.
    pub fn rename(&self, to: &str) -> Result<()> {
        let to = path::canonicalize(to)?;
        if path::is_dir(&to) {
            return Err(TxError::KindMismatch(
                to,
                "cannot rename a file to a directory path".to_string(),
            ));
        }
        self.node.rename(to)
    }

    /// Copies the file and returns a handle to the copy.
    pub fn duplicate(&self, to: &str) -> Result<File> {
        let target = path::canonicalize(to)?;
        if path::is_dir(&target) {
            return Err(TxError::KindMismatch(
                target,
                "cannot duplicate a file to a directory path".to_string(),
            ));
        }
        self.node.duplicate(&target)?;
        self.node.session.file(&target)
    }

    /// Deletes the file, or schedules the delete if a transaction is open.
    ///
    /// The handle (and every handle sharing its identity) rejects further
    /// operations immediately.
    #[track_caller]
    pub fn delete(&self) -> Result<()> {
        let witness = self.node.session.witness("delete", Location::caller());
        self.node.delete(witness)
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.node.metadata()
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.size)
    }
}

/// Handle to a directory.
#[derive(Debug, Clone)]
pub struct Directory {
    node: Node,
}

impl Directory {
    pub(crate) fn new(session: Session, id: EntryId) -> Self {
        Self {
            node: Node { session, id },
        }
    }

    /// Current path, ending with `/`.
    pub fn path(&self) -> String {
        self.node.path()
    }

    pub fn is_deleted(&self) -> bool {
        self.node.session.tombstone_of(self.node.id).is_some()
    }

    pub fn deleted_by(&self) -> Option<Witness> {
        self.node.session.tombstone_of(self.node.id)
    }

    pub fn same_as(&self, other: &Directory) -> bool {
        self.node.session.same_identity(self.node.id, other.node.id)
    }

    pub fn exists(&self) -> Result<bool> {
        self.node.exists()
    }

    /// Creates the directory and any missing parents.
    pub fn create(&self) -> Result<()> {
        let path = self.node.ensure_live()?;
        if self.node.session.exists(&path)? {
            return Err(TxError::AlreadyExists(path));
        }
        self.node.session.ensure_target_free(&path)?;

        self.node
            .session
            .storage()
            .create_dir(&path)
            .map_err(|e| TxError::storage("create_dir", &path, e))?;
        self.node.session.record_create(self.node.id);
        log::debug!("Created {}", path);
        Ok(())
    }

    /// Lists entries below the directory.
    pub fn list(&self, recursive: bool) -> Result<Vec<Metadata>> {
        let path = self.node.ensure_present()?;
        self.node
            .session
            .storage()
            .list(&path, recursive)
            .map_err(|e| TxError::storage("list", &path, e))
    }

    /// Handle for the file `name` inside this directory.
    pub fn file(&self, name: &str) -> Result<File> {
        let path = self.node.ensure_live()?;
        self.node.session.file(&path::join(&path, name)?)
    }

    /// Handle for the subdirectory `name` inside this directory.
    pub fn dir(&self, name: &str) -> Result<Directory> {
        let path = self.node.ensure_live()?;
        let child = path::join(&path, name)?;
        self.node.session.dir(&child)
    }

    /// Moves the directory. Handles for anything registered below it follow.
    pub fn rename(&self, to: &str) -> Result<()> {
        let to = path::canonicalize_dir(to)?;
        self.node.rename(to)
    }

    /// Copies the whole tree and returns a handle to the copy.
    pub fn duplicate(&self, to: &str) -> Result<Directory> {
        let target = path::canonicalize_dir(to)?;
        self.node.duplicate(&target)?;
        self.node.session.dir(&target)
    }

    /// Deletes the tree, or schedules the delete if a transaction is open.
    ///
    /// Registered descendants are tombstoned together with the directory.
    #[track_caller]
    pub fn delete(&self) -> Result<()> {
        let witness = self.node.session.witness("delete", Location::caller());
        self.node.delete(witness)
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.node.metadata()
    }
}
