//! Transaction log.
//!
//! Holds the undo list (replayed LIFO on rollback) and the pending-delete list
//! (replayed LIFO on commit) while a transaction is open.

use crate::error::{Result, TxError};
use crate::path;
use crate::registry::EntryId;

/// What an undo or pending-delete entry acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A handle's identity; resolved to its current path when replayed.
    Entry(EntryId),
    /// A fixed path.
    Path(String),
}

/// Inverse of a mutation, applied on rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    /// Truncate `len` trailing bytes.
    Append { path: String, len: u64 },
    /// Remove something created or duplicated in the transaction.
    Delete(Target),
    /// Restore the content captured before an overwrite.
    Write { path: String, prior: Vec<u8> },
    /// Move `to` back to `from`.
    Rename { from: String, to: String },
}

/// Physical delete deferred until commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDelete {
    /// Deleted through a handle.
    ///
    /// `path` is where the identity lived when deleted; `cascaded` are the
    /// registered descendants tombstoned alongside it.
    Entry {
        id: EntryId,
        path: String,
        cascaded: Vec<EntryId>,
    },
    /// Rename placeholder.
    Path(String),
}

#[derive(Debug, Default)]
struct Log {
    undo: Vec<Undo>,
    pending: Vec<PendingDelete>,
}

#[derive(Debug, Default)]
enum TxState {
    #[default]
    Closed,
    Open(Log),
}

/// Transaction state machine: `Closed --begin--> Open --{commit|rollback}--> Closed`.
#[derive(Debug, Default)]
pub struct Journal {
    state: TxState,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(TxError::AlreadyOpen);
        }
        self.state = TxState::Open(Log::default());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, TxState::Open(_))
    }

    /// Appends to the undo list. Ignored while closed.
    pub fn push_undo(&mut self, undo: Undo) {
        if let TxState::Open(entries) = &mut self.state {
            log::debug!("Undo entry: {:?}", Summary(&undo));
            entries.undo.push(undo);
        }
    }

    /// Appends to the pending-delete list. Ignored while closed.
    pub fn push_pending(&mut self, pending: PendingDelete) {
        if let TxState::Open(entries) = &mut self.state {
            log::debug!("Pending delete: {:?}", pending);
            entries.pending.push(pending);
        }
    }

    /// Takes the most recent undo entry.
    pub fn pop_undo(&mut self) -> Option<Undo> {
        match &mut self.state {
            TxState::Open(entries) => entries.undo.pop(),
            TxState::Closed => None,
        }
    }

    /// Takes the most recent pending delete.
    pub fn pop_pending(&mut self) -> Option<PendingDelete> {
        match &mut self.state {
            TxState::Open(entries) => entries.pending.pop(),
            TxState::Closed => None,
        }
    }

    /// Number of (undo, pending-delete) entries.
    pub fn depth(&self) -> (usize, usize) {
        match &self.state {
            TxState::Open(entries) => (entries.undo.len(), entries.pending.len()),
            TxState::Closed => (0, 0),
        }
    }

    /// Directory placeholder strictly above `path`, if one is pending delete.
    pub fn placeholder_above(&self, path: &str) -> Option<String> {
        let TxState::Open(entries) = &self.state else {
            return None;
        };
        entries.pending.iter().find_map(|pending| match pending {
            PendingDelete::Path(dir)
                if path::is_dir(dir) && path != dir.as_str() && path.starts_with(dir.as_str()) =>
            {
                Some(dir.clone())
            }
            _ => None,
        })
    }

    /// Drops both lists and returns to `Closed`.
    pub fn close(&mut self) {
        self.state = TxState::Closed;
    }
}

/// Debug view of an undo entry that omits captured content.
struct Summary<'a>(&'a Undo);

impl std::fmt::Debug for Summary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Undo::Write { path, prior } => write!(f, "Write({}, {} bytes)", path, prior.len()),
            other => write!(f, "{:?}", other),
        }
    }
}
