//! Storage adapters.
//!
//! A [`Storage`] offers primitive, non-transactional operations on canonical
//! paths (see [`crate::path`]). The session layers undo/commit semantics on top.

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use std::io::{self, Read};

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Dir,
}

/// Metadata reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Canonical path (directories end with `/`).
    pub path: String,
    /// Size in bytes; `0` for directories.
    pub size: u64,
    pub kind: Kind,
    pub readonly: bool,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Dir
    }
}

/// Primitive operations the transaction layer consumes.
///
/// Implementations need not be transactional. Directory paths end with `/`.
/// `exists` treats `/a` and `/a/` as the same object.
pub trait Storage {
    fn exists(&self, path: &str) -> io::Result<bool>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    fn read_stream<'a>(&'a self, path: &str) -> io::Result<Box<dyn Read + 'a>>;

    /// Creates or replaces a file, creating missing parent directories.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    fn write_stream(&self, path: &str, reader: &mut dyn Read) -> io::Result<u64> {
        let mut buf = Vec::new();
        let n = reader.read_to_end(&mut buf)?;
        self.write(path, &buf)?;
        Ok(n as u64)
    }

    /// Appends to a file, creating it if missing. Returns the number of bytes appended.
    fn append_stream(&self, path: &str, reader: &mut dyn Read) -> io::Result<u64>;

    /// Removes the last `n` bytes of a file.
    fn truncate_tail(&self, path: &str, n: u64) -> io::Result<()> {
        let mut contents = self.read(path)?;
        let keep = contents
            .len()
            .saturating_sub(usize::try_from(n).unwrap_or(usize::MAX));
        contents.truncate(keep);
        self.write(path, &contents)
    }

    /// Creates a directory and any missing parents.
    fn create_dir(&self, path: &str) -> io::Result<()>;

    fn delete(&self, path: &str) -> io::Result<()>;

    /// Deletes a directory and everything below it.
    fn delete_tree(&self, path: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Copies a file, or a directory recursively.
    fn copy(&self, from: &str, to: &str) -> io::Result<()>;

    fn metadata(&self, path: &str) -> io::Result<Metadata>;

    /// Lists the entries below a directory, sorted by path.
    fn list(&self, path: &str, recursive: bool) -> io::Result<Vec<Metadata>>;
}

pub(crate) fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("No such object: {}", path))
}
