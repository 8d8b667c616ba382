//! In-memory storage.

use super::{Kind, Metadata, Storage, not_found};
use crate::path;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read};

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    /// Directory keys end with `/`. The root is implicit.
    dirs: BTreeSet<String>,
}

impl Tree {
    fn file_key(path: &str) -> &str {
        path.trim_end_matches('/')
    }

    fn dir_key(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }

    fn is_dir(&self, path: &str) -> bool {
        let key = Self::dir_key(path);
        key == "/" || self.dirs.contains(&key)
    }

    fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(Self::file_key(path))
    }

    /// Registers every ancestor directory of `path`.
    fn ensure_parents(&mut self, path: &str) -> io::Result<()> {
        let mut current = path::parent(path);
        while let Some(dir) = current {
            if dir == "/" {
                break;
            }
            if self.is_file(dir) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("A file is in the way: {}", dir.trim_end_matches('/')),
                ));
            }
            self.dirs.insert(dir.to_string());
            current = path::parent(dir);
        }
        Ok(())
    }

    /// Every file and directory key at or below directory `prefix`.
    fn subtree(&self, prefix: &str) -> (Vec<String>, Vec<String>) {
        let files = self
            .files
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let dirs = self
            .dirs
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        (files, dirs)
    }

    fn copy_tree(&mut self, from: &str, to: &str) -> io::Result<()> {
        let from = Self::dir_key(from);
        let to = Self::dir_key(to);
        let (files, dirs) = self.subtree(&from);

        self.ensure_parents(&to)?;
        for dir in dirs {
            if let Some(target) = path::rebase(&dir, &from, &to) {
                self.dirs.insert(target);
            }
        }
        for file in files {
            if let Some(target) = path::rebase(&file, &from, &to) {
                let contents = self.files[&file].clone();
                self.files.insert(target, contents);
            }
        }
        Ok(())
    }

    fn remove_tree(&mut self, path: &str) {
        let prefix = Self::dir_key(path);
        let (files, dirs) = self.subtree(&prefix);
        for file in files {
            self.files.remove(&file);
        }
        for dir in dirs {
            self.dirs.remove(&dir);
        }
    }

    fn describe(&self, path: &str) -> Option<Metadata> {
        if let Some(contents) = self.files.get(Self::file_key(path)) {
            return Some(Metadata {
                path: Self::file_key(path).to_string(),
                size: contents.len() as u64,
                kind: Kind::File,
                readonly: false,
            });
        }
        self.is_dir(path).then(|| Metadata {
            path: Self::dir_key(path),
            size: 0,
            kind: Kind::Dir,
            readonly: false,
        })
    }
}

/// Storage kept entirely in memory, for tests and embedders.
///
/// Writes implicitly create parent directories, like an object store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: RefCell<Tree>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All file paths with their contents, sorted by path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.tree.borrow().files.clone()
    }

    /// All directory paths, sorted.
    pub fn directories(&self) -> BTreeSet<String> {
        self.tree.borrow().dirs.clone()
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> io::Result<bool> {
        let tree = self.tree.borrow();
        Ok(tree.is_file(path) || tree.is_dir(path))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.tree
            .borrow()
            .files
            .get(Tree::file_key(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn read_stream<'a>(&'a self, path: &str) -> io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        if path::is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cannot write to directory path: {}", path),
            ));
        }
        let mut tree = self.tree.borrow_mut();
        if tree.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("A directory is in the way: {}", path),
            ));
        }
        tree.ensure_parents(path)?;
        tree.files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn append_stream(&self, path: &str, reader: &mut dyn Read) -> io::Result<u64> {
        let mut buf = Vec::new();
        let n = reader.read_to_end(&mut buf)?;

        let mut tree = self.tree.borrow_mut();
        tree.ensure_parents(path)?;
        tree.files
            .entry(Tree::file_key(path).to_string())
            .or_default()
            .extend_from_slice(&buf);
        Ok(n as u64)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        let mut tree = self.tree.borrow_mut();
        if tree.is_file(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("A file is in the way: {}", path),
            ));
        }
        let key = Tree::dir_key(path);
        tree.ensure_parents(&key)?;
        if key != "/" {
            tree.dirs.insert(key);
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        self.tree
            .borrow_mut()
            .files
            .remove(Tree::file_key(path))
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn delete_tree(&self, path: &str) -> io::Result<()> {
        let mut tree = self.tree.borrow_mut();
        if !tree.is_dir(path) {
            return Err(not_found(path));
        }
        tree.remove_tree(path);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut tree = self.tree.borrow_mut();

        if tree.is_file(from) {
            tree.ensure_parents(to)?;
            let contents = tree.files.remove(Tree::file_key(from)).unwrap_or_default();
            tree.files.insert(Tree::file_key(to).to_string(), contents);
            return Ok(());
        }

        if !tree.is_dir(from) {
            return Err(not_found(from));
        }
        let target = Tree::dir_key(to);
        if tree.is_dir(&target) {
            let (files, dirs) = tree.subtree(&target);
            if !files.is_empty() || dirs.len() > 1 {
                return Err(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("Target directory is not empty: {}", target),
                ));
            }
        }
        tree.copy_tree(from, &target)?;
        tree.remove_tree(from);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        let mut tree = self.tree.borrow_mut();

        if let Some(contents) = tree.files.get(Tree::file_key(from)).cloned() {
            tree.ensure_parents(to)?;
            tree.files.insert(Tree::file_key(to).to_string(), contents);
            return Ok(());
        }

        if !tree.is_dir(from) {
            return Err(not_found(from));
        }
        tree.copy_tree(from, to)
    }

    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        self.tree
            .borrow()
            .describe(path)
            .ok_or_else(|| not_found(path))
    }

    fn list(&self, path: &str, recursive: bool) -> io::Result<Vec<Metadata>> {
        let tree = self.tree.borrow();
        if !tree.is_dir(path) {
            return Err(not_found(path));
        }

        let prefix = Tree::dir_key(path);
        let (files, dirs) = tree.subtree(&prefix);
        let mut entries: Vec<Metadata> = dirs
            .iter()
            .filter(|d| **d != prefix)
            .chain(files.iter())
            .filter(|p| {
                recursive || !p[prefix.len()..].trim_end_matches('/').contains('/')
            })
            .filter_map(|p| tree.describe(p))
            .collect();

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
