//! Shared fixtures for txfs integration tests.
//!
//! Library tests run against both storage backends; CLI tests drive the
//! `txfs` binary against a temporary directory.

use assert_cmd::cargo::cargo_bin_cmd;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use txfs::{LocalStorage, MemoryStorage, Metadata, Session, Storage};

/// Runs `test` once over an in-memory session and once over a temp directory.
#[allow(unused)]
pub fn for_each_backend(test: impl Fn(&Session)) {
    test(&Session::new(MemoryStorage::new()));

    let temp = TempDir::new().unwrap();
    test(&Session::new(LocalStorage::new(temp.path()).unwrap()));
}

/// Every file below the root with its contents.
#[allow(unused)]
pub fn snapshot(storage: &dyn Storage) -> BTreeMap<String, Vec<u8>> {
    storage
        .list("/", true)
        .unwrap()
        .into_iter()
        .filter(|m| !m.is_dir())
        .map(|m| {
            let contents = storage.read(&m.path).unwrap();
            (m.path, contents)
        })
        .collect()
}

/// Writes raw files through the backend, bypassing handles and the log.
#[allow(unused)]
pub fn seed(session: &Session, files: &[(&str, &str)]) {
    for (path, contents) in files {
        session.storage().write(path, contents.as_bytes()).unwrap();
    }
}

/// Storage whose renames and deletes can be made to fail on demand.
#[allow(unused)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    pub fail_renames: Rc<Cell<bool>>,
    pub fail_deletes: Rc<Cell<bool>>,
}

#[allow(unused)]
impl FlakyStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_renames: Rc::new(Cell::new(false)),
            fail_deletes: Rc::new(Cell::new(false)),
        }
    }

    fn check(flag: &Cell<bool>, path: &str) -> io::Result<()> {
        if flag.get() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing to touch {}", path),
            ));
        }
        Ok(())
    }
}

impl Storage for FlakyStorage {
    fn exists(&self, path: &str) -> io::Result<bool> {
        self.inner.exists(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn read_stream<'a>(&'a self, path: &str) -> io::Result<Box<dyn Read + 'a>> {
        self.inner.read_stream(path)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.inner.write(path, contents)
    }

    fn append_stream(&self, path: &str, reader: &mut dyn Read) -> io::Result<u64> {
        self.inner.append_stream(path, reader)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        self.inner.create_dir(path)
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        Self::check(&self.fail_deletes, path)?;
        self.inner.delete(path)
    }

    fn delete_tree(&self, path: &str) -> io::Result<()> {
        Self::check(&self.fail_deletes, path)?;
        self.inner.delete_tree(path)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        Self::check(&self.fail_renames, from)?;
        self.inner.rename(from, to)
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        self.inner.copy(from, to)
    }

    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        self.inner.metadata(path)
    }

    fn list(&self, path: &str, recursive: bool) -> io::Result<Vec<Metadata>> {
        self.inner.list(path, recursive)
    }
}

/// Writes `plan` into its own temp directory and returns both.
#[allow(unused)]
pub fn write_plan(plan: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("plan.toml");
    fs::write(&file, plan).unwrap();
    (temp, file)
}

/// Helper to run `txfs apply`
#[allow(unused)]
pub fn run_apply(root: &Path, plan: &Path, extra_args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("txfs");
    cmd.arg("apply")
        .arg(plan)
        .arg("--root")
        .arg(root)
        .args(extra_args)
        .env("NO_COLOR", "1");

    cmd.assert()
}
