//! Directory-backed storage using `std::fs`.

use super::{Kind, Metadata, Storage};
use std::fs::{self, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Maps canonical paths below a root directory on the local file system.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates an adapter rooted at `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Storage root is not a directory: {}", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/').trim_end_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Converts a local path below the root back into a canonical path.
    fn canonical(&self, local: &Path, is_dir: bool) -> String {
        let relative = local.strip_prefix(&self.root).unwrap_or(local);
        let mut path = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
        if is_dir && !path.ends_with('/') {
            path.push('/');
        }
        path
    }

    fn ensure_parent(local: &Path) -> io::Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn describe(&self, local: &Path, meta: &fs::Metadata) -> Metadata {
        let is_dir = meta.is_dir();
        Metadata {
            path: self.canonical(local, is_dir),
            size: if is_dir { 0 } else { meta.len() },
            kind: if is_dir { Kind::Dir } else { Kind::File },
            readonly: meta.permissions().readonly(),
        }
    }

    /// Recursively copies directory tree.
    fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;

        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());

            if file_type.is_dir() {
                Self::copy_dir_recursive(&from_path, &to_path)?;
            } else {
                fs::copy(&from_path, &to_path)?;
            }
        }

        Ok(())
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> io::Result<bool> {
        self.local(path).try_exists()
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.local(path))
    }

    fn read_stream<'a>(&'a self, path: &str) -> io::Result<Box<dyn Read + 'a>> {
        let file = fs::File::open(self.local(path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let local = self.local(path);
        Self::ensure_parent(&local)?;
        fs::write(local, contents)
    }

    fn append_stream(&self, path: &str, reader: &mut dyn Read) -> io::Result<u64> {
        let local = self.local(path);
        Self::ensure_parent(&local)?;
        let mut file = OpenOptions::new().create(true).append(true).open(local)?;
        io::copy(reader, &mut file)
    }

    fn truncate_tail(&self, path: &str, n: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(self.local(path))?;
        let len = file.metadata()?.len();
        file.set_len(len.saturating_sub(n))
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.local(path))
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.local(path))
    }

    fn delete_tree(&self, path: &str) -> io::Result<()> {
        fs::remove_dir_all(self.local(path))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let from = self.local(from);
        let to = self.local(to);
        Self::ensure_parent(&to)?;

        match fs::rename(&from, &to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                log::debug!(
                    "Cross-device rename, copying {} → {}",
                    from.display(),
                    to.display()
                );
                if from.is_dir() {
                    Self::copy_dir_recursive(&from, &to)?;
                    fs::remove_dir_all(&from)
                } else {
                    fs::copy(&from, &to)?;
                    fs::remove_file(&from)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        let from = self.local(from);
        let to = self.local(to);
        Self::ensure_parent(&to)?;

        if from.is_dir() {
            Self::copy_dir_recursive(&from, &to)
        } else {
            fs::copy(&from, &to).map(|_| ())
        }
    }

    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let local = self.local(path);
        let meta = fs::metadata(&local)?;
        Ok(self.describe(&local, &meta))
    }

    fn list(&self, path: &str, recursive: bool) -> io::Result<Vec<Metadata>> {
        let dir = self.local(path);
        let mut entries = Vec::new();

        if recursive {
            let walker = ignore::WalkBuilder::new(&dir)
                .standard_filters(false)
                .build();

            for entry in walker {
                let entry = entry.map_err(io::Error::other)?;
                if entry.depth() == 0 {
                    continue;
                }
                let meta = entry.metadata().map_err(io::Error::other)?;
                entries.push(self.describe(entry.path(), &meta));
            }
        } else {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                entries.push(self.describe(&entry.path(), &meta));
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
