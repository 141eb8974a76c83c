// src/fs/mock.rs

use super::{FileStat, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    mtime_ns: u64,
}

/// In-memory filesystem for deterministic tests.
///
/// Modification times are driven by a logical clock: every write bumps the
/// clock, and tests can bump it explicitly with [`MockFileSystem::touch`]
/// or pin it with [`MockFileSystem::set_mtime`].
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    files: HashMap<PathBuf, MockFile>,
    clock: u64,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let mtime_ns = inner.clock;
        inner.files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                mtime_ns,
            },
        );
    }

    /// Bump the mtime of an existing file without changing its content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        if let Some(file) = inner.files.get_mut(path.as_ref()) {
            file.mtime_ns = clock;
        }
    }

    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime_ns: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(file) = inner.files.get_mut(path.as_ref()) {
            file.mtime_ns = mtime_ns;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path.as_ref());
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        match inner.files.get(path) {
            Some(file) => String::from_utf8(file.content.clone())
                .map_err(|e| anyhow!("invalid UTF-8 in {:?}: {}", path, e)),
            None => Err(anyhow!("file not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let inner = self.inner.lock().unwrap();
        match inner.files.get(path) {
            Some(file) => Ok(Box::new(Cursor::new(file.content.clone()))),
            None => Err(anyhow!("file not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.exists(path)
    }

    fn stat(&self, path: &Path) -> Option<FileStat> {
        let inner = self.inner.lock().unwrap();
        inner.files.get(path).map(|file| FileStat {
            size: file.content.len() as u64,
            mtime_ns: file.mtime_ns,
        })
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("file not found: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_mtime_without_changing_content() {
        let fs = MockFileSystem::new();
        fs.add_file("/a.txt", "hello");
        let before = fs.stat(Path::new("/a.txt")).unwrap();
        fs.touch("/a.txt");
        let after = fs.stat(Path::new("/a.txt")).unwrap();
        assert_eq!(before.size, after.size);
        assert!(after.mtime_ns > before.mtime_ns);
    }

    #[test]
    fn stat_returns_none_for_missing_file() {
        let fs = MockFileSystem::new();
        assert!(fs.stat(Path::new("/nope")).is_none());
    }
}
