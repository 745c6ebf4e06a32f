// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem. Clones share the same backing map.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        Self::ensure_parents(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        Self::ensure_parents(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::Dir);
    }

    /// Number of regular files currently stored.
    pub fn file_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| matches!(e, MockEntry::File(_)))
            .count()
    }

    /// Contents of a stored file, lossily decoded.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.lock().get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(String::from_utf8_lossy(content).into_owned()),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_parents(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            entries.entry(dir.to_path_buf()).or_insert(MockEntry::Dir);
            current = dir.parent();
        }
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File(_)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut entries = self.lock();
        let parent_ok = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => {
                matches!(entries.get(p), Some(MockEntry::Dir))
            }
            _ => true,
        };
        if !parent_ok {
            return Err(anyhow!("Parent directory missing: {:?}", path));
        }
        entries.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut entries = self.lock();
        match entries.get(path) {
            Some(MockEntry::File(_)) => {
                entries.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }
}
