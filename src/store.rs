//! File store – where templates, working copies and rendered PDFs live.
//!
//! [`LocalFileStore`] keeps each file in its own directory under a root
//! (`<root>/<id>/content` plus `meta.json`); [`MemoryFileStore`] backs the
//! tests and the FFI renderer.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ForgeError, Result};

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub public: bool,
}

/// Operations the merge pipeline needs from a document store.
pub trait FileStore: Send + Sync {
    /// Duplicate `id` under a new name; the copy gets a fresh id.
    fn copy(&self, id: &str, new_name: &str) -> Result<StoredFile>;
    fn read(&self, id: &str) -> Result<Vec<u8>>;
    /// Replace the content of an existing file.
    fn update(&self, id: &str, bytes: &[u8]) -> Result<()>;
    fn create_file(&self, bytes: &[u8], mime_type: &str, name: &str) -> Result<StoredFile>;
    /// Grant anyone-with-the-link view access.
    fn set_public_readable(&self, id: &str) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn url(&self, id: &str) -> Result<String>;
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

pub struct LocalFileStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalFileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a file. Ids are generated uuids, so anything else
    /// (including path fragments) is rejected.
    fn dir(&self, id: &str) -> Result<PathBuf> {
        Uuid::try_parse(id).map_err(|_| ForgeError::FileNotFound { id: id.to_string() })?;
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(ForgeError::FileNotFound { id: id.to_string() });
        }
        Ok(dir)
    }

    pub fn metadata(&self, id: &str) -> Result<StoredFile> {
        let raw = fs::read(self.dir(id)?.join("meta.json"))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn write_metadata(&self, dir: &Path, meta: &StoredFile) -> Result<()> {
        fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }

    fn write_new(&self, bytes: &[u8], mime_type: &str, name: &str) -> Result<StoredFile> {
        let meta = StoredFile {
            id: new_id(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            public: false,
        };
        let dir = self.root.join(&meta.id);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("content"), bytes)?;
        self.write_metadata(&dir, &meta)?;
        log::debug!("stored {:?} as {}", meta.name, meta.id);
        Ok(meta)
    }
}

impl FileStore for LocalFileStore {
    fn copy(&self, id: &str, new_name: &str) -> Result<StoredFile> {
        let source = self.metadata(id)?;
        let bytes = self.read(id)?;
        self.write_new(&bytes, &source.mime_type, new_name)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.dir(id)?.join("content"))?)
    }

    fn update(&self, id: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.dir(id)?.join("content"), bytes)?;
        Ok(())
    }

    fn create_file(&self, bytes: &[u8], mime_type: &str, name: &str) -> Result<StoredFile> {
        self.write_new(bytes, mime_type, name)
    }

    fn set_public_readable(&self, id: &str) -> Result<()> {
        let dir = self.dir(id)?;
        let mut meta = self.metadata(id)?;
        meta.public = true;
        self.write_metadata(&dir, &meta)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.join("content"), fs::Permissions::from_mode(0o644))?;
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        fs::remove_dir_all(self.dir(id)?)?;
        Ok(())
    }

    fn url(&self, id: &str) -> Result<String> {
        let dir = self.dir(id)?;
        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{id}", base.trim_end_matches('/')),
            None => format!("file://{}", dir.join("content").display()),
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemFile {
    meta: StoredFile,
    bytes: Vec<u8>,
}

/// Process-local store. Operations listed with [`MemoryFileStore::fail_on`]
/// return a store error, which lets callers exercise failure paths.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, MemFile>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` (e.g. `"delete"`) fail.
    pub fn fail_on(&self, operation: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(operation);
        }
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self, id: &str) -> Result<StoredFile> {
        Ok(self.entry(id)?.meta)
    }

    /// Metadata of every stored file, sorted by name.
    pub fn list(&self) -> Vec<StoredFile> {
        let mut all: Vec<StoredFile> = self
            .files
            .lock()
            .map(|f| f.values().map(|m| m.meta.clone()).collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn guard(&self, operation: &'static str) -> Result<MutexGuard<'_, HashMap<String, MemFile>>> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(operation))
            .unwrap_or(false);
        if failing {
            return Err(ForgeError::Store(format!("{operation} unavailable")));
        }
        self.files
            .lock()
            .map_err(|_| ForgeError::Store("memory store lock poisoned".to_string()))
    }

    fn entry(&self, id: &str) -> Result<MemFile> {
        self.guard("read")?
            .get(id)
            .cloned()
            .ok_or_else(|| ForgeError::FileNotFound { id: id.to_string() })
    }

    fn insert(&self, operation: &'static str, bytes: Vec<u8>, mime_type: &str, name: &str) -> Result<StoredFile> {
        let meta = StoredFile {
            id: new_id(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            public: false,
        };
        self.guard(operation)?.insert(
            meta.id.clone(),
            MemFile {
                meta: meta.clone(),
                bytes,
            },
        );
        Ok(meta)
    }
}

impl FileStore for MemoryFileStore {
    fn copy(&self, id: &str, new_name: &str) -> Result<StoredFile> {
        let source = self.entry(id)?;
        self.insert("copy", source.bytes, &source.meta.mime_type, new_name)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        Ok(self.entry(id)?.bytes)
    }

    fn update(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let mut files = self.guard("update")?;
        let file = files
            .get_mut(id)
            .ok_or_else(|| ForgeError::FileNotFound { id: id.to_string() })?;
        file.bytes = bytes.to_vec();
        Ok(())
    }

    fn create_file(&self, bytes: &[u8], mime_type: &str, name: &str) -> Result<StoredFile> {
        self.insert("create_file", bytes.to_vec(), mime_type, name)
    }

    fn set_public_readable(&self, id: &str) -> Result<()> {
        let mut files = self.guard("set_public_readable")?;
        let file = files
            .get_mut(id)
            .ok_or_else(|| ForgeError::FileNotFound { id: id.to_string() })?;
        file.meta.public = true;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.guard("delete")?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ForgeError::FileNotFound { id: id.to_string() })
    }

    fn url(&self, id: &str) -> Result<String> {
        let file = self.entry(id)?;
        Ok(format!("memory://{}/{}", file.meta.id, file.meta.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path(), Some("https://files.example/".into())).unwrap();

        let tpl = store.create_file(b"<p>{{BRANCH}}</p>", "text/html", "template").unwrap();
        let copy = store.copy(&tpl.id, "Requisition 2024-01-01 08:00:00").unwrap();
        assert_ne!(copy.id, tpl.id);
        assert_eq!(store.read(&copy.id).unwrap(), b"<p>{{BRANCH}}</p>");

        store.update(&copy.id, b"<p>MAIN</p>").unwrap();
        assert_eq!(store.read(&copy.id).unwrap(), b"<p>MAIN</p>");
        assert_eq!(store.read(&tpl.id).unwrap(), b"<p>{{BRANCH}}</p>");

        store.set_public_readable(&copy.id).unwrap();
        assert!(store.metadata(&copy.id).unwrap().public);
        assert_eq!(
            store.url(&copy.id).unwrap(),
            format!("https://files.example/{}", copy.id)
        );

        store.delete(&copy.id).unwrap();
        assert!(matches!(store.read(&copy.id), Err(ForgeError::FileNotFound { .. })));
    }

    #[test]
    fn local_store_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::open(dir.path(), None).unwrap();
        assert!(store.read("../etc/passwd").is_err());
    }

    #[test]
    fn memory_store_failure_injection() {
        let store = MemoryFileStore::new();
        let f = store.create_file(b"x", "text/plain", "a").unwrap();
        store.fail_on("delete");
        assert!(matches!(store.delete(&f.id), Err(ForgeError::Store(_))));
        assert_eq!(store.len(), 1);
    }
}
