//! Save and open documents on the local file system.

use crate::documents::Document;
use crate::util::sanitize_file_name;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A file read from disk, ready to become a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub name: String,
    pub content: String,
}

/// Document directory (the configured workspace by default).
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `document` would be written.
    pub fn path_for(&self, document: &Document) -> PathBuf {
        self.root.join(sanitize_file_name(&document.file_name()))
    }

    /// Write `document` under the root using its file name.
    pub fn save(&self, document: &Document) -> Result<PathBuf> {
        let path = self.path_for(document);
        save_to(&path, document)?;
        Ok(path)
    }

    /// Files in the root, sorted by name.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to read {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Write the document content byte-for-byte to `path`.
pub fn save_to(path: &Path, document: &Document) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, document.content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = document.content.len(), "local.saved");
    Ok(())
}

/// Read a text file. The tab name is the file name.
pub fn open(path: &Path) -> Result<LoadedFile> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let content = String::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!("{} is not a UTF-8 text file", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled.js".to_string());
    Ok(LoadedFile { name, content })
}
