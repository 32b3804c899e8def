//! In-memory, versioned file store.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::FsError;

/// A single file held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    /// Name of the tool that produced the current content.
    pub last_writer: String,
    /// Starts at 1 and grows by one on every write to this path.
    pub version: u64,
}

impl FileEntry {
    /// Size of the content in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// One row of a [`Listing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: usize,
    pub version: u64,
}

/// Snapshot of the store taken by [`FileStore::list`], ordered by path.
///
/// The listing does not see writes made after it was taken. It is cheap to
/// clone, and [`Listing::rewind`] restarts iteration from the first path.
#[derive(Debug, Clone)]
pub struct Listing {
    items: Arc<[FileInfo]>,
    pos: usize,
}

impl Listing {
    /// Number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Restart iteration from the beginning.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for Listing {
    type Item = FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Listing {}

/// Flat path -> content mapping for one session.
///
/// Entries keep their insertion order for display; [`FileStore::list`]
/// orders by path. Deleted paths remember their last version so a later
/// write continues counting instead of starting over at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStore {
    entries: IndexMap<String, FileEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    retired_versions: BTreeMap<String, u64>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite `path`, returning the new version.
    pub fn write(&mut self, path: &str, content: &str, writer: &str) -> u64 {
        let previous = match self.entries.get(path) {
            Some(entry) => entry.version,
            None => self.retired_versions.remove(path).unwrap_or(0),
        };
        let version = previous + 1;

        // IndexMap::insert keeps the original position of an existing key.
        self.entries.insert(
            path.to_string(),
            FileEntry {
                path: path.to_string(),
                content: content.to_string(),
                last_writer: writer.to_string(),
                version,
            },
        );
        version
    }

    /// Return the whole content of `path`.
    pub fn read(&self, path: &str) -> Result<&str, FsError> {
        self.entries
            .get(path)
            .map(|entry| entry.content.as_str())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Full entry for `path`, if present.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Remove `path`. Fails with `NotFound` if it is absent.
    pub fn delete(&mut self, path: &str) -> Result<FileEntry, FsError> {
        let entry = self
            .entries
            .shift_remove(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        self.retired_versions
            .insert(entry.path.clone(), entry.version);
        Ok(entry)
    }

    /// Replace `old` with `new` inside `path` and return the new version.
    ///
    /// Without `replace_all`, `old` must occur exactly once.
    pub fn edit(
        &mut self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
        writer: &str,
    ) -> Result<u64, FsError> {
        let current = self.read(path)?;
        let count = if old.is_empty() {
            0
        } else {
            current.matches(old).count()
        };

        if count == 0 {
            return Err(FsError::NoMatch {
                path: path.to_string(),
                needle: old.to_string(),
            });
        }
        if count > 1 && !replace_all {
            return Err(FsError::AmbiguousMatch {
                path: path.to_string(),
                count,
            });
        }

        let updated = if replace_all {
            current.replace(old, new)
        } else {
            current.replacen(old, new, 1)
        };
        Ok(self.write(path, &updated, writer))
    }

    /// Snapshot of (path, size, version), ordered by path.
    pub fn list(&self) -> Listing {
        let mut items: Vec<FileInfo> = self
            .entries
            .values()
            .map(|entry| FileInfo {
                path: entry.path.clone(),
                size: entry.size(),
                version: entry.version,
            })
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Listing {
            items: items.into(),
            pos: 0,
        }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short text rendering of the store, fed back to the planner so it can
    /// refer to files by path instead of inlining them.
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "No files.".to_string();
        }
        self.entries
            .values()
            .map(|entry| {
                format!(
                    "{} ({} bytes, v{})",
                    entry.path,
                    entry.size(),
                    entry.version
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
