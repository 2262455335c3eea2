use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;

/// A file or folder inside a namespace, as exposed to callers.
///
/// Entries are computed on demand from filesystem metadata; nothing caches
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Forward-slash separated, relative to the namespace root.
    pub path: String,
    /// Size in bytes, `None` for folders.
    pub size: Option<u64>,
    /// Last modification time in milliseconds since the unix epoch.
    pub last_modified: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl Entry {
    pub fn from_metadata(
        name: impl Into<String>,
        path: impl Into<String>,
        meta: &Metadata,
    ) -> std::io::Result<Self> {
        let kind = if meta.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let last_modified = DateTime::<Utc>::from(meta.modified()?).timestamp_millis();
        Ok(Self {
            name: name.into(),
            kind,
            path: path.into(),
            size: match kind {
                EntryKind::File => Some(meta.len()),
                EntryKind::Folder => None,
            },
            last_modified,
        })
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}
