//! Local filesystem engine for Stash.
//!
//! Each principal owns one namespace: a directory directly below the storage
//! base. [`NamespaceResolver`] finds (or provisions) that directory and
//! [`FileTree`] runs the list, mkdir, upload, download and delete operations
//! inside it. Folder downloads are zipped by [`ArchiveBuilder`].

pub mod archive;
pub mod content;
pub mod namespace;
mod remove;
pub mod tree;

pub use archive::ArchiveBuilder;
pub use content::Disposition;
pub use namespace::{NamespaceResolver, NamespaceRoot};
pub use tree::{Download, FileTree, UploadBatch};
