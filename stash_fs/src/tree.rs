//! Namespace-scoped file operations.
//!
//! [`FileTree::open`] turns a token into a [`NamespaceRoot`]; every other
//! operation takes that root plus an untrusted relative path and runs it
//! through the sandbox before touching the filesystem.
//!
//! Symbolic links inside a namespace are never followed: listings and
//! archives skip them, and a path that goes through one is not found. The
//! only operation that acts on a link is [`FileTree::delete`], which unlinks
//! it.

use crate::archive::ArchiveBuilder;
use crate::content::{self, Disposition};
use crate::namespace::{NamespaceResolver, NamespaceRoot};
use crate::remove::remove_tree;
use stash_core::{Entry, ResolvedPath, StashError, StashResult, TokenCodec};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone)]
pub struct FileTree {
    tokens: TokenCodec,
    namespaces: NamespaceResolver,
    archives: ArchiveBuilder,
}

/// An open file ready to be streamed to a caller.
#[derive(Debug)]
pub struct Download {
    pub file: tokio::fs::File,
    /// Name to offer the client: the file name, or `<dir>.zip` for folders.
    pub file_name: String,
    pub content_type: String,
    pub disposition: Disposition,
    pub len: u64,
}

impl Download {
    /// Consumes the download as a byte stream. Dropping the stream closes the
    /// file, which also releases a staged archive.
    pub fn into_stream(self) -> ReaderStream<tokio::fs::File> {
        ReaderStream::new(self.file)
    }
}

/// Files stored into one destination directory, in arrival order.
///
/// Created by [`FileTree::begin_upload`]. Earlier files stay on disk when a
/// later one fails.
#[derive(Debug)]
pub struct UploadBatch {
    root: NamespaceRoot,
    dir: ResolvedPath,
    stored: Vec<Entry>,
}

impl FileTree {
    pub fn new(tokens: TokenCodec, namespaces: NamespaceResolver, archives: ArchiveBuilder) -> Self {
        Self {
            tokens,
            namespaces,
            archives,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn namespaces(&self) -> &NamespaceResolver {
        &self.namespaces
    }

    /// Verifies `token` and resolves the namespace it is bound to.
    pub fn open(&self, token: &str) -> StashResult<NamespaceRoot> {
        let namespace = self.tokens.verify(token)?;
        self.namespaces.resolve_root(&namespace)
    }

    /// Lists a directory's immediate children sorted by name. A file lists as
    /// itself.
    pub async fn list(&self, root: &NamespaceRoot, relative: &str) -> StashResult<Vec<Entry>> {
        let target = root.resolve(relative)?;
        refuse_links(root, &target).await?;
        let meta = metadata(&target).await?;
        if !meta.is_dir() {
            return Ok(vec![entry_for(root, &target, &meta)?]);
        }

        let failed = |err: std::io::Error| {
            StashError::internal(format!("failed to list {}", shown(target.relative())), err)
        };
        let mut children = Vec::new();
        let mut dir = tokio::fs::read_dir(target.as_path()).await.map_err(failed)?;
        while let Some(child) = dir.next_entry().await.map_err(failed)? {
            let meta = match child.metadata().await {
                Ok(meta) => meta,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(failed(err)),
            };
            if meta.file_type().is_symlink() {
                continue;
            }
            let name = child.file_name().to_string_lossy().into_owned();
            let path = join_relative(target.relative(), &name);
            children.push(Entry::from_metadata(name, path, &meta).map_err(failed)?);
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    /// Creates a folder and any missing ancestors. Creating an existing path
    /// is a conflict.
    pub async fn mkdir(&self, root: &NamespaceRoot, relative: &str) -> StashResult<Entry> {
        if relative.trim().is_empty() {
            return Err(StashError::InvalidInput("folder path is required".into()));
        }
        let target = root.resolve(relative)?;
        if links_on(root, &target).await? != Links::None
            || tokio::fs::symlink_metadata(target.as_path()).await.is_ok()
        {
            return Err(StashError::Conflict(shown(target.relative()).to_owned()));
        }

        tokio::fs::create_dir_all(target.as_path())
            .await
            .map_err(|err| create_failed(&target, err))?;
        tracing::info!(namespace = root.id(), path = target.relative(), "created folder");

        let meta = metadata(&target).await?;
        entry_for(root, &target, &meta)
    }

    /// Creates the destination directory (if needed) and returns a batch that
    /// stores files into it.
    pub async fn begin_upload(&self, root: &NamespaceRoot, relative: &str) -> StashResult<UploadBatch> {
        let dir = root.resolve(relative)?;
        if links_on(root, &dir).await? != Links::None {
            return Err(StashError::Conflict(shown(dir.relative()).to_owned()));
        }
        tokio::fs::create_dir_all(dir.as_path())
            .await
            .map_err(|err| create_failed(&dir, err))?;
        Ok(UploadBatch {
            root: root.clone(),
            dir,
            stored: Vec::new(),
        })
    }

    /// Stores every `(name, content)` pair into `relative`, stopping at the
    /// first failure.
    pub async fn upload<I, R>(&self, root: &NamespaceRoot, relative: &str, files: I) -> StashResult<Vec<Entry>>
    where
        I: IntoIterator<Item = (String, R)>,
        R: AsyncRead + Send,
    {
        let mut files = files.into_iter().peekable();
        if files.peek().is_none() {
            return Err(StashError::InvalidInput("no file provided".into()));
        }
        let mut batch = self.begin_upload(root, relative).await?;
        for (name, content) in files {
            batch.store(&name, content).await?;
        }
        Ok(batch.finish())
    }

    /// Opens a file for streaming, or zips a folder into a staged archive.
    pub async fn download(
        &self,
        root: &NamespaceRoot,
        relative: &str,
        force_download: bool,
    ) -> StashResult<Download> {
        let target = root.resolve(relative)?;
        refuse_links(root, &target).await?;
        let meta = metadata(&target).await?;
        let name = target.name().unwrap_or(root.id()).to_owned();

        if meta.is_dir() {
            let file = self
                .archives
                .build(target.as_path().to_path_buf(), name.clone())
                .await?;
            let len = file
                .metadata()
                .await
                .map_err(|err| StashError::internal(format!("failed to archive {name}"), err))?
                .len();
            tracing::info!(namespace = root.id(), path = target.relative(), len, "serving folder archive");
            return Ok(Download {
                file,
                file_name: format!("{name}.zip"),
                content_type: content::ZIP.to_owned(),
                disposition: Disposition::Attachment,
                len,
            });
        }

        let file = tokio::fs::File::open(target.as_path())
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StashError::NotFound(shown(target.relative()).to_owned()),
                _ => StashError::internal(format!("failed to open {}", target.relative()), err),
            })?;
        let content_type = content::sniff(target.as_path(), &name).await;
        let disposition = Disposition::for_content(&content_type, force_download);
        Ok(Download {
            file,
            file_name: name,
            content_type,
            disposition,
            len: meta.len(),
        })
    }

    /// Deletes a file or a whole folder and returns its relative path.
    pub async fn delete(&self, root: &NamespaceRoot, relative: &str) -> StashResult<String> {
        if relative.trim().is_empty() {
            return Err(StashError::InvalidInput("path is required".into()));
        }
        let target = root.resolve(relative)?;
        if target.is_root() {
            return Err(StashError::InvalidInput("the namespace root cannot be deleted".into()));
        }

        match links_on(root, &target).await? {
            Links::None => {}
            Links::Last => {
                tokio::fs::remove_file(lexical_path(root, &target))
                    .await
                    .map_err(|err| {
                        StashError::internal(format!("failed to delete {}", target.relative()), err)
                    })?;
                tracing::info!(namespace = root.id(), path = target.relative(), "deleted link");
                return Ok(target.relative().to_owned());
            }
            Links::Inside => return Err(StashError::NotFound(target.relative().to_owned())),
        }
        if target.as_path() == root.path() {
            return Err(StashError::InvalidInput("the namespace root cannot be deleted".into()));
        }

        let meta = metadata(&target).await?;
        if meta.is_dir() {
            remove_tree(target.as_path().to_path_buf(), target.relative().to_owned()).await?;
        } else {
            match tokio::fs::remove_file(target.as_path()).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StashError::internal(
                        format!("failed to delete {}", target.relative()),
                        err,
                    ));
                }
            }
        }
        tracing::info!(namespace = root.id(), path = target.relative(), "deleted");
        Ok(target.relative().to_owned())
    }
}

impl UploadBatch {
    /// Namespace-relative path of the destination directory.
    pub fn destination(&self) -> &str {
        self.dir.relative()
    }

    /// Streams `content` into a new file called `name`.
    ///
    /// The name must land directly inside the destination directory. The
    /// file is created with `create_new`, so an existing name is a conflict
    /// even under concurrent uploads.
    pub async fn store<R>(&mut self, name: &str, content: R) -> StashResult<Entry>
    where
        R: AsyncRead + Send,
    {
        if name.trim().is_empty() {
            return Err(StashError::InvalidInput("file name is required".into()));
        }
        let invalid = || StashError::InvalidInput(format!("invalid file name: {name}"));
        let target = self
            .root
            .resolve(&join_relative(self.dir.relative(), name))
            .map_err(|_| invalid())?;
        if target.parent_relative() != Some(self.dir.relative()) {
            return Err(invalid());
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target.as_path())
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StashError::Conflict(target.relative().to_owned()));
            }
            Err(err) => {
                return Err(StashError::internal(
                    format!("failed to store {}", target.relative()),
                    err,
                ));
            }
        };

        tokio::pin!(content);
        let written = match copy_into(&mut content, &mut file).await {
            Ok(written) => written,
            Err(err) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(target.as_path()).await {
                    tracing::warn!(path = target.relative(), "failed to remove partial upload: {cleanup}");
                }
                return Err(StashError::internal(
                    format!("failed to store {}", target.relative()),
                    err,
                ));
            }
        };
        drop(file);
        tracing::info!(namespace = self.root.id(), path = target.relative(), written, "stored file");

        let meta = metadata(&target).await?;
        let entry = entry_for(&self.root, &target, &meta)?;
        self.stored.push(entry.clone());
        Ok(entry)
    }

    pub fn stored(&self) -> &[Entry] {
        &self.stored
    }

    pub fn finish(self) -> Vec<Entry> {
        self.stored
    }
}

async fn copy_into<R>(content: &mut R, file: &mut tokio::fs::File) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let written = tokio::io::copy(content, file).await?;
    file.flush().await?;
    Ok(written)
}

/// Where the first symbolic link sits on a path, walking down from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Links {
    None,
    /// The final segment is a link.
    Last,
    /// A parent directory on the way is a link.
    Inside,
}

fn lexical_path(root: &NamespaceRoot, target: &ResolvedPath) -> PathBuf {
    let mut path = root.path().to_path_buf();
    path.extend(target.relative().split('/').filter(|segment| !segment.is_empty()));
    path
}

async fn links_on(root: &NamespaceRoot, target: &ResolvedPath) -> StashResult<Links> {
    let segments: Vec<&str> = target
        .relative()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let mut path = root.path().to_path_buf();
    for (index, segment) in segments.iter().enumerate() {
        path.push(segment);
        match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Ok(if index + 1 == segments.len() {
                    Links::Last
                } else {
                    Links::Inside
                });
            }
            Ok(_) => {}
            // Nothing below a missing segment exists either.
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => break,
            Err(err) => {
                return Err(StashError::internal(
                    format!("failed to stat {}", shown(target.relative())),
                    err,
                ));
            }
        }
    }
    Ok(Links::None)
}

/// Paths that go through a link are reported as missing.
async fn refuse_links(root: &NamespaceRoot, target: &ResolvedPath) -> StashResult<()> {
    match links_on(root, target).await? {
        Links::None => Ok(()),
        Links::Last | Links::Inside => {
            tracing::debug!(namespace = root.id(), path = target.relative(), "refusing to follow link");
            Err(StashError::NotFound(shown(target.relative()).to_owned()))
        }
    }
}

async fn metadata(target: &ResolvedPath) -> StashResult<Metadata> {
    tokio::fs::metadata(target.as_path())
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => {
                StashError::NotFound(shown(target.relative()).to_owned())
            }
            _ => StashError::internal(format!("failed to stat {}", shown(target.relative())), err),
        })
}

fn entry_for(root: &NamespaceRoot, target: &ResolvedPath, meta: &Metadata) -> StashResult<Entry> {
    let name = target.name().unwrap_or(root.id());
    Entry::from_metadata(name, target.relative(), meta).map_err(|err| {
        StashError::internal(format!("failed to stat {}", shown(target.relative())), err)
    })
}

fn create_failed(target: &ResolvedPath, err: std::io::Error) -> StashError {
    match err.kind() {
        // Something on the way is a file.
        ErrorKind::AlreadyExists | ErrorKind::NotADirectory => {
            StashError::Conflict(target.relative().to_owned())
        }
        _ => StashError::internal(format!("failed to create {}", shown(target.relative())), err),
    }
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// The root has an empty relative path; messages show it as `/`.
fn shown(relative: &str) -> &str {
    if relative.is_empty() { "/" } else { relative }
}
