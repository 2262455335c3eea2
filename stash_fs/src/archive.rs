//! Zip archives of whole directories, staged in an anonymous temporary file.
//!
//! The temporary file is unlinked from the moment it is created, so it goes
//! away with the last handle no matter how the download ends.

use stash_core::{StashError, StashResult};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries larger than this need the zip64 extension.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    temp_dir: Option<PathBuf>,
}

impl ArchiveBuilder {
    /// Stages archives in the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages archives in `dir` instead of the system temporary directory.
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
        }
    }

    /// Builds the archive on the blocking pool and hands back a handle
    /// positioned at its first byte.
    pub async fn build(&self, source: PathBuf, root_name: String) -> StashResult<tokio::fs::File> {
        let builder = self.clone();
        let file = tokio::task::spawn_blocking(move || builder.zip_directory(&source, &root_name))
            .await
            .map_err(|err| StashError::internal("archive task failed", std::io::Error::other(err)))??;
        Ok(tokio::fs::File::from_std(file))
    }

    /// Writes every regular file below `source` into a fresh zip archive.
    ///
    /// Entry names are `root_name/<path relative to source>` with `/`
    /// separators, in file name order. Directories contribute no entries of
    /// their own and symbolic links are skipped.
    pub fn zip_directory(&self, source: &Path, root_name: &str) -> StashResult<File> {
        let file = match &self.temp_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(|err| StashError::internal("failed to create temporary archive", err))?;

        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                StashError::internal(format!("failed to archive {root_name}"), err.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let name = entry_name(root_name, relative);
            let failed = |err: std::io::Error| StashError::internal(format!("failed to archive {name}"), err);

            let mut input = File::open(entry.path()).map_err(failed)?;
            let len = input.metadata().map_err(failed)?.len();
            writer
                .start_file(name.as_str(), options.large_file(len >= ZIP64_THRESHOLD))
                .map_err(|err| failed(zip_io(err)))?;
            std::io::copy(&mut input, &mut writer).map_err(failed)?;
        }

        let mut file = writer
            .finish()
            .map_err(|err| StashError::internal(format!("failed to archive {root_name}"), zip_io(err)))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|err| StashError::internal("failed to rewind temporary archive", err))?;
        tracing::debug!(root_name, "archive staged");
        Ok(file)
    }
}

fn entry_name(root_name: &str, relative: &Path) -> String {
    let mut name = root_name.to_owned();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

fn zip_io(err: ZipError) -> std::io::Error {
    match err {
        ZipError::Io(err) => err,
        other => std::io::Error::other(other),
    }
}
