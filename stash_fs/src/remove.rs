use stash_core::{StashError, StashResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Removes `dir` and everything below it, deepest entries first.
///
/// Entries that vanish concurrently are ignored. Anything else that fails
/// stops the walk and is reported against its namespace-relative path.
pub(crate) async fn remove_tree(dir: PathBuf, relative: String) -> StashResult<()> {
    tokio::task::spawn_blocking(move || remove_tree_blocking(&dir, &relative))
        .await
        .map_err(|err| StashError::internal("delete task failed", std::io::Error::other(err)))?
}

fn remove_tree_blocking(dir: &Path, relative: &str) -> StashResult<()> {
    for entry in WalkDir::new(dir).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if vanished(&err) => continue,
            Err(err) => {
                let shown = display_path(dir, relative, err.path());
                return Err(StashError::internal(format!("failed to delete {shown}"), err.into()));
            }
        };

        let removed = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        match removed {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                let shown = display_path(dir, relative, Some(entry.path()));
                return Err(StashError::internal(format!("failed to delete {shown}"), err));
            }
        }
    }
    Ok(())
}

fn vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

/// Rebuilds the namespace-relative form of `path` so host paths never reach
/// an error message.
fn display_path(dir: &Path, relative: &str, path: Option<&Path>) -> String {
    let mut shown = relative.to_owned();
    if let Some(tail) = path.and_then(|p| p.strip_prefix(dir).ok()) {
        for component in tail.components() {
            shown.push('/');
            shown.push_str(&component.as_os_str().to_string_lossy());
        }
    }
    shown
}
