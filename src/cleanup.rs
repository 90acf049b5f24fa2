//! Deferred cleanup: remove a session's workspace and archive once the
//! response has been delivered.
//!
//! A [`CleanupGuard`] is created when the archive is ready and travels with
//! the response body. The HTTP layer drops the body after it has handed off
//! the last byte, or as soon as the client disconnects, and the guard's
//! `Drop` performs the removal. Cleanup therefore runs exactly once per
//! successful request, never while the archive is still being read, and even
//! if the download is aborted mid-stream.
//!
//! Both removals are attempted independently and neither can fail the
//! caller: errors are logged and swallowed.

use crate::convert::Phase;
use crate::session::destroy_workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Owns the post-response cleanup of one session.
#[derive(Debug)]
pub struct CleanupGuard {
    session_id: Uuid,
    workspace: PathBuf,
    archive: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    /// Register cleanup of `workspace` and `archive` for when this guard drops.
    pub fn new(session_id: Uuid, workspace: PathBuf, archive: PathBuf) -> Self {
        Self {
            session_id,
            workspace,
            archive,
            armed: true,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Run cleanup now, on the current thread.
    pub fn run_now(mut self) -> CleanupReport {
        self.armed = false;
        cleanup_files(self.session_id, &self.workspace, &self.archive)
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let session_id = self.session_id;
        let workspace = std::mem::take(&mut self.workspace);
        let archive = std::mem::take(&mut self.archive);

        // Removing a directory tree blocks; keep it off the async workers.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn_blocking(move || cleanup_files(session_id, &workspace, &archive));
            }
            Err(_) => {
                cleanup_files(session_id, &workspace, &archive);
            }
        }
    }
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub workspace_removed: bool,
    pub archive_removed: bool,
}

/// Remove the session workspace, then the archive file.
///
/// The second removal is attempted even if the first fails. A path that is
/// already gone counts as removed, so running this twice is harmless.
pub fn cleanup_files(session_id: Uuid, workspace: &Path, archive: &Path) -> CleanupReport {
    let workspace_removed = destroy_workspace(workspace);
    let archive_removed = remove_archive(archive);

    info!(
        session_id = %session_id,
        phase = %Phase::Cleaned,
        workspace_removed,
        archive_removed,
        "Session cleaned"
    );
    CleanupReport {
        workspace_removed,
        archive_removed,
    }
}

/// Delete an archive file. A missing file counts as removed.
pub(crate) fn remove_archive(archive: &Path) -> bool {
    match std::fs::remove_file(archive) {
        Ok(()) => {
            debug!("Removed archive {}", archive.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            error!("Error removing zip file {}: {}", archive.display(), e);
            false
        }
    }
}

/// Remove every session workspace and archive left under `root`.
///
/// Only entries named like sessions are touched: `<uuid>/` directories and
/// `<uuid>-*.zip` files. Anything else in `root` is left alone. Returns the
/// number of entries removed.
pub fn sweep_stale(root: &Path) -> usize {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            error!("Cannot scan {} for stale sessions: {}", root.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        let gone = if is_dir && Uuid::parse_str(&name).is_ok() {
            destroy_workspace(&path)
        } else if !is_dir && is_session_archive(&name) {
            remove_archive(&path)
        } else {
            continue;
        };
        if gone {
            removed += 1;
        }
    }
    removed
}

fn is_session_archive(name: &str) -> bool {
    match (name.get(..36), name.get(36..)) {
        (Some(id), Some(rest)) => {
            Uuid::parse_str(id).is_ok() && rest.starts_with('-') && rest.ends_with(".zip")
        }
        _ => false,
    }
}
