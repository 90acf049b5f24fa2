//! Session workspaces: one isolated directory per upload.
//!
//! Every request gets a fresh [`Session`] whose workspace is
//! `<temp_root>/<uuid>/`. The uploaded PDF and the rendered page images live
//! there and nowhere else, so two concurrent uploads can never see each
//! other's files, even when the client filenames are identical.
//!
//! The session owns its workspace for its whole lifetime: created by
//! [`create_workspace`], filled by [`save_upload`], removed by
//! [`destroy_workspace`] (directly on abort, or via [`crate::cleanup`] after
//! the response has been sent).

use crate::error::Pdf2ImgError;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One upload's isolated processing context.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    root: PathBuf,
    workspace: PathBuf,
}

impl Session {
    /// The unique session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The temporary-files root this session lives under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The session's private directory.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Allocate a new session and create its workspace directory under `root`.
///
/// `root` itself is created if missing. The workspace is created with
/// `create_dir` (not `create_dir_all`) so an existing directory with the same
/// name is an error rather than silently shared.
pub async fn create_workspace(root: &Path) -> Result<Session, Pdf2ImgError> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| Pdf2ImgError::WorkspaceCreateFailed {
            path: root.to_path_buf(),
            source: e,
        })?;

    let id = Uuid::new_v4();
    let workspace = root.join(id.to_string());
    tokio::fs::create_dir(&workspace)
        .await
        .map_err(|e| Pdf2ImgError::WorkspaceCreateFailed {
            path: workspace.clone(),
            source: e,
        })?;

    debug!(session_id = %id, workspace = %workspace.display(), "Workspace created");
    Ok(Session {
        id,
        root: root.to_path_buf(),
        workspace,
    })
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Browsers and HTTP clients may send full paths (`C:\docs\a.pdf`,
/// `../../etc/passwd`); only the last component is kept. Empty names, `.`
/// and `..` are rejected.
pub fn upload_basename(raw: Option<&str>) -> Result<String, Pdf2ImgError> {
    let raw = raw.unwrap_or("");
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string();

    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return Err(Pdf2ImgError::InvalidFilename {
            filename: raw.to_string(),
        });
    }
    Ok(last)
}

/// Stream an upload verbatim into the session workspace.
///
/// Chunks are written as they arrive, so the whole file never has to sit in
/// memory. Returns the path of the saved file.
///
/// # Errors
/// * [`Pdf2ImgError::UploadInterrupted`] — the stream yielded an error
/// * [`Pdf2ImgError::UploadTooLarge`] — more than `max_bytes` were sent
/// * [`Pdf2ImgError::EmptyUpload`] — the stream ended with zero bytes
/// * [`Pdf2ImgError::UploadWriteFailed`] — the file could not be written
pub async fn save_upload<S, B, E>(
    session: &Session,
    filename: &str,
    mut body: S,
    max_bytes: u64,
) -> Result<PathBuf, Pdf2ImgError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let path = session.workspace.join(filename);
    let write_err = |e: std::io::Error| Pdf2ImgError::UploadWriteFailed {
        path: path.clone(),
        source: e,
    };

    let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Pdf2ImgError::UploadInterrupted {
            filename: filename.to_string(),
            detail: e.to_string(),
        })?;
        let bytes = chunk.as_ref();
        written += bytes.len() as u64;
        if written > max_bytes {
            return Err(Pdf2ImgError::UploadTooLarge {
                filename: filename.to_string(),
                limit: max_bytes,
            });
        }
        file.write_all(bytes).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)?;

    if written == 0 {
        return Err(Pdf2ImgError::EmptyUpload {
            filename: filename.to_string(),
        });
    }

    debug!(
        session_id = %session.id,
        bytes = written,
        "Saved upload to {}",
        path.display()
    );
    Ok(path)
}

/// Recursively remove a workspace directory.
///
/// Never fails: a missing directory counts as already removed, and any other
/// error is logged. Returns `true` if the directory is gone afterwards.
pub fn destroy_workspace(workspace: &Path) -> bool {
    match std::fs::remove_dir_all(workspace) {
        Ok(()) => {
            debug!("Removed workspace {}", workspace.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Workspace {} was already removed", workspace.display());
            true
        }
        Err(e) => {
            error!("Error removing workspace {}: {}", workspace.display(), e);
            false
        }
    }
}
