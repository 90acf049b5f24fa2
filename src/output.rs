//! Result types for a successful conversion.

use crate::cleanup::{CleanupGuard, CleanupReport};
use crate::error::Pdf2ImgError;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Read size when streaming an archive back to the client.
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Numbers describing one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages rasterised (and archive entries written).
    pub page_count: usize,
    /// Size of the finished archive on disk.
    pub archive_bytes: u64,
    /// Time spent inside the rasterizer.
    pub render_duration_ms: u64,
    /// Time from upload received to archive finished.
    pub total_duration_ms: u64,
}

/// A finished archive waiting to be delivered.
///
/// Owns the session's cleanup: dropping this value (or the stream returned
/// by [`ConvertedArchive::into_stream`]) removes the workspace and the
/// archive file.
#[derive(Debug)]
pub struct ConvertedArchive {
    session_id: Uuid,
    download_name: String,
    stats: ConversionStats,
    guard: CleanupGuard,
}

impl ConvertedArchive {
    pub(crate) fn new(
        session_id: Uuid,
        download_name: String,
        stats: ConversionStats,
        guard: CleanupGuard,
    ) -> Self {
        Self {
            session_id,
            download_name,
            stats,
            guard,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Filename hint for the client: `<upload stem>.zip`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    /// Where the archive currently lives on disk.
    pub fn archive_path(&self) -> &Path {
        self.guard.archive()
    }

    /// The session workspace holding the uploaded PDF and page images.
    pub fn workspace_path(&self) -> &Path {
        self.guard.workspace()
    }

    /// Remove the workspace and archive immediately.
    pub fn cleanup_now(self) -> CleanupReport {
        self.guard.run_now()
    }

    /// Open the archive as a byte stream that carries the cleanup guard.
    ///
    /// Cleanup runs when the stream is dropped, i.e. after the consumer has
    /// finished with it or given up on it.
    pub async fn into_stream(self) -> Result<ArchiveStream, Pdf2ImgError> {
        let path = self.guard.archive().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| Pdf2ImgError::ArchiveReadFailed { path, source: e })?;

        Ok(ArchiveStream {
            inner: Box::pin(file_chunks(file)),
            _guard: self.guard,
        })
    }
}

/// Read `file` as a stream of chunks of at most 64 KiB.
///
/// A read error is yielded once and ends the stream.
pub fn file_chunks(file: File) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
    stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// The archive's bytes, chunk by chunk. Dropping it triggers cleanup.
pub struct ArchiveStream {
    inner: Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>,
    _guard: CleanupGuard,
}

impl Stream for ArchiveStream {
    type Item = std::io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("guard", &self._guard)
            .finish()
    }
}
