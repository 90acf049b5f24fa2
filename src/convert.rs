//! Request orchestration: upload → PDF → page images → ZIP.
//!
//! A request moves through these phases:
//!
//! ```text
//! RECEIVED ──▶ SAVED ──▶ RASTERIZED ──▶ ARCHIVED ──▶ RESPONDED ──▶ CLEANED
//!    │           │            │
//!    └───────────┴────────────┴──▶ ABORTED
//! ```
//!
//! [`Converter::receive`] takes a request from RECEIVED to SAVED, and
//! [`Converter::advance`] moves a [`Stage`] one step further until it is
//! ARCHIVED. Any failure before ARCHIVED aborts: the workspace (and any
//! half-written archive) is removed before the error is returned, so an
//! aborted request leaves nothing on disk. RESPONDED and CLEANED belong to
//! the transport and to [`crate::cleanup`].
//!
//! Stages are plain values, so a test can build one directly and feed it to
//! `advance` to exercise a failure in any phase.

use crate::cleanup::CleanupGuard;
use crate::config::ServerConfig;
use crate::error::Pdf2ImgError;
use crate::output::{ConversionStats, ConvertedArchive};
use crate::pipeline::archive;
use crate::pipeline::pages;
use crate::pipeline::rasterize::{PdfiumRasterizer, Rasterizer};
use crate::session::{self, Session};
use futures::Stream;
use image::DynamicImage;
use std::fmt;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle phases of one conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Saved,
    Rasterized,
    Archived,
    Responded,
    Cleaned,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Received => "RECEIVED",
            Phase::Saved => "SAVED",
            Phase::Rasterized => "RASTERIZED",
            Phase::Archived => "ARCHIVED",
            Phase::Responded => "RESPONDED",
            Phase::Cleaned => "CLEANED",
            Phase::Aborted => "ABORTED",
        })
    }
}

/// What every in-flight stage carries: the session, the upload's name, and
/// the guard that removes the session's files if the request never finishes.
///
/// Dropping a context (for instance because the client disconnected and the
/// request future was dropped) removes the workspace and any archive written
/// so far.
#[derive(Debug)]
pub struct RequestContext {
    session: Session,
    upload_name: String,
    download_name: String,
    started: Instant,
    guard: CleanupGuard,
}

impl RequestContext {
    pub fn new(session: Session, upload_name: impl Into<String>) -> Self {
        let upload_name = upload_name.into();
        let download_name = archive::download_name(&upload_name);
        let guard = CleanupGuard::new(
            session.id(),
            session.workspace().to_path_buf(),
            archive::archive_path(session.root(), session.id(), &download_name),
        );
        Self {
            session,
            upload_name,
            download_name,
            started: Instant::now(),
            guard,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn upload_name(&self) -> &str {
        &self.upload_name
    }

    /// Where this request's archive is (or will be) written.
    pub fn archive_path(&self) -> &Path {
        self.guard.archive()
    }
}

/// A request between RECEIVED and ARCHIVED, with the data that phase owns.
#[derive(Debug)]
pub enum Stage {
    /// The upload is on disk at `pdf_path`.
    Saved {
        ctx: RequestContext,
        pdf_path: PathBuf,
    },
    /// The rasterizer produced `images`, in page order.
    Rasterized {
        ctx: RequestContext,
        images: Vec<DynamicImage>,
        render_duration_ms: u64,
    },
    /// The archive is built and owns the session's cleanup.
    Archived(ConvertedArchive),
}

impl Stage {
    pub fn phase(&self) -> Phase {
        match self {
            Stage::Saved { .. } => Phase::Saved,
            Stage::Rasterized { .. } => Phase::Rasterized,
            Stage::Archived(_) => Phase::Archived,
        }
    }
}

/// Drives uploads through the pipeline.
///
/// Holds no per-request state; one `Converter` is shared by all concurrent
/// requests.
pub struct Converter {
    config: ServerConfig,
    rasterizer: Arc<dyn Rasterizer>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("rasterizer", &"<dyn Rasterizer>")
            .finish()
    }
}

impl Converter {
    pub fn new(config: ServerConfig, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { config, rasterizer }
    }

    /// A converter using pdfium with the render settings from `config`.
    pub fn with_pdfium(config: ServerConfig) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
        Self::new(config, rasterizer)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run one upload all the way to a finished archive.
    ///
    /// `filename` is the client-supplied name; `body` is the upload's bytes.
    /// On success the returned [`ConvertedArchive`] owns cleanup of the
    /// session. On failure nothing is left on disk.
    pub async fn convert_upload<S, B, E>(
        &self,
        filename: Option<&str>,
        body: S,
    ) -> Result<ConvertedArchive, Pdf2ImgError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut stage = self.receive(filename, body).await?;
        loop {
            stage = match self.advance(stage).await? {
                Stage::Archived(done) => return Ok(done),
                next => next,
            };
        }
    }

    /// RECEIVED → SAVED: allocate a session and persist the upload.
    pub async fn receive<S, B, E>(
        &self,
        filename: Option<&str>,
        body: S,
    ) -> Result<Stage, Pdf2ImgError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let upload_name = session::upload_basename(filename)?;
        let session = session::create_workspace(self.config.temp_root()).await?;
        info!(
            session_id = %session.id(),
            filename = %upload_name,
            "Upload received"
        );

        let ctx = RequestContext::new(session, upload_name);
        match session::save_upload(
            &ctx.session,
            &ctx.upload_name,
            body,
            self.config.max_upload_bytes,
        )
        .await
        {
            Ok(pdf_path) => {
                debug!(session_id = %ctx.session.id(), phase = %Phase::Saved, "Transition");
                Ok(Stage::Saved { ctx, pdf_path })
            }
            Err(e) => Err(self.abort(ctx, Phase::Received, e).await),
        }
    }

    /// Move `stage` one phase forward. An `Archived` stage is returned as is.
    ///
    /// The context travels into each blocking task and back, so if this
    /// future is dropped mid-step the session is cleaned up once the task
    /// finishes, not while it is still writing.
    pub async fn advance(&self, stage: Stage) -> Result<Stage, Pdf2ImgError> {
        match stage {
            Stage::Saved { ctx, pdf_path } => {
                let rasterizer = Arc::clone(&self.rasterizer);
                let render_start = Instant::now();
                let (ctx, result) = tokio::task::spawn_blocking(move || {
                    let result = rasterizer.rasterize(&pdf_path);
                    (ctx, result)
                })
                .await
                .map_err(|e| Pdf2ImgError::Internal(format!("Render task panicked: {}", e)))?;
                let render_duration_ms = render_start.elapsed().as_millis() as u64;

                match result {
                    Ok(images) => {
                        debug!(
                            session_id = %ctx.session.id(),
                            phase = %Phase::Rasterized,
                            pages = images.len(),
                            "Transition"
                        );
                        Ok(Stage::Rasterized {
                            ctx,
                            images,
                            render_duration_ms,
                        })
                    }
                    Err(e) => Err(self.abort(ctx, Phase::Saved, e).await),
                }
            }

            Stage::Rasterized {
                ctx,
                images,
                render_duration_ms,
            } => {
                let (ctx, result) = tokio::task::spawn_blocking(move || {
                    let result = pages::write_pages(ctx.session.workspace(), &images)
                        .and_then(|paths| {
                            archive::build_archive(&paths, ctx.archive_path())?;
                            Ok(paths.len())
                        });
                    (ctx, result)
                })
                .await
                .map_err(|e| Pdf2ImgError::Internal(format!("Archive task panicked: {}", e)))?;

                let page_count = match result {
                    Ok(n) => n,
                    Err(e) => return Err(self.abort(ctx, Phase::Rasterized, e).await),
                };

                let archive_bytes = match tokio::fs::metadata(ctx.archive_path()).await {
                    Ok(m) => m.len(),
                    Err(e) => {
                        let err = Pdf2ImgError::ArchiveReadFailed {
                            path: ctx.archive_path().to_path_buf(),
                            source: e,
                        };
                        return Err(self.abort(ctx, Phase::Rasterized, err).await);
                    }
                };

                let stats = ConversionStats {
                    page_count,
                    archive_bytes,
                    render_duration_ms,
                    total_duration_ms: ctx.started.elapsed().as_millis() as u64,
                };
                info!(
                    session_id = %ctx.session.id(),
                    phase = %Phase::Archived,
                    pages = stats.page_count,
                    bytes = stats.archive_bytes,
                    "Conversion complete in {}ms (render {}ms)",
                    stats.total_duration_ms,
                    stats.render_duration_ms
                );

                // The guard moves on with the archive and now fires after the response.
                let RequestContext {
                    session,
                    download_name,
                    guard,
                    ..
                } = ctx;
                Ok(Stage::Archived(ConvertedArchive::new(
                    session.id(),
                    download_name,
                    stats,
                    guard,
                )))
            }

            archived @ Stage::Archived(_) => Ok(archived),
        }
    }

    /// Tear down an in-flight request and hand back the error that ended it.
    ///
    /// Runs to completion before returning, so the workspace is already gone
    /// when the error response is written.
    async fn abort(&self, ctx: RequestContext, from: Phase, err: Pdf2ImgError) -> Pdf2ImgError {
        warn!(
            session_id = %ctx.session.id(),
            phase = %Phase::Aborted,
            from = %from,
            kind = %err.kind(),
            "Request aborted: {}",
            err
        );

        let guard = ctx.guard;
        if let Err(e) = tokio::task::spawn_blocking(move || guard.run_now()).await {
            warn!("Abort teardown task failed: {}", e);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use futures::StreamExt;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tempfile::TempDir;

    struct SolidPages(usize);

    impl Rasterizer for SolidPages {
        fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, Pdf2ImgError> {
            Ok((0..self.0)
                .map(|k| {
                    DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([k as u8, 1, 2, 255])))
                })
                .collect())
        }
    }

    struct Rejects;

    impl Rasterizer for Rejects {
        fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, Pdf2ImgError> {
            Err(Pdf2ImgError::NoPages {
                path: pdf_path.to_path_buf(),
            })
        }
    }

    /// Renders one page, slowly.
    struct SlowPages(Duration);

    impl Rasterizer for SlowPages {
        fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, Pdf2ImgError> {
            std::thread::sleep(self.0);
            Ok(vec![DynamicImage::ImageRgba8(RgbaImage::new(2, 2))])
        }
    }

    fn converter(root: &Path, r: impl Rasterizer + 'static) -> Converter {
        let config = ServerConfig::builder().temp_root(root).build().unwrap();
        Converter::new(config, Arc::new(r))
    }

    fn body(bytes: &'static [u8]) -> impl Stream<Item = Result<&'static [u8], String>> + Unpin {
        stream::iter(vec![Ok(bytes)])
    }

    fn leftovers(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    /// Cleanup of a dropped request runs on the blocking pool; give it time.
    async fn wait_until_empty(root: &Path) {
        for _ in 0..300 {
            if leftovers(root).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session files left behind: {:?}", leftovers(root));
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Rasterized.to_string(), "RASTERIZED");
        assert_eq!(Phase::Aborted.to_string(), "ABORTED");
    }

    #[tokio::test]
    async fn stages_advance_in_order() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(3));

        let saved = c.receive(Some("doc.pdf"), body(b"%PDF-1.7")).await.unwrap();
        assert_eq!(saved.phase(), Phase::Saved);
        let rasterized = c.advance(saved).await.unwrap();
        assert_eq!(rasterized.phase(), Phase::Rasterized);
        let archived = c.advance(rasterized).await.unwrap();
        assert_eq!(archived.phase(), Phase::Archived);
        let again = c.advance(archived).await.unwrap();
        assert_eq!(again.phase(), Phase::Archived);
    }

    #[tokio::test]
    async fn convert_upload_produces_session_scoped_archive() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(2));

        let out = c.convert_upload(Some("report.pdf"), body(b"%PDF-1.7")).await.unwrap();
        assert_eq!(out.download_name(), "report.zip");
        assert_eq!(out.stats().page_count, 2);
        assert!(out.stats().archive_bytes > 0);
        assert!(out.archive_path().is_file());
        assert!(out
            .archive_path()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with(&out.session_id().to_string()));
        assert!(out.workspace_path().join("page_1.png").is_file());
        assert!(out.workspace_path().join("page_2.png").is_file());
        assert!(!out.archive_path().starts_with(out.workspace_path()));

        out.cleanup_now();
        assert!(leftovers(root.path()).is_empty());
    }

    #[tokio::test]
    async fn rasterizer_failure_aborts_and_leaves_nothing() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), Rejects);

        let err = c
            .convert_upload(Some("empty.pdf"), body(b"%PDF-1.7"))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::NoPages { .. }));
        assert!(leftovers(root.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_upload_aborts_and_leaves_nothing() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(1));

        let err = c
            .convert_upload(Some("doc.pdf"), stream::iter(Vec::<Result<&[u8], String>>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2ImgError::EmptyUpload { .. }));
        assert!(leftovers(root.path()).is_empty());
    }

    #[tokio::test]
    async fn bad_filename_fails_before_workspace() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(1));

        let err = c.convert_upload(Some(""), body(b"%PDF")).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::InvalidFilename { .. }));
        assert!(leftovers(root.path()).is_empty());
    }

    #[tokio::test]
    async fn archive_failure_aborts_and_leaves_nothing() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(1));

        // A stage whose workspace has vanished: writing page_1.png must fail.
        let session = session::create_workspace(root.path()).await.unwrap();
        std::fs::remove_dir(session.workspace()).unwrap();
        let stage = Stage::Rasterized {
            ctx: RequestContext::new(session, "doc.pdf"),
            images: vec![DynamicImage::ImageRgba8(RgbaImage::new(1, 1))],
            render_duration_ms: 0,
        };

        let err = c.advance(stage).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::PageWriteFailed { page: 1, .. }));
        assert!(leftovers(root.path()).is_empty());
    }

    #[tokio::test]
    async fn dropped_mid_upload_cleans_workspace() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(1));

        // First chunk arrives, then the client stalls until the request is dropped.
        let stalled = stream::iter(vec![Ok::<_, String>(&b"%PDF-1.7"[..])]).chain(stream::pending());
        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            c.convert_upload(Some("doc.pdf"), stalled),
        )
        .await;
        assert!(outcome.is_err(), "upload should still be pending");

        wait_until_empty(root.path()).await;
    }

    #[tokio::test]
    async fn dropped_mid_rasterize_cleans_workspace() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SlowPages(Duration::from_millis(300)));

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            c.convert_upload(Some("doc.pdf"), body(b"%PDF-1.7")),
        )
        .await;
        assert!(outcome.is_err(), "render should still be running");

        wait_until_empty(root.path()).await;
    }

    #[tokio::test]
    async fn dropped_mid_archive_cleans_workspace_and_archive() {
        let root = TempDir::new().unwrap();
        let c = converter(root.path(), SolidPages(1));

        let session = session::create_workspace(root.path()).await.unwrap();
        let stage = Stage::Rasterized {
            ctx: RequestContext::new(session, "doc.pdf"),
            images: (0..40)
                .map(|_| DynamicImage::ImageRgba8(RgbaImage::new(400, 400)))
                .collect(),
            render_duration_ms: 0,
        };

        // Drop the step as soon as it has started; the blocking write keeps going.
        let outcome = tokio::time::timeout(Duration::from_millis(1), c.advance(stage)).await;
        if let Ok(done) = outcome {
            // The machine was fast enough to finish; the archive owns cleanup now.
            drop(done.unwrap());
        }

        wait_until_empty(root.path()).await;
    }

    #[test]
    fn dropped_context_removes_session_files() {
        let root = TempDir::new().unwrap();
        let session = tokio_test::block_on(session::create_workspace(root.path())).unwrap();
        let ctx = RequestContext::new(session, "report.pdf");
        assert!(ctx
            .archive_path()
            .to_str()
            .unwrap()
            .ends_with("-report.zip"));
        std::fs::write(ctx.archive_path(), b"partial").unwrap();

        // Outside a runtime the guard removes everything inline.
        drop(ctx);
        assert!(leftovers(root.path()).is_empty());
    }
}
