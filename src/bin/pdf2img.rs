//! CLI binary for edgequake-pdf2img.
//!
//! `pdf2img serve` runs the HTTP service; `pdf2img convert` runs the same
//! pipeline once against a local file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2img::output::file_chunks;
use edgequake_pdf2img::{
    cleanup, routes, Converter, ErrorStatusMode, PdfiumRasterizer, ServerConfig,
    DEFAULT_MAX_UPLOAD_BYTES,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the service on the default port
  pdf2img serve

  # Listen elsewhere, render at 150 DPI
  pdf2img serve --bind 127.0.0.1:9000 --dpi 150

  # Upload with curl
  curl -F file=@report.pdf http://localhost:8000/upload -o report.zip

  # Convert a local file without the server
  pdf2img convert report.pdf -o pages.zip

ENVIRONMENT VARIABLES:
  PDF2IMG_BIND              Listen address (serve)
  PDF2IMG_TEMP_ROOT         Directory for session workspaces and archives
  PDF2IMG_DPI               Render resolution (72–400)
  PDF2IMG_MAX_PIXELS        Longest rendered edge in pixels
  PDF2IMG_MAX_UPLOAD_BYTES  Upload size limit
  PDF2IMG_LEGACY_ERRORS     Answer failed uploads with 200 + {"error": ...}
  PDFIUM_LIB_PATH           Path to libpdfium (otherwise the system library)
  RUST_LOG                  Overrides the log filter
"#;

/// Convert PDF uploads into ZIP archives of PNG page images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Convert PDF uploads into ZIP archives of PNG page images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2IMG_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PDF2IMG_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Convert one local PDF into a ZIP archive.
    Convert {
        /// PDF file to convert.
        input: PathBuf,

        /// Archive to write. Defaults to `<input stem>.zip` in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Directory for session workspaces and archives.
    #[arg(long, env = "PDF2IMG_TEMP_ROOT")]
    temp_root: Option<PathBuf>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2IMG_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "PDF2IMG_MAX_PIXELS", default_value_t = 4000)]
    max_pixels: u32,

    /// Reject uploads larger than this many bytes.
    #[arg(long, env = "PDF2IMG_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: u64,

    /// Answer failed uploads with HTTP 200 and an error body.
    #[arg(long, env = "PDF2IMG_LEGACY_ERRORS")]
    legacy_error_status: bool,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

impl RenderArgs {
    /// Map CLI args to `ServerConfig`.
    fn to_config(&self) -> Result<ServerConfig> {
        let mut builder = ServerConfig::builder()
            .dpi(self.dpi)
            .max_rendered_pixels(self.max_pixels)
            .max_upload_bytes(self.max_upload_bytes)
            .error_status(if self.legacy_error_status {
                ErrorStatusMode::Legacy
            } else {
                ErrorStatusMode::Distinct
            });
        if let Some(ref root) = self.temp_root {
            builder = builder.temp_root(root);
        }
        if let Some(ref lib) = self.pdfium_lib {
            builder = builder.pdfium_library_path(lib);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { bind, render } => serve(bind, render.to_config()?).await,
        Command::Convert {
            input,
            output,
            render,
        } => convert(&input, output, render.to_config()?, cli.quiet).await,
    }
}

async fn serve(bind: SocketAddr, config: ServerConfig) -> Result<()> {
    // Fail at startup rather than on the first upload.
    PdfiumRasterizer::from_config(&config)
        .probe()
        .context("PDF engine unavailable")?;

    tokio::fs::create_dir_all(config.temp_root())
        .await
        .with_context(|| format!("Failed to create {}", config.temp_root().display()))?;

    // Sessions of a previous run that was killed before it could clean up.
    sweep(config.temp_root()).await;

    info!(
        bind = %bind,
        temp_root = %config.temp_root().display(),
        dpi = config.dpi,
        "Starting PDF to image service"
    );

    let temp_root = config.temp_root().to_path_buf();
    let app = routes::router(Arc::new(Converter::with_pdfium(config)));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cleanups queued by the last responses may not get to run once the
    // runtime shuts down.
    sweep(&temp_root).await;

    info!("Server stopped");
    Ok(())
}

async fn sweep(root: &Path) {
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || cleanup::sweep_stale(&root)).await {
        Ok(0) => {}
        Ok(n) => info!("Removed {} stale session entries", n),
        Err(e) => tracing::error!("Session sweep failed: {}", e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn convert(
    input: &Path,
    output: Option<PathBuf>,
    config: ServerConfig,
    quiet: bool,
) -> Result<()> {
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;

    // Same chunked path as an HTTP upload, so the size limit applies too.
    let body = Box::pin(file_chunks(file));

    let converter = Converter::with_pdfium(config);
    let filename = input.file_name().and_then(|n| n.to_str());
    let converted = converter
        .convert_upload(filename, body)
        .await
        .context("Conversion failed")?;

    let output = output.unwrap_or_else(|| PathBuf::from(converted.download_name()));
    let copied = tokio::fs::copy(converted.archive_path(), &output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()));
    let stats = converted.stats().clone();
    converted.cleanup_now();
    copied?;

    if !quiet {
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            green("✔"),
            stats.page_count,
            stats.total_duration_ms,
            bold(&output.display().to_string()),
        );
        eprintln!(
            "   {} bytes  /  render {}ms",
            dim(&stats.archive_bytes.to_string()),
            stats.render_duration_ms
        );
    }
    Ok(())
}
