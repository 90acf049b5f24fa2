//! Archive building: pack the page images into one ZIP file.
//!
//! Entries are flat (base filename only) and written in the order given.
//! They use the STORED method: PNG data is already deflate-compressed, so a
//! second pass would only cost CPU.
//!
//! The archive lives next to the session workspace, not inside it, so the
//! workspace can be removed independently. Its on-disk name is prefixed with
//! the session id; only the download name shown to the client is derived
//! from the upload.

use crate::error::Pdf2ImgError;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Download name for an upload: its stem plus `.zip`.
///
/// `report.pdf` → `report.zip`, `scan.v2.pdf` → `scan.v2.zip`,
/// `README` → `README.zip`.
pub fn download_name(upload_name: &str) -> String {
    let stem = Path::new(upload_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "pages".to_string());
    format!("{stem}.zip")
}

/// On-disk path of a session's archive: `<root>/<session_id>-<download_name>`.
pub fn archive_path(root: &Path, session_id: Uuid, download_name: &str) -> PathBuf {
    root.join(format!("{session_id}-{download_name}"))
}

/// Write `images` into a new ZIP at `archive_path`, replacing any existing file.
///
/// Blocking; call from `spawn_blocking`. On error the partially written
/// archive is left for the caller to remove.
pub fn build_archive(images: &[PathBuf], archive_path: &Path) -> Result<PathBuf, Pdf2ImgError> {
    let fail = |detail: String| Pdf2ImgError::ArchiveFailed {
        path: archive_path.to_path_buf(),
        detail,
    };

    let file = File::create(archive_path).map_err(|e| fail(e.to_string()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for image in images {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| fail(format!("'{}' has no file name", image.display())))?;

        let mut src = File::open(image)
            .map_err(|e| fail(format!("cannot read '{}': {}", image.display(), e)))?;
        zip.start_file(name.as_str(), options)
            .map_err(|e| fail(format!("cannot add entry '{name}': {e}")))?;
        io::copy(&mut src, &mut zip)
            .map_err(|e| fail(format!("cannot write entry '{name}': {e}")))?;
        debug!("Archived {}", name);
    }

    zip.finish()
        .map_err(|e| fail(format!("cannot finalize archive: {e}")))?
        .into_inner()
        .map_err(|e| fail(format!("cannot flush archive: {}", e.error())))?;

    Ok(archive_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn download_name_uses_stem() {
        assert_eq!(download_name("report.pdf"), "report.zip");
        assert_eq!(download_name("scan.v2.pdf"), "scan.v2.zip");
        assert_eq!(download_name("README"), "README.zip");
        assert_eq!(download_name(".pdf"), ".pdf.zip");
    }

    #[test]
    fn archive_path_is_session_scoped() {
        let root = Path::new("/tmp/root");
        let a = archive_path(root, Uuid::new_v4(), "report.zip");
        let b = archive_path(root, Uuid::new_v4(), "report.zip");
        assert_ne!(a, b);
        assert!(a.to_str().unwrap().ends_with("-report.zip"));
        assert_eq!(a.parent(), Some(root));
    }

    #[test]
    fn entries_are_flat_and_in_input_order() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        let mut inputs = Vec::new();
        for n in [2, 10, 1] {
            let p = ws.join(format!("page_{n}.png"));
            std::fs::write(&p, format!("img{n}")).unwrap();
            inputs.push(p);
        }

        let out = dir.path().join("out.zip");
        build_archive(&inputs, &out).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["page_2.png", "page_10.png", "page_1.png"]);

        let mut body = String::new();
        zip.by_name("page_10.png").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "img10");
    }

    #[test]
    fn overwrites_existing_archive() {
        let dir = TempDir::new().unwrap();
        let img = dir.path().join("page_1.png");
        std::fs::write(&img, b"x").unwrap();
        let out = dir.path().join("out.zip");
        std::fs::write(&out, b"stale garbage").unwrap();

        build_archive(&[img], &out).unwrap();
        let zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
    }

    #[test]
    fn missing_image_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.zip");
        let err = build_archive(&[dir.path().join("page_1.png")], &out).unwrap_err();
        assert!(matches!(err, Pdf2ImgError::ArchiveFailed { .. }));
    }
}
