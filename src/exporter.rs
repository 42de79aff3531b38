//! Writes one note as a `.bearnote` bundle.
//!
//! A bearnote is a zipped TextBundle whose asset links are plain
//! `[assets/<name>]` markers instead of markdown images. Every entry sits under
//! a folder named like the archive itself:
//!
//! ```text
//! Groceries.bearnote/info.json
//! Groceries.bearnote/text.txt
//! Groceries.bearnote/assets/photo.jpg
//! ```

use crate::library::LibraryPaths;
use crate::note::Note;
use eyre::{Context, Report};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Mode of finished archives and of their entries.
const ARCHIVE_MODE: u32 = 0o644;

#[derive(Serialize)]
struct BundleInfo {
    #[serde(rename = "type")]
    content_type: &'static str,
    version: &'static str,
}

const BUNDLE_INFO: BundleInfo = BundleInfo {
    content_type: "public.plain-text",
    version: "2",
};

/// Why an archive could not be written.
#[derive(Debug)]
pub enum WriteError {
    /// The destination directory rejected the archive; no other note can
    /// succeed either.
    Destination(Report),
    /// Only this note is affected, e.g. one of its attachments is missing.
    Note(Report),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Destination(e) | WriteError::Note(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for WriteError {}

trait DestinationContext<T> {
    fn destination(self, msg: impl FnOnce() -> String) -> Result<T, WriteError>;
}

impl<T, E> DestinationContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn destination(self, msg: impl FnOnce() -> String) -> Result<T, WriteError> {
        self.map_err(|e| WriteError::Destination(Report::new(e).wrap_err(msg())))
    }
}

pub struct ArchiveWriter<'a> {
    paths: &'a LibraryPaths,
    target_dir: &'a Path,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(paths: &'a LibraryPaths, target_dir: &'a Path) -> Self {
        Self { paths, target_dir }
    }

    pub fn archive_path(&self, note: &Note) -> PathBuf {
        self.target_dir.join(note.full_filename())
    }

    /// Builds the bundle in a temporary file next to the destination and moves
    /// it into place once complete. On error the previous archive, if any, is
    /// left untouched.
    pub fn write(&self, note: &Note) -> Result<PathBuf, WriteError> {
        let dest = self.archive_path(note);
        let tmp = self.temp_archive().destination(|| {
            format!(
                "Failed to create temporary file in {}",
                self.target_dir.display()
            )
        })?;

        let tmp = self.write_bundle(note, tmp)?;
        tmp.persist(&dest)
            .destination(|| format!("Failed to write {}", dest.display()))?;
        Ok(dest)
    }

    /// `NamedTempFile` is created owner-only; archives are regular backup files.
    fn temp_archive(&self) -> io::Result<NamedTempFile> {
        let tmp = NamedTempFile::new_in(self.target_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(ARCHIVE_MODE))?;
        }
        Ok(tmp)
    }

    fn write_bundle(&self, note: &Note, tmp: NamedTempFile) -> Result<NamedTempFile, WriteError> {
        let root = note.full_filename();
        let tmp_path = tmp.path().to_path_buf();
        let io_failed = || format!("Failed to write archive data to {}", tmp_path.display());
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(ARCHIVE_MODE);
        let mut zip = ZipWriter::new(tmp);

        zip.start_file(format!("{}/info.json", root), options)
            .destination(io_failed)?;
        let info = serde_json::to_vec(&BUNDLE_INFO)
            .map_err(|e| WriteError::Note(Report::new(e).wrap_err("Failed to encode info.json")))?;
        zip.write_all(&info).destination(io_failed)?;

        zip.start_file(format!("{}/text.txt", root), options)
            .destination(io_failed)?;
        zip.write_all(note.rendered_text().as_bytes())
            .destination(io_failed)?;

        let mut written = HashSet::new();
        for (source, asset) in note.asset_sources(self.paths) {
            // Opened before the duplicate check so every referenced file must exist.
            let file = File::open(&source)
                .wrap_err_with(|| format!("Missing {} asset: {}", asset.kind, source.display()))
                .map_err(WriteError::Note)?;

            let entry = asset.archive_path();
            if !written.insert(entry.clone()) {
                log::warn!(
                    "Note {:?}: {} also maps to {}, keeping the first",
                    note.title(),
                    source.display(),
                    entry
                );
                continue;
            }

            zip.start_file(format!("{}/{}", root, entry), options)
                .destination(io_failed)?;
            io::copy(&mut BufReader::new(file), &mut zip)
                .wrap_err_with(|| format!("Failed to copy asset: {}", source.display()))
                .map_err(WriteError::Note)?;
        }

        zip.finish().destination(io_failed)
    }
}
