use crate::exporter::{ArchiveWriter, WriteError};
use crate::importer::NoteRepository;
use crate::library::LibraryPaths;
use crate::note::{ARCHIVE_EXTENSION, Note};
use crate::utils::{BackupConfig, ProcessResult, file_modified};
use eyre::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupSummary {
    pub written: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: usize,
}

/// The main entry point for the business logic.
/// Opens the note database, backs up every live note and optionally prunes
/// archives of deleted notes. Report lines go to `out`.
pub fn run<W: Write>(config: &BackupConfig, out: &mut W) -> Result<BackupSummary> {
    let repo = NoteRepository::open(&config.paths.db_path)?;
    let notes = repo.enumerate()?;
    backup_notes(&notes, config, out)
}

pub fn backup_notes<W: Write>(
    notes: &[Note],
    config: &BackupConfig,
    out: &mut W,
) -> Result<BackupSummary> {
    let verbose = config.verbose || config.dry_run;
    if verbose {
        writeln!(out, "Backing up to: {}", config.target_dir.display())?;
    }

    if !config.dry_run {
        fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
            format!(
                "Failed to create target directory: {}",
                config.target_dir.display()
            )
        })?;
    }

    let writer = ArchiveWriter::new(&config.paths, &config.target_dir);
    let mut summary = BackupSummary::default();
    let mut owners: HashMap<String, i64> = HashMap::new();

    for note in notes {
        if let Some(other) = owners.insert(note.full_filename(), note.id()) {
            log::warn!(
                "Notes {} and {} both map to {:?}; the later one wins",
                other,
                note.id(),
                note.full_filename()
            );
        }

        match backup_note(note, &writer, config, out)? {
            ProcessResult::Written => summary.written += 1,
            ProcessResult::Skipped => summary.skipped += 1,
            ProcessResult::Failed => summary.errors += 1,
        }
    }

    if config.remove {
        remove_orphans(notes, config, out, &mut summary)?;
    }

    if verbose {
        let mut line = format!(
            "Done. {} backed up, {} up to date, {} removed.",
            summary.written, summary.skipped, summary.removed
        );
        if summary.errors > 0 {
            line.push_str(&format!(" Completed with {} error(s).", summary.errors));
        }
        writeln!(out, "{}", line)?;
    }

    Ok(summary)
}

/// An archive at least as new as the note is authoritative.
fn is_up_to_date(note: &Note, archive: &Path) -> bool {
    file_modified(archive).is_some_and(|mtime| mtime >= note.modified_at())
}

/// A note that cannot be packaged is logged and reported as `Failed`; a
/// destination that refuses the archive aborts the run.
fn backup_note<W: Write>(
    note: &Note,
    writer: &ArchiveWriter<'_>,
    config: &BackupConfig,
    out: &mut W,
) -> Result<ProcessResult> {
    let dest = writer.archive_path(note);
    if !config.force && is_up_to_date(note, &dest) {
        log::debug!("Up to date: {}", dest.display());
        return Ok(ProcessResult::Skipped);
    }

    if config.dry_run {
        writeln!(out, "Would back up: {}", note.filename())?;
        return Ok(ProcessResult::Written);
    }

    if config.verbose {
        writeln!(out, "Backing up: {}", note.filename())?;
    }
    match writer.write(note) {
        Ok(_) => Ok(ProcessResult::Written),
        Err(WriteError::Note(e)) => {
            log::error!("Failed to back up {:?}: {:#}", note.filename(), e);
            Ok(ProcessResult::Failed)
        }
        Err(WriteError::Destination(e)) => Err(e),
    }
}

/// Archive files in `dir`, skipping dot-files the way a `*.bearnote` glob would.
/// A directory that does not exist yet (dry run) holds no archives.
fn existing_archives(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let suffix = format!(".{}", ARCHIVE_EXTENSION);
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(&suffix) && !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

fn remove_orphans<W: Write>(
    notes: &[Note],
    config: &BackupConfig,
    out: &mut W,
    summary: &mut BackupSummary,
) -> Result<()> {
    let keep: HashSet<String> = notes.iter().map(Note::full_filename).collect();

    let existing = existing_archives(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to list archives in {}",
            config.target_dir.display()
        )
    })?;
    for name in existing {
        if keep.contains(&name) {
            continue;
        }
        if config.dry_run {
            writeln!(out, "Would delete: {}", name)?;
            summary.removed += 1;
            continue;
        }
        if config.verbose {
            writeln!(out, "Deleting {}", name)?;
        }
        match fs::remove_file(config.target_dir.join(&name)) {
            Ok(()) => summary.removed += 1,
            Err(e) => {
                summary.errors += 1;
                log::error!("Failed to delete {}: {}", name, e);
            }
        }
    }
    Ok(())
}

/// Debug listing of what a backup would see, one block per note.
pub fn inspect<W: Write>(notes: &[Note], paths: &LibraryPaths, out: &mut W) -> Result<()> {
    for note in notes {
        writeln!(out, "[{}] {:?}", note.id(), note.title())?;
        writeln!(out, "    archive:  {}", note.full_filename())?;
        writeln!(out, "    modified: {}", note.modified_at().to_rfc3339())?;
        for asset in note.asset_refs() {
            let source = paths.resolve(&asset);
            let state = if source.exists() { "ok" } else { "missing" };
            writeln!(
                out,
                "    {:<5}     {} -> {} ({})",
                asset.kind,
                source.display(),
                asset.archive_path(),
                state
            )?;
        }
    }
    writeln!(out, "{} notes", notes.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        config: BackupConfig,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let paths = LibraryPaths::from_app_root(&tmp.path().join("bear"));
        fs::create_dir_all(paths.image_dir.join("IMG")).unwrap();
        fs::write(paths.image_dir.join("IMG/cat.png"), b"png").unwrap();
        let config = BackupConfig {
            target_dir: tmp.path().join("backup"),
            paths,
            force: false,
            verbose: false,
            dry_run: false,
            remove: false,
        };
        Fixture { _tmp: tmp, config }
    }

    fn modified() -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000, 0).unwrap()
    }

    fn note(id: i64, title: &str, body: &str) -> Note {
        Note::new(id, title.into(), body.into(), modified())
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn archive(config: &BackupConfig, name: &str) -> PathBuf {
        config.target_dir.join(name)
    }

    fn run_quiet(notes: &[Note], config: &BackupConfig) -> BackupSummary {
        backup_notes(notes, config, &mut Vec::<u8>::new()).unwrap()
    }

    #[test]
    fn second_run_writes_nothing() {
        let fx = fixture();
        let notes = vec![note(1, "A", "[image:IMG/cat.png]"), note(2, "B", "text")];

        let first = run_quiet(&notes, &fx.config);
        assert_eq!((first.written, first.skipped), (2, 0));
        let mtime = file_modified(&archive(&fx.config, "A.bearnote")).unwrap();

        let second = run_quiet(&notes, &fx.config);
        assert_eq!((second.written, second.skipped), (0, 2));
        assert_eq!(
            file_modified(&archive(&fx.config, "A.bearnote")).unwrap(),
            mtime
        );
    }

    #[test]
    fn older_archive_is_rewritten_equal_is_not() {
        let fx = fixture();
        let notes = vec![note(1, "Old", ""), note(2, "Equal", "")];
        run_quiet(&notes, &fx.config);

        let note_time = SystemTime::from(modified());
        set_mtime(
            &archive(&fx.config, "Old.bearnote"),
            note_time - Duration::from_secs(1),
        );
        set_mtime(&archive(&fx.config, "Equal.bearnote"), note_time);

        let summary = run_quiet(&notes, &fx.config);
        assert_eq!((summary.written, summary.skipped), (1, 1));
        assert!(file_modified(&archive(&fx.config, "Old.bearnote")).unwrap() > modified());
        assert_eq!(
            file_modified(&archive(&fx.config, "Equal.bearnote")).unwrap(),
            modified()
        );
    }

    #[test]
    fn force_ignores_staleness() {
        let mut fx = fixture();
        let notes = vec![note(1, "A", "")];
        run_quiet(&notes, &fx.config);

        fx.config.force = true;
        let summary = run_quiet(&notes, &fx.config);
        assert_eq!((summary.written, summary.skipped), (1, 0));
    }

    #[test]
    fn dry_run_reports_without_touching_disk() {
        let mut fx = fixture();
        fx.config.dry_run = true;
        let notes = vec![note(1, "Groceries: Milk & Eggs!", "")];

        let mut out = Vec::new();
        let summary = backup_notes(&notes, &fx.config, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(summary.written, 1);
        assert!(out.contains("Would back up: Groceries_ Milk _ Eggs_\n"));
        assert!(!fx.config.target_dir.exists());
    }

    #[test]
    fn verbose_reports_each_write() {
        let mut fx = fixture();
        fx.config.verbose = true;
        let mut out = Vec::new();
        backup_notes(&[note(1, "Hello", "")], &fx.config, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        let header = format!("Backing up to: {}", fx.config.target_dir.display());
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                header.as_str(),
                "Backing up: Hello",
                "Done. 1 backed up, 0 up to date, 0 removed.",
            ]
        );
    }

    #[test]
    fn remove_deletes_only_orphans() {
        let mut fx = fixture();
        fs::create_dir_all(&fx.config.target_dir).unwrap();
        for name in ["A.bearnote", "B.bearnote", "C.bearnote", "notes.txt"] {
            fs::write(archive(&fx.config, name), b"x").unwrap();
        }
        let notes = vec![note(1, "A", ""), note(2, "B", "")];
        fx.config.remove = true;

        let summary = run_quiet(&notes, &fx.config);
        assert_eq!(summary.removed, 1);
        assert!(archive(&fx.config, "A.bearnote").exists());
        assert!(archive(&fx.config, "B.bearnote").exists());
        assert!(!archive(&fx.config, "C.bearnote").exists());
        assert!(archive(&fx.config, "notes.txt").exists());
    }

    #[test]
    fn remove_in_dry_run_only_reports() {
        let mut fx = fixture();
        fs::create_dir_all(&fx.config.target_dir).unwrap();
        for name in ["A.bearnote", "B.bearnote", "C.bearnote"] {
            fs::write(archive(&fx.config, name), b"x").unwrap();
        }
        fx.config.remove = true;
        fx.config.dry_run = true;

        let mut out = Vec::new();
        let summary =
            backup_notes(&[note(1, "A", ""), note(2, "B", "")], &fx.config, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(summary.removed, 1);
        assert!(out.contains("Would delete: C.bearnote\n"));
        assert!(!out.contains("A.bearnote"));
        assert!(archive(&fx.config, "C.bearnote").exists());
    }

    #[test]
    fn missing_asset_skips_note_and_continues() {
        let fx = fixture();
        let notes = vec![
            note(1, "Broken", "[file:NOPE/gone.pdf]"),
            note(2, "Fine", "[image:IMG/cat.png]"),
        ];

        let summary = run_quiet(&notes, &fx.config);
        assert_eq!((summary.written, summary.errors), (1, 1));
        assert!(!archive(&fx.config, "Broken.bearnote").exists());
        assert!(archive(&fx.config, "Fine.bearnote").exists());
    }

    #[test]
    fn unwritable_destination_aborts_the_run() {
        let mut fx = fixture();
        fx.config.force = true;
        fs::create_dir_all(archive(&fx.config, "Blocked.bearnote")).unwrap();
        let notes = vec![note(1, "Blocked", ""), note(2, "After", "")];

        assert!(backup_notes(&notes, &fx.config, &mut Vec::<u8>::new()).is_err());
        assert!(!archive(&fx.config, "After.bearnote").exists());
    }

    #[test]
    fn unreadable_destination_fails_cleanup() {
        let mut fx = fixture();
        assert!(existing_archives(&fx.config.target_dir).unwrap().is_empty());

        fs::write(&fx.config.target_dir, b"not a directory").unwrap();
        fx.config.dry_run = true;
        fx.config.remove = true;
        let result = backup_notes(&[note(1, "A", "")], &fx.config, &mut Vec::<u8>::new());
        assert!(result.is_err());
    }

    #[test]
    fn colliding_titles_last_write_wins() {
        let mut fx = fixture();
        fx.config.force = true;
        let notes = vec![note(1, "Plan: A", "first"), note(2, "Plan? A", "second")];

        let summary = run_quiet(&notes, &fx.config);
        assert_eq!(summary.written, 2);

        let file = File::open(archive(&fx.config, "Plan_ A.bearnote")).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(
            &mut zip.by_name("Plan_ A.bearnote/text.txt").unwrap(),
            &mut text,
        )
        .unwrap();
        assert_eq!(text, "second");
    }

    #[test]
    fn inspect_lists_notes_and_assets() {
        let fx = fixture();
        let notes = vec![note(3, "Pets", "[image:IMG/cat.png] [file:X/y.pdf]")];
        let mut out = Vec::new();
        inspect(&notes, &fx.config.paths, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("[3] \"Pets\"\n"));
        assert!(out.contains("archive:  Pets.bearnote"));
        assert!(out.contains("-> assets/cat.png (ok)"));
        assert!(out.contains("-> assets/y.pdf (missing)"));
        assert!(out.ends_with("1 notes\n"));
    }
}
