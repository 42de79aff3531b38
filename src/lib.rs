//! # bear-backup
//!
//! A CLI tool that backs up [Bear](https://bear.app) notes into `.bearnote` files,
//! one self-contained archive per note.
//!
//! ## What it does
//!
//! Bear keeps notes in a Core Data SQLite database (`database.sqlite`) and stores
//! images and attachments as separate files next to it. This tool reads that
//! database, rewrites the inline `[image:...]` / `[file:...]` links to point into
//! the bundle, and zips each note with its attachments in Bear's own export format
//! (a TextBundle variant), so every backup file can be re-imported into Bear.
//!
//! The database is opened **read-only**; your data is never modified.
//!
//! ## Incremental backup
//!
//! Archives are named after the note title. On repeated runs an archive whose
//! modification time is not older than the note's is left alone; `--force`
//! rewrites everything. `--remove` deletes archives of notes that no longer exist
//! or were moved to the trash.
//!
//! ## Usage
//!
//! ```sh
//! # Back up all notes
//! bear-backup ~/Dropbox/backups/bear
//!
//! # See what would change, including deletions, without touching anything
//! bear-backup --dry-run --remove ~/Dropbox/backups/bear
//! ```
//!
//! Preferences can be persisted in `~/.config/bear-backup/config.toml`.

pub mod assets;
pub mod exporter;
pub mod importer;
pub mod library;
pub mod note;
pub mod process;
pub mod utils;
