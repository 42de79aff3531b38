//! Read-only access to Bear's note database.
//!
//! Bear is a Core Data application; notes live in the `ZSFNOTE` table of
//! `database.sqlite`. Only the columns below are read:
//!
//! ```sql
//! CREATE TABLE ZSFNOTE (
//!     Z_PK              INTEGER PRIMARY KEY,
//!     ZTRASHED          INTEGER,    -- 1 when the note sits in the trash
//!     ZMODIFICATIONDATE TIMESTAMP,  -- seconds since 2001-01-01 (REAL)
//!     ZTITLE            VARCHAR,
//!     ZTEXT             VARCHAR,    -- markdown with [image:..] / [file:..] links
//!     ...
//! );
//! ```
//!
//! The database belongs to Bear and is opened with `SQLITE_OPEN_READ_ONLY`;
//! nothing here ever writes to it.

use crate::note::{Note, from_apple_timestamp};
use eyre::{Context, Result};
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;

const NOTES_QUERY: &str = "SELECT Z_PK, ZTITLE, ZTEXT, ZMODIFICATIONDATE \
     FROM ZSFNOTE WHERE ZTRASHED IS NOT 1";

/// Raw column values of one `ZSFNOTE` row.
struct NoteRow {
    id: i64,
    title: Option<String>,
    text: Option<String>,
    modified: Option<f64>,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("Z_PK")?,
            title: row.get("ZTITLE")?,
            text: row.get("ZTEXT")?,
            modified: row.get("ZMODIFICATIONDATE")?,
        })
    }

    fn into_note(self) -> Result<Note> {
        // A note that was never saved with a date predates every archive.
        let modified_at = from_apple_timestamp(self.modified.unwrap_or(0.0))
            .wrap_err_with(|| format!("Note {} has a bad modification date", self.id))?;
        Ok(Note::new(
            self.id,
            self.title.unwrap_or_default(),
            self.text.unwrap_or_default(),
            modified_at,
        ))
    }
}

pub struct NoteRepository {
    conn: Connection,
}

impl NoteRepository {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .wrap_err_with(|| format!("Failed to open note database: {}", db_path.display()))?;
        log::debug!("Opened {} read-only", db_path.display());
        Ok(Self { conn })
    }

    /// Every note that is not in the trash, in whatever order SQLite returns.
    pub fn enumerate(&self) -> Result<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(NOTES_QUERY)
            .wrap_err("Failed to prepare note query (unexpected ZSFNOTE schema?)")?;

        let rows: Vec<NoteRow> = stmt
            .query_map([], NoteRow::from_row)
            .wrap_err("Failed to execute note query")?
            .collect::<Result<_, _>>()
            .wrap_err("Failed to read note row")?;

        let notes = rows
            .into_iter()
            .map(NoteRow::into_note)
            .collect::<Result<Vec<_>>>()?;
        log::info!("Found {} notes", notes.len());
        Ok(notes)
    }
}
