use crate::assets::{self, AssetRef};
use crate::library::LibraryPaths;
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the origin of
/// Bear's (Core Data) timestamps.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

pub const ARCHIVE_EXTENSION: &str = "bearnote";

static UNSAFE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]+").expect("filename pattern is valid"));
static WHITESPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Converts a Core Data timestamp (seconds since 2001) to UTC, truncated to
/// whole seconds.
pub fn from_apple_timestamp(seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(eyre!("Invalid modification timestamp: {}", seconds));
    }
    let unix = seconds.floor() as i64 + APPLE_EPOCH_OFFSET;
    DateTime::from_timestamp(unix, 0)
        .ok_or_else(|| eyre!("Modification timestamp out of range: {}", seconds))
}

/// Replaces runs of characters that are neither word characters nor
/// whitespace with `_`, then collapses whitespace runs to a single space.
pub fn sanitize_filename(title: &str) -> String {
    let replaced = UNSAFE_RUN_RE.replace_all(title, "_");
    WHITESPACE_RUN_RE.replace_all(&replaced, " ").into_owned()
}

/// A live (non-trashed) note read from `ZSFNOTE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    id: i64,
    title: String,
    body: String,
    modified_at: DateTime<Utc>,
}

impl Note {
    pub fn new(id: i64, title: String, body: String, modified_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            body,
            modified_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Every asset reference in the body, in order, duplicates included.
    pub fn asset_refs(&self) -> Vec<AssetRef> {
        assets::parse_asset_refs(&self.body)
    }

    /// Unique assets keyed by resolved source path. Referencing the same file
    /// twice yields a single entry.
    pub fn asset_sources(&self, paths: &LibraryPaths) -> BTreeMap<PathBuf, AssetRef> {
        self.asset_refs()
            .into_iter()
            .map(|asset| (paths.resolve(&asset), asset))
            .collect()
    }

    /// Body text with asset links pointing into the bundle's `assets/` folder.
    pub fn rendered_text(&self) -> String {
        assets::rewrite_asset_refs(&self.body)
    }

    /// Archive name without extension, derived from the title.
    pub fn filename(&self) -> String {
        sanitize_filename(&self.title)
    }

    /// Archive name including the `.bearnote` extension.
    pub fn full_filename(&self) -> String {
        format!("{}.{}", self.filename(), ARCHIVE_EXTENSION)
    }
}
