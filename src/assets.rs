//! Inline asset references in Bear note bodies.
//!
//! Bear stores attachments outside the note text and links them with
//! `[image:<path>]` or `[file:<path>]` markers. Inside a `.bearnote` bundle the
//! same attachment is addressed as `[assets/<basename>]`.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `[image:<path>]` or `[file:<path>]`; `<path>` cannot contain `]`.
pub static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(image|file):([^\]]+)\]").expect("asset reference pattern is valid")
});

const ARCHIVE_ASSET_DIR: &str = "assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetKind {
    Image,
    File,
}

impl AssetKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "image" => Some(AssetKind::Image),
            "file" => Some(AssetKind::File),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::File => "file",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One `[kind:raw_path]` marker as it appears in a note body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub raw_path: String,
}

impl AssetRef {
    /// Path of this asset inside a bundle, relative to the bundle folder.
    pub fn archive_path(&self) -> String {
        archive_path_for(&self.raw_path)
    }
}

fn asset_ref_from(caps: &Captures<'_>) -> Option<AssetRef> {
    let kind = AssetKind::from_tag(caps.get(1)?.as_str())?;
    Some(AssetRef {
        kind,
        raw_path: caps.get(2)?.as_str().to_string(),
    })
}

/// All asset references in `text`, in order of appearance, duplicates included.
pub fn parse_asset_refs(text: &str) -> Vec<AssetRef> {
    ASSET_RE
        .captures_iter(text)
        .filter_map(|caps| asset_ref_from(&caps))
        .collect()
}

/// Strips every directory component of `raw_path` and places the basename
/// under `assets/`.
pub fn archive_path_for(raw_path: &str) -> String {
    let basename = raw_path.rsplit('/').next().unwrap_or(raw_path);
    format!("{}/{}", ARCHIVE_ASSET_DIR, basename)
}

/// Replaces every asset reference with `[assets/<basename>]`, leaving all
/// other text untouched.
pub fn rewrite_asset_refs(text: &str) -> String {
    ASSET_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!("[{}]", archive_path_for(&caps[2]))
        })
        .into_owned()
}
