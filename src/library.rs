use crate::assets::{AssetKind, AssetRef};
use std::path::{Path, PathBuf};

/// Application data roots used by Bear releases, relative to the home directory.
/// Bear 2 keeps its data in a group container; Bear 1 used a sandbox container.
const APP_ROOT_CANDIDATES: &[&str] = &[
    "Library/Group Containers/9K33E3U3T4.net.shinyfrog.bear/Application Data",
    "Library/Containers/net.shinyfrog.bear/Data/Documents/Application Data",
];

const DB_FILE: &str = "database.sqlite";
const IMAGE_SUBDIR: &str = "Local Files/Note Images";
const FILE_SUBDIR: &str = "Local Files/Note Files";

/// Where the note database and its attachments live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub db_path: PathBuf,
    pub image_dir: PathBuf,
    pub file_dir: PathBuf,
}

impl LibraryPaths {
    /// Standard layout below a Bear "Application Data" directory.
    pub fn from_app_root(root: &Path) -> Self {
        Self {
            db_path: root.join(DB_FILE),
            image_dir: root.join(IMAGE_SUBDIR),
            file_dir: root.join(FILE_SUBDIR),
        }
    }

    /// First known app root under the home directory that contains a database.
    pub fn detect_app_root() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        APP_ROOT_CANDIDATES
            .iter()
            .map(|rel| home.join(rel))
            .find(|root| root.join(DB_FILE).exists())
    }

    pub fn asset_dir(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Image => self.image_dir.as_path(),
            AssetKind::File => self.file_dir.as_path(),
        }
    }

    /// On-disk location of a referenced asset. `raw_path` is joined unchanged,
    /// so any subdirectories from Bear's layout are kept.
    pub fn resolve(&self, asset: &AssetRef) -> PathBuf {
        self.asset_dir(asset.kind).join(&asset.raw_path)
    }
}
