use bear_backup::importer::NoteRepository;
use bear_backup::library::LibraryPaths;
use bear_backup::{process, utils};
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Back up Bear notes to .bearnote archives, one file per note.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to back up notes to. Created if missing.
    #[arg(value_name = "DIRECTORY")]
    target_dir: Option<PathBuf>,

    /// Print additional messages during backup.
    #[arg(short, long)]
    verbose: bool,

    /// Don't back up; list what the backup would see and exit.
    #[arg(short, long)]
    debug: bool,

    /// Overwrite existing files even if newer.
    #[arg(short, long)]
    force: bool,

    /// Don't create or delete any files, just print what would happen.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show a macOS notification once the backup is complete.
    #[arg(short = 'o', long)]
    notify: bool,

    /// Remove archives of deleted notes from the backup.
    #[arg(short, long)]
    remove: bool,

    /// Bear "Application Data" directory.
    /// Auto-detected if omitted.
    #[arg(long, value_name = "PATH")]
    app_root: Option<PathBuf>,

    /// Path to Bear's SQLite DB (database.sqlite).
    /// Defaults to <APP_ROOT>/database.sqlite.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/bear-backup/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    app_root: Option<PathBuf>,
    db_path: Option<PathBuf>,
    image_dir: Option<PathBuf>,
    file_dir: Option<PathBuf>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("bear-backup/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

/// CLI > config file > auto-detected Bear install, per path.
/// An explicit database path without an app root implies the root is its parent.
fn resolve_library(cli: &Cli, file_cfg: &FileConfig) -> Result<LibraryPaths> {
    let db_path = cli
        .db
        .as_ref()
        .or(file_cfg.db_path.as_ref())
        .map(|p| utils::expand_tilde(p));

    let app_root = cli
        .app_root
        .as_ref()
        .or(file_cfg.app_root.as_ref())
        .map(|p| utils::expand_tilde(p))
        .or_else(|| db_path.as_deref().and_then(Path::parent).map(Path::to_path_buf))
        .or_else(LibraryPaths::detect_app_root)
        .ok_or_else(|| {
            eyre!("Could not find Bear's data directory.\nUse --app-root or --db to specify it manually, or set app_root in config.toml.")
        })?;

    let mut paths = LibraryPaths::from_app_root(&app_root);
    if let Some(db) = db_path {
        paths.db_path = db;
    }
    if let Some(dir) = &file_cfg.image_dir {
        paths.image_dir = utils::expand_tilde(dir);
    }
    if let Some(dir) = &file_cfg.file_dir {
        paths.file_dir = utils::expand_tilde(dir);
    }
    Ok(paths)
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Dry run implies verbose
    let verbose = cli.verbose || cli.dry_run;
    init_logger(verbose);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve Bear's database and asset directories
    let paths = resolve_library(&cli, &file_cfg)?;
    if !paths.db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --db to specify the path manually.",
            paths.db_path.display()
        ));
    }

    let mut stdout = io::stdout().lock();

    // 3. Debug mode only inspects and needs no backup directory
    if cli.debug {
        let notes = NoteRepository::open(&paths.db_path)?.enumerate()?;
        process::inspect(&notes, &paths, &mut stdout)?;
        return Ok(());
    }

    // 4. Resolve target_dir (CLI > Config)
    let target_dir = cli
        .target_dir
        .clone()
        .or_else(|| file_cfg.target_dir.clone())
        .map(|p| utils::expand_tilde(&p))
        .ok_or_else(|| eyre!("No backup directory given.\nPass DIRECTORY or set target_dir in config.toml."))?;

    // 5. Build the Backup Config
    let config = utils::BackupConfig {
        target_dir,
        paths,
        force: cli.force,
        verbose,
        dry_run: cli.dry_run,
        remove: cli.remove,
    };

    // 6. Run the Business Logic
    let summary = process::run(&config, &mut stdout)?;
    if summary.errors > 0 {
        log::warn!("Backup completed with {} error(s)", summary.errors);
    }

    if cli.notify {
        let text = format!("Backed up notes to {}", config.target_dir.display());
        if let Err(e) = utils::send_notification("Bear notes backup", &text) {
            log::warn!("Could not show notification: {:#}", e);
        }
    }

    Ok(())
}
