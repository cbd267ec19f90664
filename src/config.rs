//! Runtime configuration.
//!
//! One [`Config`] is built in `main` and handed to the client, the database
//! loader and the resolver. Defaults can be overridden with environment
//! variables, and command-line flags override both.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUR_URL: &str = "https://aur.archlinux.org";
pub const DEFAULT_LOCAL_DB: &str = "/var/lib/pacman/local";
pub const DEFAULT_SYNC_DB: &str = "/var/lib/pacman/sync";
pub const DEFAULT_JOBS: usize = 8;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote repository base URL, without a trailing slash.
    pub aur_url: String,
    /// Installed-package database root.
    pub local_db: PathBuf,
    /// Directory holding one `<repo>.db` per synchronized repository.
    pub sync_db: PathBuf,
    /// Packages are extracted to `output_dir/<name>`.
    pub output_dir: PathBuf,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Upper bound on fetches and extractions running at once.
    pub jobs: usize,
    /// Overwrite existing extraction targets.
    pub force: bool,
    /// Print package names only.
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aur_url: DEFAULT_AUR_URL.to_string(),
            local_db: PathBuf::from(DEFAULT_LOCAL_DB),
            sync_db: PathBuf::from(DEFAULT_SYNC_DB),
            output_dir: PathBuf::from("."),
            timeout: DEFAULT_TIMEOUT,
            jobs: DEFAULT_JOBS,
            force: false,
            quiet: false,
        }
    }
}

impl Config {
    /// Defaults with `AURPULL_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("AURPULL_AUR_URL") {
            config.aur_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("AURPULL_LOCAL_DB") {
            config.local_db = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AURPULL_SYNC_DB") {
            config.sync_db = PathBuf::from(dir);
        }
        if let Some(jobs) = lookup("AURPULL_JOBS").and_then(|v| v.parse::<usize>().ok()) {
            config.jobs = jobs;
        }
        if let Some(secs) = lookup("AURPULL_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            config.timeout = Duration::from_secs(secs);
        }

        config.jobs = config.jobs.max(1);
        config
    }

    /// Where `name` is extracted to.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}
